//! Propagation diagnostics.
//!
//! Nothing the engine meets while reacting to edges is fatal. Situations a
//! downstream analysis may want to know about are recorded as a
//! [`PropagationDiagnostic`] on the [`TypedGraph`](crate::TypedGraph) and
//! logged through `tracing`; propagation carries on with the rest of the
//! graph.

use cpg_core::id::NodeId;
use cpg_core::types::Type;
use serde::{Deserialize, Serialize};

fn type_list(types: &[Type]) -> String {
    types
        .iter()
        .map(Type::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A non-fatal finding recorded during propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PropagationDiagnostic {
    /// A tuple-typed right-hand side was assigned to a different number of
    /// targets. The assignment was skipped for propagation.
    #[error(
        "tuple arity mismatch at assignment {assign}: {rhs} yields {actual} values for {expected} targets"
    )]
    TupleArityMismatch {
        /// The assignment node.
        assign: NodeId,
        /// The tuple-typed right-hand side.
        rhs: NodeId,
        /// Number of left-hand targets.
        expected: usize,
        /// Arity of the tuple.
        actual: usize,
    },

    /// The candidate types of a node have no common supertype; `chosen` was
    /// used as the node's type instead.
    #[error("no common supertype at node {node} for [{list}]; using {chosen}", list = type_list(.candidates))]
    NoCommonSupertype {
        node: NodeId,
        candidates: Vec<Type>,
        chosen: Type,
    },

    /// A proposal reached a template call whose parameters are not
    /// substituted yet and was dropped.
    #[error("template call {node} ignored proposed type {proposed}: parameters unresolved")]
    UnresolvedTemplate { node: NodeId, proposed: Type },
}

impl PropagationDiagnostic {
    /// The node the diagnostic is attached to.
    pub fn node(&self) -> NodeId {
        match self {
            PropagationDiagnostic::TupleArityMismatch { assign, .. } => *assign,
            PropagationDiagnostic::NoCommonSupertype { node, .. }
            | PropagationDiagnostic::UnresolvedTemplate { node, .. } => *node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let d = PropagationDiagnostic::TupleArityMismatch {
            assign: NodeId(4),
            rhs: NodeId(3),
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            d.to_string(),
            "tuple arity mismatch at assignment 4: 3 yields 2 values for 3 targets"
        );

        let d = PropagationDiagnostic::NoCommonSupertype {
            node: NodeId(1),
            candidates: vec![Type::int(), Type::string()],
            chosen: Type::string(),
        };
        assert_eq!(
            d.to_string(),
            "no common supertype at node 1 for [int, string]; using string"
        );
        assert_eq!(d.node(), NodeId(1));
    }

    #[test]
    fn serde_roundtrip() {
        let d = PropagationDiagnostic::UnresolvedTemplate {
            node: NodeId(9),
            proposed: Type::int(),
        };
        let json = serde_json::to_string(&d).unwrap();
        let back: PropagationDiagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
