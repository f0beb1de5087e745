//! Core error types for cpg-core.
//!
//! Only structurally invalid graph operations are errors. Everything the
//! type propagation layer encounters while reacting to edges is handled
//! locally and reported as a diagnostic instead.

use crate::id::{EdgeId, NodeId};
use thiserror::Error;

/// Core errors produced by the cpg-core crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A node id was not found in the graph.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// An edge id was not found in the graph.
    #[error("edge not found: EdgeId({id})", id = id.0)]
    EdgeNotFound { id: EdgeId },

    /// A node cannot own itself in the syntax tree.
    #[error("node {id} cannot be its own AST child")]
    AstSelfEdge { id: NodeId },

    /// Attaching the child would make it an AST ancestor of itself.
    #[error("attaching {child} below {parent} would create an AST cycle")]
    AstCycle { parent: NodeId, child: NodeId },

    /// A record with the same qualified name is already registered.
    #[error("duplicate record name: '{name}'")]
    DuplicateRecord { name: String },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },
}
