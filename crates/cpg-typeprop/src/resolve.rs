//! Entry points for the passes that run after node construction (symbol and
//! call resolution, template expansion) and type queries.

use tracing::debug;

use cpg_core::id::NodeId;
use cpg_core::node::{NodeKind, TypeState};
use cpg_core::types::Type;

use crate::engine::Proposal;
use crate::strategy::Pending;
use crate::{TypePropError, TypedGraph};

impl TypedGraph {
    /// Resolves `reference` to `declaration`.
    ///
    /// Subscriptions to a previous target (in both directions) are dropped
    /// and the reference forgets the types it learned from it. The reference
    /// then subscribes to the declaration and reacts to its current state
    /// once. A reference that is written to also feeds an untyped
    /// declaration.
    pub fn resolve_reference(
        &mut self,
        reference: NodeId,
        declaration: NodeId,
    ) -> Result<(), TypePropError> {
        let node = self.graph.get(reference)?;
        if !node.kind.is_reference_like() {
            return Err(TypePropError::WrongKind {
                id: reference,
                expected: "Reference",
                actual: node.kind.label(),
            });
        }
        self.graph.get(declaration)?;

        let previous = self.graph.set_refers_to(reference, Some(declaration))?;
        if let Some(previous) = previous.filter(|&p| p != declaration) {
            self.graph.remove_observer(previous, reference);
            self.graph.remove_observer(reference, previous);
            if let Some(state) = self.graph.types_mut(reference) {
                *state = TypeState::default();
            }
        }
        debug!(%reference, %declaration, "reference resolved");

        self.graph.add_observer(declaration, reference)?;
        self.schedule(Pending::Notify {
            src: declaration,
            observer: reference,
        });
        self.link_write_back(reference)
    }

    /// Subscribes an untyped variable, field or parameter to a reference
    /// that writes to it.
    pub(crate) fn link_write_back(&mut self, reference: NodeId) -> Result<(), TypePropError> {
        if !self.graph.access_mode(reference).writes() {
            return Ok(());
        }
        let Some(declaration) = self.graph.refers_to(reference) else {
            return Ok(());
        };
        let untyped = self.graph.node(declaration).is_some_and(|n| {
            matches!(
                n.kind,
                NodeKind::Variable { declared: None }
                    | NodeKind::Field { declared: None }
                    | NodeKind::Parameter { declared: None, .. }
            )
        });
        if untyped {
            self.subscribe(reference, declaration)?;
        }
        Ok(())
    }

    /// Replaces the functions `call` may invoke and recomputes its type.
    pub fn set_invokes(&mut self, call: NodeId, functions: &[NodeId]) -> Result<(), TypePropError> {
        let node = self.graph.get(call)?;
        if !matches!(node.kind, NodeKind::Call { .. }) {
            return Err(TypePropError::WrongKind {
                id: call,
                expected: "Call",
                actual: node.kind.label(),
            });
        }

        let previous = self.graph.set_invokes_edges(call, functions)?;
        for f in previous {
            self.graph.remove_observer(f, call);
        }
        for &f in functions {
            self.graph.add_observer(f, call)?;
        }
        debug!(%call, targets = functions.len(), "invocation targets set");
        self.schedule(Pending::Aggregate { call });
        Ok(())
    }

    /// Sets `node`'s type directly, bypassing the proposal guards, and
    /// notifies its dependents. A pending template call becomes resolved and
    /// accepts proposals from then on.
    pub fn substitute_type(&mut self, node: NodeId, ty: Type) -> Result<(), TypePropError> {
        self.require_type_bearing(node)?;
        if let Some(n) = self.graph.node_mut(node) {
            if let NodeKind::Call {
                template: Some(template),
            } = &mut n.kind
            {
                template.resolved = true;
            }
            n.types = Some(TypeState::known(ty));
        }
        self.schedule(Pending::Refresh { node });
        Ok(())
    }

    /// Proposes `ty` to `node` in a new wave.
    pub fn set_type(&mut self, node: NodeId, ty: Type) -> Result<(), TypePropError> {
        self.require_type_bearing(node)?;
        self.schedule(Pending::Propose {
            node,
            proposal: Proposal::of(ty),
        });
        Ok(())
    }

    /// Re-broadcasts `node`'s state to all its dependents.
    pub fn refresh(&mut self, node: NodeId) -> Result<(), TypePropError> {
        self.require_type_bearing(node)?;
        self.schedule(Pending::Refresh { node });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current type; `Unknown` for unknown nodes and nodes without types.
    pub fn type_of(&self, node: NodeId) -> Type {
        self.graph
            .types(node)
            .map(|s| s.current.clone())
            .unwrap_or_default()
    }

    pub fn sub_types_of(&self, node: NodeId) -> Vec<Type> {
        self.graph
            .types(node)
            .map(|s| s.possible_sub_types.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn type_state(&self, node: NodeId) -> Option<&TypeState> {
        self.graph.types(node)
    }
}
