//! The propagation engine: cycle-safe propose / notify.
//!
//! A *wave* starts with one initiating proposal and follows `TypeObserver`
//! edges depth-first, driven by an explicit work stack. The [`Wave`] records
//! every node whose state was recomputed; a node already in the wave ignores
//! further proposals, which is what makes the cyclic observer graph safe to
//! walk. Waves are created per initiating call and never shared.
//!
//! Per-kind behaviour lives in [`rules`](crate::rules); the engine only
//! applies the [`Reaction`] a rule returns.

use indexmap::IndexSet;
use tracing::{debug, trace};

use cpg_core::id::NodeId;
use cpg_core::node::{NodeKind, TypeState};
use cpg_core::types::Type;

use crate::diagnostics::PropagationDiagnostic;
use crate::join::{common_supertype, is_supertype_of};
use crate::rules;
use crate::TypedGraph;

// ---------------------------------------------------------------------------
// Wave and proposal
// ---------------------------------------------------------------------------

/// The visitation set of one propagation wave.
#[derive(Debug, Clone, Default)]
pub struct Wave {
    visited: IndexSet<NodeId>,
}

impl Wave {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wave that already counts `node` as visited, used when `node` itself
    /// is the origin of a broadcast.
    pub fn seeded(node: NodeId) -> Self {
        let mut wave = Self::new();
        wave.visited.insert(node);
        wave
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.visited.contains(&node)
    }

    pub(crate) fn insert(&mut self, node: NodeId) {
        self.visited.insert(node);
    }

    /// Visited nodes in visitation order.
    pub fn visited(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.visited.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// A candidate type together with the concrete sub-types it stands for.
///
/// An `Unknown` `ty` with a non-empty `sub_types` is a sub-type-only
/// proposal: it extends the receiver's candidate set without proposing a new
/// current type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proposal {
    pub ty: Type,
    pub sub_types: IndexSet<Type>,
}

impl Proposal {
    /// A proposal of `ty` standing only for itself.
    pub fn of(ty: Type) -> Self {
        let mut sub_types = IndexSet::new();
        if !ty.is_unknown() {
            sub_types.insert(ty.clone());
        }
        Proposal { ty, sub_types }
    }

    /// Adds to the receiver's sub-types without proposing a current type.
    pub fn sub_types_only(sub_types: impl IntoIterator<Item = Type>) -> Self {
        Proposal {
            ty: Type::Unknown,
            sub_types: sub_types.into_iter().filter(|t| !t.is_unknown()).collect(),
        }
    }

    /// What a node forwards to its dependents: its current type and
    /// sub-types, each seen through a by-reference wrapper.
    pub fn forwarded(state: &TypeState) -> Self {
        Proposal {
            ty: state.current.propagation_type(),
            sub_types: state
                .possible_sub_types
                .iter()
                .map(Type::propagation_type)
                .collect(),
        }
    }

    /// Applies `f` to the type and every sub-type, dropping results that
    /// collapse to `Unknown`. An `Unknown` type stays `Unknown`.
    pub fn map(&self, f: impl Fn(&Type) -> Type) -> Self {
        let ty = if self.ty.is_unknown() {
            Type::Unknown
        } else {
            f(&self.ty)
        };
        Proposal {
            ty,
            sub_types: self
                .sub_types
                .iter()
                .map(&f)
                .filter(|t| !t.is_unknown())
                .collect(),
        }
    }

    /// Carries no information at all.
    pub fn is_empty(&self) -> bool {
        self.ty.is_unknown() && self.sub_types.is_empty()
    }
}

/// What an observer does in response to a change of one of its sources.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// The change is irrelevant to the observer.
    Nothing,
    /// Propose types to nodes (the observer itself or nodes it distributes
    /// to), in order.
    Propose(Vec<(NodeId, Proposal)>),
    /// Recompute the observer (a call) from its invocation targets.
    Reaggregate,
    /// Record a diagnostic and leave every node unchanged.
    Diagnose(PropagationDiagnostic),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Replaces a member similar to `ty` in place, or appends `ty`.
fn merge_similar(set: &mut IndexSet<Type>, ty: Type) {
    match set.iter().position(|existing| existing.similar(&ty)) {
        Some(i) if set[i] != ty => {
            set.shift_remove_index(i);
            set.shift_insert(i, ty);
        }
        Some(_) => {}
        None => {
            set.insert(ty);
        }
    }
}

/// An object with concrete generics is not overwritten by the same object
/// whose generics are still template parameters.
fn stops_propagation(current: &Type, proposed: &Type) -> bool {
    match (current, proposed) {
        (Type::Object(cur), Type::Object(new)) => {
            cur.name == new.name
                && !cur.generics.is_empty()
                && !cur.generics.iter().any(Type::contains_parameterized)
                && new.generics.iter().any(Type::contains_parameterized)
        }
        _ => false,
    }
}

/// One pending step of a wave. Steps live on an explicit stack so that long
/// dependency chains do not grow the call stack.
#[derive(Debug)]
enum Work {
    Propose { node: NodeId, proposal: Proposal },
    Deliver { src: NodeId, observer: NodeId },
    Aggregate { call: NodeId },
}

impl TypedGraph {
    /// Proposes a type to `node` within `wave`.
    ///
    /// The proposal is ignored when `node` was already visited in this wave,
    /// carries no type state, is a template call with unresolved parameters,
    /// or the proposal carries no information. A function-pointer node does
    /// not accept non-function types. Otherwise the proposal is merged into
    /// the node's sub-types, the current type is recomputed as their common
    /// supertype, and dependents are notified when anything changed.
    pub fn propose(&mut self, node: NodeId, proposal: Proposal, wave: &mut Wave) {
        self.run_wave(vec![Work::Propose { node, proposal }], wave);
    }

    /// Notifies every dependent of `src`, in subscription order.
    pub fn notify(&mut self, src: NodeId, wave: &mut Wave) {
        let mut stack = Vec::new();
        self.push_observers(src, &mut stack);
        self.run_wave(stack, wave);
    }

    /// Lets one `observer` react to the current state of `src`.
    pub(crate) fn deliver(&mut self, src: NodeId, observer: NodeId, wave: &mut Wave) {
        self.run_wave(vec![Work::Deliver { src, observer }], wave);
    }

    /// Recomputes a call's type from scratch from every invoked function.
    ///
    /// Each function contributes its return shape (one return type as is,
    /// several as a tuple, none not at all). The call becomes the common
    /// supertype of the contributions, or the first contribution when they
    /// have none, or `Unknown` when there are no contributions. A template
    /// call that was already substituted ignores contributions that still
    /// mention template parameters.
    pub fn aggregate_call(&mut self, call: NodeId, wave: &mut Wave) {
        self.run_wave(vec![Work::Aggregate { call }], wave);
    }

    /// Runs a wave to completion, depth-first. The top of `stack` runs
    /// first; a changed node pushes its observers so that their whole
    /// subtrees run before the next sibling.
    fn run_wave(&mut self, mut stack: Vec<Work>, wave: &mut Wave) {
        while let Some(work) = stack.pop() {
            match work {
                Work::Propose { node, proposal } => {
                    if self.propose_one(node, proposal, wave) {
                        self.push_observers(node, &mut stack);
                    }
                }
                Work::Aggregate { call } => {
                    if self.aggregate_one(call, wave) {
                        self.push_observers(call, &mut stack);
                    }
                }
                Work::Deliver { src, observer } => {
                    match rules::react(&self.graph, &self.profile, observer, src) {
                        Reaction::Nothing => {}
                        Reaction::Propose(proposals) => {
                            stack.extend(
                                proposals
                                    .into_iter()
                                    .rev()
                                    .map(|(node, proposal)| Work::Propose { node, proposal }),
                            );
                        }
                        Reaction::Reaggregate => stack.push(Work::Aggregate { call: observer }),
                        Reaction::Diagnose(diagnostic) => self.report(diagnostic),
                    }
                }
            }
        }
    }

    /// Pushes one delivery per observer of `src`, last subscriber first.
    fn push_observers(&self, src: NodeId, stack: &mut Vec<Work>) {
        stack.extend(
            self.graph
                .observers(src)
                .into_iter()
                .rev()
                .filter(|&observer| observer != src)
                .map(|observer| Work::Deliver { src, observer }),
        );
    }

    /// Applies one proposal. Returns whether `node`'s state changed.
    fn propose_one(&mut self, node: NodeId, proposal: Proposal, wave: &mut Wave) -> bool {
        if wave.contains(node) {
            trace!(%node, "cycle absorbed");
            return false;
        }
        let Some(n) = self.graph.node(node) else {
            return false;
        };
        let Some(state) = n.types.clone() else {
            return false;
        };
        if proposal.is_empty() {
            return false;
        }
        if n.kind.is_pending_template() {
            self.report(PropagationDiagnostic::UnresolvedTemplate {
                node,
                proposed: proposal.ty,
            });
            return false;
        }

        let ty = proposal.ty;
        if !ty.is_unknown() {
            if state.current.is_function_pointer() && !ty.is_function_pointer() {
                return false;
            }
            if stops_propagation(&state.current, &ty) {
                return false;
            }
        }

        let mut sub_types = state.possible_sub_types.clone();
        for sub in proposal.sub_types {
            merge_similar(&mut sub_types, sub);
        }

        let current = if ty.is_unknown() {
            state.current.clone()
        } else {
            merge_similar(&mut sub_types, ty.clone());
            match common_supertype(&self.graph.records, &sub_types) {
                Some(joined) => joined,
                None => {
                    self.report(PropagationDiagnostic::NoCommonSupertype {
                        node,
                        candidates: sub_types.iter().cloned().collect(),
                        chosen: ty.clone(),
                    });
                    ty
                }
            }
        };

        if !current.is_unknown() {
            let records = &self.graph.records;
            sub_types.retain(|sub| is_supertype_of(records, &current, sub));
        }

        let next = TypeState {
            current,
            possible_sub_types: sub_types,
        };
        self.commit(node, state, next, wave)
    }

    /// Recomputes one call. Returns whether its state changed.
    fn aggregate_one(&mut self, call: NodeId, wave: &mut Wave) -> bool {
        if wave.contains(call) {
            trace!(node = %call, "cycle absorbed");
            return false;
        }
        let Some(n) = self.graph.node(call) else {
            return false;
        };
        let substituted = match &n.kind {
            NodeKind::Call { template } => template.as_ref().is_some_and(|t| t.resolved),
            _ => return false,
        };
        if n.kind.is_pending_template() {
            return false;
        }
        let Some(previous) = n.types.clone() else {
            return false;
        };

        let candidates: Vec<Type> = self
            .graph
            .invokes(call)
            .into_iter()
            .filter_map(|f| self.graph.types(f))
            .filter_map(|state| state.current.return_shape())
            .filter(|t| !t.is_unknown())
            .filter(|t| !(substituted && t.contains_parameterized()))
            .collect();
        if substituted && candidates.is_empty() {
            // The substituted type stands until a concrete target shows up.
            wave.insert(call);
            return false;
        }

        let current = match common_supertype(&self.graph.records, &candidates) {
            Some(joined) => joined,
            None => match candidates.first() {
                Some(first) => {
                    self.report(PropagationDiagnostic::NoCommonSupertype {
                        node: call,
                        candidates: candidates.clone(),
                        chosen: first.clone(),
                    });
                    first.clone()
                }
                None => Type::Unknown,
            },
        };

        let records = &self.graph.records;
        let mut sub_types = IndexSet::new();
        for candidate in &candidates {
            if is_supertype_of(records, &current, candidate) {
                merge_similar(&mut sub_types, candidate.clone());
            }
        }
        debug!(node = %call, candidates = candidates.len(), ty = %current, "call aggregated");

        let next = TypeState {
            current,
            possible_sub_types: sub_types,
        };
        self.commit(call, previous, next, wave)
    }

    /// Stores `next` as the state of `node` and registers `node` in the
    /// wave. Returns whether the state differs from `previous`.
    fn commit(
        &mut self,
        node: NodeId,
        previous: TypeState,
        next: TypeState,
        wave: &mut Wave,
    ) -> bool {
        wave.insert(node);
        if next == previous {
            return false;
        }
        debug!(%node, from = %previous.current, to = %next.current, "type changed");
        if let Some(slot) = self.graph.types_mut(node) {
            *slot = next;
        }
        true
    }
}
