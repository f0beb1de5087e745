//! Incremental type propagation over a code property graph.
//!
//! [`TypedGraph`] wraps a [`CodeGraph`] and keeps every type-bearing node's
//! [`TypeState`](cpg_core::TypeState) up to date as frontends add nodes and
//! resolution passes attach references and call targets:
//!
//! - [`builder`]: frontend-facing constructors that create nodes, wire AST
//!   edges and subscribe each node to the nodes its type depends on.
//! - [`resolve`]: entry points for symbol/call resolution and template
//!   substitution, plus type queries.
//! - [`engine`]: the cycle-safe propose / notify protocol.
//! - [`rules`]: how each node kind reacts to a change of one of its sources.
//! - [`join`]: common supertype and supertype checks.
//! - [`assign`]: positional target lookup for assignments.
//!
//! Every update runs to completion before the call that triggered it returns
//! ([`PropagationMode::Live`]), unless the graph was created in
//! [`PropagationMode::Deferred`] mode, in which case updates queue up until
//! [`TypedGraph::flush`].

pub mod assign;
pub mod builder;
pub mod diagnostics;
pub mod engine;
pub mod join;
pub mod profile;
pub mod resolve;
pub mod rules;
pub mod strategy;

pub use diagnostics::PropagationDiagnostic;
pub use engine::{Proposal, Wave};
pub use profile::{LanguageProfile, ProfileError};
pub use strategy::PropagationMode;

use std::collections::VecDeque;

use cpg_core::error::CoreError;
use cpg_core::graph::CodeGraph;
use cpg_core::id::NodeId;

use strategy::Pending;

/// Errors returned by the builder and resolution entry points.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypePropError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The node carries no type state (statements, records, ...).
    #[error("node {id} is not type-bearing")]
    NotTypeBearing { id: NodeId },

    /// The operation needs a node of a different kind.
    #[error("node {id} is a {actual}, expected {expected}")]
    WrongKind {
        id: NodeId,
        expected: &'static str,
        actual: &'static str,
    },
}

/// A code property graph with live type propagation.
#[derive(Debug)]
pub struct TypedGraph {
    graph: CodeGraph,
    profile: LanguageProfile,
    mode: PropagationMode,
    pending: VecDeque<Pending>,
    diagnostics: Vec<PropagationDiagnostic>,
}

impl Default for TypedGraph {
    fn default() -> Self {
        Self::new(LanguageProfile::default(), PropagationMode::Live)
    }
}

impl TypedGraph {
    pub fn new(profile: LanguageProfile, mode: PropagationMode) -> Self {
        TypedGraph {
            graph: CodeGraph::new(),
            profile,
            mode,
            pending: VecDeque::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Wraps an existing graph, e.g. one loaded from JSON. Type states are
    /// taken as they are; call [`refresh`](Self::refresh) to re-broadcast.
    pub fn from_graph(graph: CodeGraph, profile: LanguageProfile, mode: PropagationMode) -> Self {
        TypedGraph {
            graph,
            ..Self::new(profile, mode)
        }
    }

    /// Read-only access to the underlying graph.
    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    pub fn into_graph(self) -> CodeGraph {
        self.graph
    }

    pub fn profile(&self) -> &LanguageProfile {
        &self.profile
    }

    pub fn mode(&self) -> PropagationMode {
        self.mode
    }

    /// Diagnostics recorded so far, in the order they occurred.
    pub fn diagnostics(&self) -> &[PropagationDiagnostic] {
        &self.diagnostics
    }

    /// Drains the recorded diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<PropagationDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Records a diagnostic once; repeats of an identical finding are
    /// dropped.
    pub(crate) fn report(&mut self, diagnostic: PropagationDiagnostic) {
        if self.diagnostics.contains(&diagnostic) {
            return;
        }
        tracing::debug!(%diagnostic, "propagation diagnostic");
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn require_type_bearing(&self, id: NodeId) -> Result<(), TypePropError> {
        let node = self.graph.get(id)?;
        if node.types.is_some() {
            Ok(())
        } else {
            Err(TypePropError::NotTypeBearing { id })
        }
    }
}
