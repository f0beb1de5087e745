//! Propagation scheduling.
//!
//! In [`PropagationMode::Live`] every update runs to completion inside the
//! call that caused it. In [`PropagationMode::Deferred`] updates are queued
//! and run by [`TypedGraph::flush`], e.g. after a frontend has built a whole
//! translation unit. Each queued item runs with its own fresh [`Wave`], just
//! as it would have in live mode.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cpg_core::id::NodeId;

use crate::engine::{Proposal, Wave};
use crate::TypedGraph;

/// When propagation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationMode {
    /// Immediately, synchronously, inside the mutating call.
    #[default]
    Live,
    /// Queued until [`TypedGraph::flush`].
    Deferred,
}

/// One unit of propagation work.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    /// Propose a type to a node.
    Propose { node: NodeId, proposal: Proposal },
    /// Let one observer react to the current state of `src`.
    Notify { src: NodeId, observer: NodeId },
    /// Re-broadcast a node's state to all its dependents.
    Refresh { node: NodeId },
    /// Recompute a call from its invocation targets.
    Aggregate { call: NodeId },
}

impl TypedGraph {
    /// Runs `work` now or queues it, depending on the mode.
    pub(crate) fn schedule(&mut self, work: Pending) {
        match self.mode {
            PropagationMode::Live => self.run(work),
            PropagationMode::Deferred => self.pending.push_back(work),
        }
    }

    fn run(&mut self, work: Pending) {
        match work {
            Pending::Propose { node, proposal } => {
                self.propose(node, proposal, &mut Wave::new());
            }
            Pending::Notify { src, observer } => {
                if self.graph.contains(src) && self.graph.contains(observer) {
                    self.deliver(src, observer, &mut Wave::seeded(src));
                }
            }
            Pending::Refresh { node } => {
                if self.graph.contains(node) {
                    self.notify(node, &mut Wave::seeded(node));
                }
            }
            Pending::Aggregate { call } => self.aggregate_call(call, &mut Wave::new()),
        }
    }

    /// Runs every queued update in FIFO order, including updates queued
    /// while flushing. A no-op in live mode.
    pub fn flush(&mut self) {
        let mut ran = 0usize;
        while let Some(work) = self.pending.pop_front() {
            self.run(work);
            ran += 1;
        }
        if ran > 0 {
            debug!(updates = ran, "flushed deferred propagation");
        }
    }

    /// Number of queued updates.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
