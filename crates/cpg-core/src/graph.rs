//! CodeGraph: the property-graph container every pass works on.
//!
//! [`CodeGraph`] owns a single petgraph `StableGraph` of [`Node`]s and
//! [`Edge`]s plus the [`RecordHierarchy`]. All mutations go through its
//! methods so the structural invariants hold at all times:
//!
//! - every node has at most one incoming AST edge (single ownership), and the
//!   AST edges form a tree,
//! - the `Index` properties of an ordered AST child list are contiguous
//!   (`0..n`) after every insert, remove and re-parent,
//! - a node never observes itself, and an observer is registered at most once
//!   per source.
//!
//! Non-AST edges carry no ownership and may form arbitrary cycles.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::graphmap::DiGraphMap;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::edge::{AccessMode, AstRole, Edge, EdgeKind, EdgeProperties};
use crate::error::CoreError;
use crate::hierarchy::RecordHierarchy;
use crate::id::{EdgeId, NodeId};
use crate::node::{Node, TypeState};

/// The code property graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeGraph {
    graph: StableGraph<Node, Edge, Directed, u32>,
    /// Records and their declared super-records.
    pub records: RecordHierarchy,
    /// Monotonic counter for subscription order of observer edges.
    next_sequence: u32,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Adds a node and returns its graph-local id.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        NodeId::from(self.graph.add_node(node))
    }

    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.into())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.graph.node_weight_mut(id.into())
    }

    /// Like [`node`](Self::node) but reports a missing node as an error.
    pub fn get(&self, id: NodeId) -> Result<&Node, CoreError> {
        self.node(id).ok_or(CoreError::NodeNotFound { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains_node(id.into())
    }

    /// First node (in id order) with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_ids()
            .find(|&id| self.node(id).is_some_and(|n| n.name == name))
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(NodeId::from)
    }

    /// The type state of a type-bearing node.
    pub fn types(&self, id: NodeId) -> Option<&TypeState> {
        self.node(id).and_then(|n| n.types.as_ref())
    }

    pub fn types_mut(&mut self, id: NodeId) -> Option<&mut TypeState> {
        self.node_mut(id).and_then(|n| n.types.as_mut())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn check(&self, id: NodeId) -> Result<NodeIndex<u32>, CoreError> {
        let idx: NodeIndex<u32> = id.into();
        if self.graph.contains_node(idx) {
            Ok(idx)
        } else {
            Err(CoreError::NodeNotFound { id })
        }
    }

    // -----------------------------------------------------------------------
    // Generic edges
    // -----------------------------------------------------------------------

    /// Adds a non-owning edge. Self edges are allowed.
    ///
    /// AST edges must go through [`add_ast_child`](Self::add_ast_child).
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        kind: EdgeKind,
        properties: EdgeProperties,
    ) -> Result<EdgeId, CoreError> {
        if kind.is_ast() {
            return Err(CoreError::InvalidEdge {
                reason: "AST edges are attached with add_ast_child".into(),
            });
        }
        let from_idx = self.check(from)?;
        let to_idx = self.check(to)?;
        let idx = self
            .graph
            .add_edge(from_idx, to_idx, Edge::new(kind, properties));
        Ok(EdgeId::from(idx))
    }

    /// Removes any edge. Ordered AST lists are renumbered.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, CoreError> {
        let idx: EdgeIndex<u32> = id.into();
        let (parent, _) = self
            .graph
            .edge_endpoints(idx)
            .ok_or(CoreError::EdgeNotFound { id })?;
        let edge = self
            .graph
            .remove_edge(idx)
            .ok_or(CoreError::EdgeNotFound { id })?;
        if let Some(role) = edge.kind.ast_role() {
            self.renumber(NodeId::from(parent), role);
        }
        Ok(edge)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.graph.edge_weight(id.into())
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.graph.edge_weight_mut(id.into())
    }

    /// Outgoing edges of `kind` as `(edge, target)`, ordered by their
    /// `Index` property and then by edge id.
    pub fn outgoing(&self, id: NodeId, kind: EdgeKind) -> Vec<(EdgeId, NodeId)> {
        self.ordered(id, kind, Direction::Outgoing)
    }

    /// Incoming edges of `kind` as `(edge, source)`, in the same order as
    /// [`outgoing`](Self::outgoing).
    pub fn incoming(&self, id: NodeId, kind: EdgeKind) -> Vec<(EdgeId, NodeId)> {
        self.ordered(id, kind, Direction::Incoming)
    }

    fn ordered(&self, id: NodeId, kind: EdgeKind, dir: Direction) -> Vec<(EdgeId, NodeId)> {
        let idx: NodeIndex<u32> = id.into();
        if !self.graph.contains_node(idx) {
            return Vec::new();
        }
        let mut edges: Vec<(u32, EdgeId, NodeId)> = self
            .graph
            .edges_directed(idx, dir)
            .filter(|e| e.weight().kind == kind)
            .map(|e| {
                let other = match dir {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (e.weight().order_key(), EdgeId::from(e.id()), NodeId::from(other))
            })
            .collect();
        edges.sort_by_key(|(key, edge, _)| (*key, *edge));
        edges.into_iter().map(|(_, edge, node)| (edge, node)).collect()
    }

    // -----------------------------------------------------------------------
    // AST ownership
    // -----------------------------------------------------------------------

    /// Appends `child` to `parent`'s list for `role`.
    ///
    /// A child that already has an AST owner is detached from it first.
    pub fn add_ast_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        role: AstRole,
    ) -> Result<EdgeId, CoreError> {
        self.insert_ast_child(parent, child, role, usize::MAX)
    }

    /// Inserts `child` at `position` in `parent`'s list for `role`, shifting
    /// later siblings. Positions past the end append.
    pub fn insert_ast_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        role: AstRole,
        position: usize,
    ) -> Result<EdgeId, CoreError> {
        let parent_idx = self.check(parent)?;
        let child_idx = self.check(child)?;
        if parent == child {
            return Err(CoreError::AstSelfEdge { id: child });
        }
        if self.ast_ancestors(parent).contains(&child) {
            return Err(CoreError::AstCycle { parent, child });
        }

        if let Some((old_edge, _)) = self.ast_owner_edge(child) {
            self.remove_edge(old_edge)?;
        }

        let siblings = self.ast_children_edges(parent, role);
        let position = position.min(siblings.len());
        for (i, (edge, _)) in siblings.iter().enumerate().skip(position) {
            if let Some(e) = self.graph.edge_weight_mut((*edge).into()) {
                e.properties.set_index((i + 1) as u32);
            }
        }

        let idx = self.graph.add_edge(
            parent_idx,
            child_idx,
            Edge::new(EdgeKind::Ast(role), EdgeProperties::indexed(position as u32)),
        );
        Ok(EdgeId::from(idx))
    }

    /// Detaches `child` from `parent`. Later siblings move up one position.
    pub fn remove_ast_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        match self.ast_owner_edge(child) {
            Some((edge, owner)) if owner == parent => {
                self.remove_edge(edge)?;
                Ok(())
            }
            _ => Err(CoreError::InvalidEdge {
                reason: format!("{child} is not an AST child of {parent}"),
            }),
        }
    }

    /// The AST owner of `child`, if any.
    pub fn ast_parent(&self, child: NodeId) -> Option<NodeId> {
        self.ast_owner_edge(child).map(|(_, parent)| parent)
    }

    /// The role `child` plays below its owner.
    pub fn ast_role(&self, child: NodeId) -> Option<AstRole> {
        let (edge, _) = self.ast_owner_edge(child)?;
        self.edge(edge).and_then(|e| e.kind.ast_role())
    }

    /// Position of `child` inside its owner's list.
    pub fn ast_index(&self, child: NodeId) -> Option<u32> {
        let (edge, _) = self.ast_owner_edge(child)?;
        self.edge(edge).and_then(|e| e.properties.index())
    }

    /// Children of `parent` for `role`, in list order.
    pub fn ast_children(&self, parent: NodeId, role: AstRole) -> Vec<NodeId> {
        self.ast_children_edges(parent, role)
            .into_iter()
            .map(|(_, child)| child)
            .collect()
    }

    /// The first child for `role` (for single-child roles like `Operand`).
    pub fn ast_child(&self, parent: NodeId, role: AstRole) -> Option<NodeId> {
        self.ast_children(parent, role).into_iter().next()
    }

    fn ast_children_edges(&self, parent: NodeId, role: AstRole) -> Vec<(EdgeId, NodeId)> {
        self.outgoing(parent, EdgeKind::Ast(role))
    }

    fn ast_owner_edge(&self, child: NodeId) -> Option<(EdgeId, NodeId)> {
        let idx: NodeIndex<u32> = child.into();
        if !self.graph.contains_node(idx) {
            return None;
        }
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .find(|e| e.weight().kind.is_ast())
            .map(|e| (EdgeId::from(e.id()), NodeId::from(e.source())))
    }

    /// `id` and every AST owner above it, nearest first.
    fn ast_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.ast_parent(current) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    fn renumber(&mut self, parent: NodeId, role: AstRole) {
        for (i, (edge, _)) in self.ast_children_edges(parent, role).into_iter().enumerate() {
            if let Some(e) = self.graph.edge_weight_mut(edge.into()) {
                e.properties.set_index(i as u32);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Access modes
    // -----------------------------------------------------------------------

    /// How `node` is accessed where it occurs. Nodes without an owner, and
    /// owner edges without an explicit mode, are reads.
    pub fn access_mode(&self, node: NodeId) -> AccessMode {
        self.ast_owner_edge(node)
            .and_then(|(edge, _)| self.edge(edge))
            .and_then(|e| e.properties.access())
            .unwrap_or_default()
    }

    /// Stores the access mode on the AST edge owning `node`.
    pub fn set_access_mode(&mut self, node: NodeId, mode: AccessMode) -> Result<(), CoreError> {
        self.check(node)?;
        let (edge, _) = self.ast_owner_edge(node).ok_or_else(|| CoreError::InvalidEdge {
            reason: format!("{node} has no AST owner to carry an access mode"),
        })?;
        if let Some(e) = self.edge_mut(edge) {
            e.properties.set_access(mode);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // References and invocations
    // -----------------------------------------------------------------------

    /// The declaration a reference resolves to.
    pub fn refers_to(&self, reference: NodeId) -> Option<NodeId> {
        self.outgoing(reference, EdgeKind::RefersTo)
            .first()
            .map(|(_, target)| *target)
    }

    /// Replaces the `RefersTo` back-link. Returns the previous target.
    pub fn set_refers_to(
        &mut self,
        reference: NodeId,
        declaration: Option<NodeId>,
    ) -> Result<Option<NodeId>, CoreError> {
        self.check(reference)?;
        let previous = self.refers_to(reference);
        for (edge, _) in self.outgoing(reference, EdgeKind::RefersTo) {
            self.graph.remove_edge(edge.into());
        }
        if let Some(decl) = declaration {
            self.add_edge(reference, decl, EdgeKind::RefersTo, EdgeProperties::new())?;
        }
        Ok(previous)
    }

    /// Functions a call may invoke, in resolution order.
    pub fn invokes(&self, call: NodeId) -> Vec<NodeId> {
        self.outgoing(call, EdgeKind::Invokes)
            .into_iter()
            .map(|(_, f)| f)
            .collect()
    }

    /// Replaces every `Invokes` edge of `call`. Returns the previous targets.
    pub fn set_invokes_edges(
        &mut self,
        call: NodeId,
        functions: &[NodeId],
    ) -> Result<Vec<NodeId>, CoreError> {
        self.check(call)?;
        for &f in functions {
            self.check(f)?;
        }
        let previous = self.invokes(call);
        for (edge, _) in self.outgoing(call, EdgeKind::Invokes) {
            self.graph.remove_edge(edge.into());
        }
        for (i, &f) in functions.iter().enumerate() {
            self.add_edge(call, f, EdgeKind::Invokes, EdgeProperties::indexed(i as u32))?;
        }
        Ok(previous)
    }

    // -----------------------------------------------------------------------
    // Type observers
    // -----------------------------------------------------------------------

    /// Dependents of `src`, in subscription order.
    pub fn observers(&self, src: NodeId) -> Vec<NodeId> {
        self.outgoing(src, EdgeKind::TypeObserver)
            .into_iter()
            .map(|(_, dst)| dst)
            .collect()
    }

    /// Subscribes `dst` to type changes of `src`.
    ///
    /// Returns `false` without touching the graph for self-observation and
    /// for an already registered pair.
    pub fn add_observer(&mut self, src: NodeId, dst: NodeId) -> Result<bool, CoreError> {
        self.check(src)?;
        self.check(dst)?;
        if src == dst || self.observers(src).contains(&dst) {
            return Ok(false);
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.add_edge(
            src,
            dst,
            EdgeKind::TypeObserver,
            EdgeProperties::indexed(sequence),
        )?;
        Ok(true)
    }

    /// Unsubscribes `dst` from `src`. Returns whether a subscription existed.
    pub fn remove_observer(&mut self, src: NodeId, dst: NodeId) -> bool {
        let edges: Vec<EdgeId> = self
            .outgoing(src, EdgeKind::TypeObserver)
            .into_iter()
            .filter(|(_, target)| *target == dst)
            .map(|(edge, _)| edge)
            .collect();
        for edge in &edges {
            self.graph.remove_edge((*edge).into());
        }
        !edges.is_empty()
    }

    /// Strongly connected components of the observer subgraph with more than
    /// one member. Each component is sorted by node id.
    pub fn observer_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut observers: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for edge in self.graph.edge_references() {
            if edge.weight().kind == EdgeKind::TypeObserver {
                observers.add_edge(NodeId::from(edge.source()), NodeId::from(edge.target()), ());
            }
        }
        let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&observers)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|mut component| {
                component.sort();
                component
            })
            .collect();
        cycles.sort();
        cycles
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serializes the whole graph (nodes, edges, records) as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
