//! Edge kinds and edge properties.
//!
//! Every edge in the [`CodeGraph`](crate::graph::CodeGraph) is directed and
//! labeled with an [`EdgeKind`]. AST edges express exclusive ownership and
//! form a tree; every other kind is a plain, non-owning reference and may
//! form cycles (type observers, data flow, invocation targets).
//!
//! Edges carry an insertion-ordered [`EdgeProperties`] map. The two
//! properties the graph itself interprets are [`Property::Index`] (position
//! inside an ordered list such as call arguments or assignment sides) and
//! [`Property::Access`] (read / write / read-write).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Edge kinds
// ---------------------------------------------------------------------------

/// The role a child plays below its AST owner.
///
/// Ordered child lists (arguments, assignment sides, list elements) share one
/// role and are told apart by their [`Property::Index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AstRole {
    /// Generic structural child (translation unit members, block statements).
    Child,
    /// Declarations owned by a declaration statement or a record.
    Declaration,
    /// Function parameters.
    Parameter,
    /// Function or block body.
    Body,
    /// Initializer of a variable, field or `new` expression.
    Initializer,
    /// Left-hand side of an assignment or binary operator.
    Lhs,
    /// Right-hand side of an assignment or binary operator.
    Rhs,
    /// Call or construct argument.
    Argument,
    /// Base of a member access or subscript.
    Base,
    /// Index of a subscript.
    Subscript,
    /// Operand of a unary operator or cast.
    Operand,
    /// Condition of a conditional expression.
    Condition,
    /// Branch taken when the condition holds.
    Then,
    /// Branch taken otherwise.
    Else,
    /// Element of an initializer list or expression list.
    Element,
    /// Value of a return statement.
    Value,
}

/// Edge types in the code property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Syntax-tree ownership. Each node has at most one incoming AST edge.
    Ast(AstRole),
    /// Data flow from source to target.
    Dfg,
    /// Evaluation order from source to target.
    Eog,
    /// A reference expression points at the declaration it names.
    RefersTo,
    /// A call points at a function it may invoke.
    Invokes,
    /// The target must be notified when the source's type information changes.
    TypeObserver,
}

impl EdgeKind {
    /// Returns `true` if this is an ownership edge.
    pub fn is_ast(&self) -> bool {
        matches!(self, EdgeKind::Ast(_))
    }

    /// Returns the AST role, if this is an ownership edge.
    pub fn ast_role(&self) -> Option<AstRole> {
        match self {
            EdgeKind::Ast(role) => Some(*role),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// How an expression is accessed at the place it occurs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    #[default]
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Returns `true` for `Write` and `ReadWrite`.
    pub fn writes(&self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }
}

/// Property keys understood by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    Index,
    Access,
    Name,
}

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(u32),
    Access(AccessMode),
    Text(String),
}

/// Insertion-ordered property map attached to an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeProperties(IndexMap<Property, PropertyValue>);

impl EdgeProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties holding only an index.
    pub fn indexed(index: u32) -> Self {
        let mut props = Self::new();
        props.set_index(index);
        props
    }

    pub fn get(&self, key: Property) -> Option<&PropertyValue> {
        self.0.get(&key)
    }

    pub fn insert(&mut self, key: Property, value: PropertyValue) -> Option<PropertyValue> {
        self.0.insert(key, value)
    }

    pub fn index(&self) -> Option<u32> {
        match self.0.get(&Property::Index) {
            Some(PropertyValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn set_index(&mut self, index: u32) {
        self.0.insert(Property::Index, PropertyValue::Int(index));
    }

    pub fn access(&self) -> Option<AccessMode> {
        match self.0.get(&Property::Access) {
            Some(PropertyValue::Access(mode)) => Some(*mode),
            _ => None,
        }
    }

    pub fn set_access(&mut self, mode: AccessMode) {
        self.0.insert(Property::Access, PropertyValue::Access(mode));
    }

    pub fn name(&self) -> Option<&str> {
        match self.0.get(&Property::Name) {
            Some(PropertyValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Iterates properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Property, &PropertyValue)> {
        self.0.iter()
    }
}

/// A labeled, directed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub properties: EdgeProperties,
}

impl Edge {
    pub fn new(kind: EdgeKind, properties: EdgeProperties) -> Self {
        Edge { kind, properties }
    }

    /// Ordering key used when an ordered edge list is requested.
    /// Edges without an index sort after indexed ones.
    pub fn order_key(&self) -> u32 {
        self.properties.index().unwrap_or(u32::MAX)
    }
}
