//! Graph vertices: the declaration / statement / expression taxonomy.
//!
//! A [`Node`] wraps a [`NodeKind`] with identity and source metadata. Every
//! value declaration and every expression is *type-bearing*: it carries a
//! [`TypeState`] holding its current type and the set of concrete sub-types
//! it may represent. Statements and structural declarations do not.
//!
//! Children are not stored on the node. They hang off AST edges in the
//! [`CodeGraph`](crate::graph::CodeGraph), labeled with their
//! [`AstRole`](crate::edge::AstRole).

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::id::NodeUid;
use crate::types::Type;

// ---------------------------------------------------------------------------
// Type state
// ---------------------------------------------------------------------------

/// Per-node type information maintained by the propagation engine.
///
/// `current` is the best common super-type of `possible_sub_types` as of the
/// last recomputation, or `Unknown` when nothing is known yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeState {
    pub current: Type,
    pub possible_sub_types: IndexSet<Type>,
}

impl TypeState {
    /// A state fixed to a single known type.
    pub fn known(ty: Type) -> Self {
        let mut possible_sub_types = IndexSet::new();
        if !ty.is_unknown() {
            possible_sub_types.insert(ty.clone());
        }
        TypeState {
            current: ty,
            possible_sub_types,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.current.is_unknown()
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Location of a node in its source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// The flavour of a record declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Class,
    Struct,
    Union,
    Interface,
}

/// Template arguments of a call site that instantiates a template.
///
/// While `resolved` is `false` the call ignores incoming type proposals; the
/// template expansion collaborator substitutes the concrete type directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateArgs {
    pub parameters: Vec<Type>,
    pub resolved: bool,
}

impl TemplateArgs {
    pub fn pending(parameters: Vec<Type>) -> Self {
        TemplateArgs {
            parameters,
            resolved: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Every kind of vertex in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    // -- Declarations --
    TranslationUnit,
    Namespace,
    Record {
        kind: RecordKind,
        super_types: Vec<String>,
    },
    Function {
        return_types: Vec<Type>,
    },
    Parameter {
        declared: Option<Type>,
        variadic: bool,
    },
    Variable {
        declared: Option<Type>,
    },
    Field {
        declared: Option<Type>,
    },

    // -- Statements --
    Block,
    DeclarationStatement,
    Return,

    // -- Expressions --
    Literal {
        ty: Type,
    },
    Reference,
    MemberAccess {
        member: String,
    },
    Call {
        template: Option<TemplateArgs>,
    },
    Construct {
        record: Type,
    },
    New,
    BinaryOperator {
        op: String,
    },
    UnaryOperator {
        op: String,
        postfix: bool,
    },
    Assign {
        op: String,
        used_as_expression: bool,
    },
    Cast {
        target: Type,
    },
    InitializerList,
    Conditional,
    Subscript,
    ExpressionList,
}

impl NodeKind {
    /// Variables, fields, parameters and functions: the sources of truth for
    /// a symbol's type.
    pub fn is_value_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::Function { .. }
                | NodeKind::Parameter { .. }
                | NodeKind::Variable { .. }
                | NodeKind::Field { .. }
        )
    }

    pub fn is_declaration(&self) -> bool {
        self.is_value_declaration()
            || matches!(
                self,
                NodeKind::TranslationUnit | NodeKind::Namespace | NodeKind::Record { .. }
            )
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::Block | NodeKind::DeclarationStatement | NodeKind::Return
        )
    }

    pub fn is_expression(&self) -> bool {
        !self.is_declaration() && !self.is_statement()
    }

    /// Whether nodes of this kind carry a [`TypeState`].
    pub fn is_type_bearing(&self) -> bool {
        self.is_value_declaration() || self.is_expression()
    }

    /// Reference-like expressions get a resolved-declaration back-link.
    pub fn is_reference_like(&self) -> bool {
        matches!(self, NodeKind::Reference | NodeKind::MemberAccess { .. })
    }

    /// The type a frontend annotated on a declaration, if any.
    pub fn declared_type(&self) -> Option<&Type> {
        match self {
            NodeKind::Parameter { declared, .. }
            | NodeKind::Variable { declared }
            | NodeKind::Field { declared } => declared.as_ref(),
            _ => None,
        }
    }

    /// Whether this is a template call site whose parameters are not yet
    /// substituted.
    pub fn is_pending_template(&self) -> bool {
        matches!(
            self,
            NodeKind::Call {
                template: Some(TemplateArgs {
                    resolved: false,
                    ..
                })
            }
        )
    }

    /// Short, stable label for diagnostics and exports.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::TranslationUnit => "TranslationUnit",
            NodeKind::Namespace => "Namespace",
            NodeKind::Record { .. } => "Record",
            NodeKind::Function { .. } => "Function",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::Variable { .. } => "Variable",
            NodeKind::Field { .. } => "Field",
            NodeKind::Block => "Block",
            NodeKind::DeclarationStatement => "DeclarationStatement",
            NodeKind::Return => "Return",
            NodeKind::Literal { .. } => "Literal",
            NodeKind::Reference => "Reference",
            NodeKind::MemberAccess { .. } => "MemberAccess",
            NodeKind::Call { .. } => "Call",
            NodeKind::Construct { .. } => "Construct",
            NodeKind::New => "New",
            NodeKind::BinaryOperator { .. } => "BinaryOperator",
            NodeKind::UnaryOperator { .. } => "UnaryOperator",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::Cast { .. } => "Cast",
            NodeKind::InitializerList => "InitializerList",
            NodeKind::Conditional => "Conditional",
            NodeKind::Subscript => "Subscript",
            NodeKind::ExpressionList => "ExpressionList",
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A vertex of the code property graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Process-unique identity.
    pub uid: NodeUid,
    /// Qualified name (empty for anonymous expressions).
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Raw source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Present exactly when the kind is type-bearing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<TypeState>,
}

impl Node {
    /// Creates a node with a fresh identity and an `Unknown` type state when
    /// the kind is type-bearing.
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        let types = kind.is_type_bearing().then(TypeState::default);
        Node {
            uid: NodeUid::next(),
            name: name.into(),
            kind,
            location: None,
            code: None,
            types,
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Current type, or `Unknown` for nodes without a type state.
    pub fn current_type(&self) -> Type {
        self.types
            .as_ref()
            .map(|s| s.current.clone())
            .unwrap_or_default()
    }
}
