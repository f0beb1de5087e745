//! The language-agnostic type algebra.
//!
//! [`Type`] is an immutable value: primitives, records (objects), pointers
//! (with their origin: pointer, array or reference), function pointers,
//! tuples, unresolved template parameters and the [`Type::Unknown`] sentinel.
//! Cloning produces an independent value, so propagation never aliases the
//! proposer's type.
//!
//! Join and subtype queries need the record hierarchy and therefore live in
//! the propagation crate; this module only provides the structural
//! operations (dereference, pointer construction, similarity, wrapping).

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Where a pointer-shaped type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerOrigin {
    Pointer,
    Array,
    Reference,
}

/// Classification of primitive types used by the numeric join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Character,
    Integer,
    Float,
}

/// A built-in scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveType {
    pub name: String,
    /// Width in bits.
    pub width: u16,
    pub signed: bool,
    pub kind: PrimitiveKind,
}

/// A record (class, struct, interface) type, optionally with generics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generics: Vec<Type>,
}

/// Chain of pointer origins from the outermost wrapper inwards.
pub type Origins = SmallVec<[PointerOrigin; 4]>;

/// A type in the code property graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// No information available yet.
    #[default]
    Unknown,
    Primitive(PrimitiveType),
    Object(ObjectType),
    Pointer {
        of: Box<Type>,
        origin: PointerOrigin,
    },
    FunctionPointer {
        params: Vec<Type>,
        returns: Vec<Type>,
    },
    Tuple(Vec<Type>),
    /// An unresolved template parameter, e.g. `T`.
    Parameterized(String),
}

impl Type {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    pub fn primitive(name: &str, width: u16, signed: bool, kind: PrimitiveKind) -> Self {
        Type::Primitive(PrimitiveType {
            name: name.to_string(),
            width,
            signed,
            kind,
        })
    }

    pub fn integer(name: &str, width: u16, signed: bool) -> Self {
        Type::primitive(name, width, signed, PrimitiveKind::Integer)
    }

    pub fn floating(name: &str, width: u16) -> Self {
        Type::primitive(name, width, true, PrimitiveKind::Float)
    }

    pub fn boolean() -> Self {
        Type::primitive("bool", 1, false, PrimitiveKind::Boolean)
    }

    pub fn char() -> Self {
        Type::primitive("char", 8, true, PrimitiveKind::Character)
    }

    pub fn short() -> Self {
        Type::integer("short", 16, true)
    }

    pub fn int() -> Self {
        Type::integer("int", 32, true)
    }

    pub fn long() -> Self {
        Type::integer("long", 64, true)
    }

    pub fn float() -> Self {
        Type::floating("float", 32)
    }

    pub fn double() -> Self {
        Type::floating("double", 64)
    }

    pub fn object(name: &str) -> Self {
        Type::Object(ObjectType {
            name: name.to_string(),
            generics: Vec::new(),
        })
    }

    pub fn generic(name: &str, generics: Vec<Type>) -> Self {
        Type::Object(ObjectType {
            name: name.to_string(),
            generics,
        })
    }

    /// The conventional string object type. Which object names count as
    /// strings is decided by the language profile, not by this constructor.
    pub fn string() -> Self {
        Type::object("string")
    }

    pub fn function(params: Vec<Type>, returns: Vec<Type>) -> Self {
        Type::FunctionPointer { params, returns }
    }

    pub fn tuple(elements: Vec<Type>) -> Self {
        Type::Tuple(elements)
    }

    pub fn parameter(name: &str) -> Self {
        Type::Parameterized(name.to_string())
    }

    // -----------------------------------------------------------------------
    // Wrapping
    // -----------------------------------------------------------------------

    /// Wraps the type with the given pointer origin.
    pub fn wrap(&self, origin: PointerOrigin) -> Type {
        Type::Pointer {
            of: Box::new(self.clone()),
            origin,
        }
    }

    /// `T` → `T*`.
    pub fn pointer(&self) -> Type {
        self.wrap(PointerOrigin::Pointer)
    }

    /// `T` → `T[]`.
    pub fn array(&self) -> Type {
        self.wrap(PointerOrigin::Array)
    }

    /// `T` → `T&`.
    pub fn reference(&self) -> Type {
        self.wrap(PointerOrigin::Reference)
    }

    /// `T*`/`T[]`/`T&` → `T`. Anything else dereferences to `Unknown`.
    pub fn dereference(&self) -> Type {
        match self {
            Type::Pointer { of, .. } => (**of).clone(),
            _ => Type::Unknown,
        }
    }

    /// The type forwarded during inference: a by-reference wrapper is looked
    /// through (one level), everything else is forwarded as is.
    pub fn propagation_type(&self) -> Type {
        match self {
            Type::Pointer {
                of,
                origin: PointerOrigin::Reference,
            } => (**of).clone(),
            other => other.clone(),
        }
    }

    /// Number of pointer wrappers around the root type.
    pub fn pointer_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Type::Pointer { of, .. } = current {
            depth += 1;
            current = of;
        }
        depth
    }

    /// The innermost non-pointer type.
    pub fn root(&self) -> &Type {
        let mut current = self;
        while let Type::Pointer { of, .. } = current {
            current = of;
        }
        current
    }

    /// Pointer origins from the outermost wrapper inwards.
    pub fn origins(&self) -> Origins {
        let mut origins = Origins::new();
        let mut current = self;
        while let Type::Pointer { of, origin } = current {
            origins.push(*origin);
            current = of;
        }
        origins
    }

    /// Re-applies pointer origins (outermost first) around `root`.
    pub fn rewrap(root: Type, origins: &[PointerOrigin]) -> Type {
        origins
            .iter()
            .rev()
            .fold(root, |inner, origin| inner.wrap(*origin))
    }

    // -----------------------------------------------------------------------
    // Predicates
    // -----------------------------------------------------------------------

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn is_function_pointer(&self) -> bool {
        matches!(self, Type::FunctionPointer { .. })
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Type::Tuple(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Pointer {
                origin: PointerOrigin::Reference,
                ..
            }
        )
    }

    /// `T[]`, the shape initializer lists may propagate into.
    pub fn is_array_shaped(&self) -> bool {
        matches!(
            self.propagation_type(),
            Type::Pointer {
                origin: PointerOrigin::Array,
                ..
            }
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Primitive(PrimitiveType {
                kind: PrimitiveKind::Integer | PrimitiveKind::Float | PrimitiveKind::Character,
                ..
            })
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Type::Primitive(PrimitiveType {
                kind: PrimitiveKind::Integer | PrimitiveKind::Character,
                ..
            })
        )
    }

    /// Name of the type for objects and primitives.
    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Primitive(p) => Some(&p.name),
            Type::Object(o) => Some(&o.name),
            Type::Parameterized(name) => Some(name),
            _ => None,
        }
    }

    /// Whether a template parameter occurs anywhere inside the type.
    pub fn contains_parameterized(&self) -> bool {
        match self {
            Type::Parameterized(_) => true,
            Type::Object(o) => o.generics.iter().any(Type::contains_parameterized),
            Type::Pointer { of, .. } => of.contains_parameterized(),
            Type::FunctionPointer { params, returns } => params
                .iter()
                .chain(returns.iter())
                .any(Type::contains_parameterized),
            Type::Tuple(elements) => elements.iter().any(Type::contains_parameterized),
            Type::Unknown | Type::Primitive(_) => false,
        }
    }

    /// Structural equality after normalizing every pointer origin.
    pub fn similar(&self, other: &Type) -> bool {
        self.normalized() == other.normalized()
    }

    fn normalized(&self) -> Type {
        match self {
            Type::Pointer { of, .. } => Type::Pointer {
                of: Box::new(of.normalized()),
                origin: PointerOrigin::Pointer,
            },
            Type::Object(o) => Type::Object(ObjectType {
                name: o.name.clone(),
                generics: o.generics.iter().map(Type::normalized).collect(),
            }),
            Type::FunctionPointer { params, returns } => Type::FunctionPointer {
                params: params.iter().map(Type::normalized).collect(),
                returns: returns.iter().map(Type::normalized).collect(),
            },
            Type::Tuple(elements) => Type::Tuple(elements.iter().map(Type::normalized).collect()),
            other => other.clone(),
        }
    }

    /// The shape a call takes when this function pointer is invoked:
    /// one return → that type, several → a tuple, none → `None`.
    pub fn return_shape(&self) -> Option<Type> {
        match self {
            Type::FunctionPointer { returns, .. } => match returns.as_slice() {
                [] => None,
                [single] => Some(single.clone()),
                many => Some(Type::Tuple(many.to_vec())),
            },
            _ => None,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    for (i, t) in types.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", t)?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "UNKNOWN"),
            Type::Primitive(p) => write!(f, "{}", p.name),
            Type::Object(o) => {
                write!(f, "{}", o.name)?;
                if !o.generics.is_empty() {
                    write!(f, "<")?;
                    write_list(f, &o.generics)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Pointer { of, origin } => match origin {
                PointerOrigin::Pointer => write!(f, "{}*", of),
                PointerOrigin::Array => write!(f, "{}[]", of),
                PointerOrigin::Reference => write!(f, "{}&", of),
            },
            Type::FunctionPointer { params, returns } => {
                write!(f, "fn(")?;
                write_list(f, params)?;
                write!(f, ") -> (")?;
                write_list(f, returns)?;
                write!(f, ")")
            }
            Type::Tuple(elements) => {
                write!(f, "(")?;
                write_list(f, elements)?;
                write!(f, ")")
            }
            Type::Parameterized(name) => write!(f, "{}", name),
        }
    }
}
