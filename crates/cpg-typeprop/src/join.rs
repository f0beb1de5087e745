//! Common-supertype join and supertype checks.
//!
//! The join is the only place where the engine decides what a set of
//! candidate types collapses to:
//!
//! - `Unknown` members carry no information and are ignored
//! - all members must have the same pointer depth; the roots are joined and
//!   re-wrapped with the first member's pointer origins
//! - booleans join only with booleans
//! - integers and characters widen to the widest member (signed wins a tie)
//! - a float anywhere makes the join the widest float member
//! - records join to their lowest common ancestor in the [`RecordHierarchy`]
//! - tuples join element-wise when their arities agree
//! - function pointers and template parameters join only with themselves
//!
//! A `None` result means there is no common supertype; callers apply their
//! own fallback policy.

use cpg_core::hierarchy::RecordHierarchy;
use cpg_core::types::{PrimitiveKind, PrimitiveType, Type};

/// The most specific type every member of `types` is assignable to.
pub fn common_supertype<'a, I>(hierarchy: &RecordHierarchy, types: I) -> Option<Type>
where
    I: IntoIterator<Item = &'a Type>,
{
    let known: Vec<&Type> = types.into_iter().filter(|t| !t.is_unknown()).collect();
    let (first, rest) = known.split_first()?;
    if rest.iter().all(|t| *t == *first) {
        return Some((*first).clone());
    }

    let depth = first.pointer_depth();
    if rest.iter().any(|t| t.pointer_depth() != depth) {
        return None;
    }

    let roots: Vec<&Type> = known.iter().map(|t| t.root()).collect();
    let root = join_roots(hierarchy, &roots)?;
    Some(Type::rewrap(root, &first.origins()))
}

/// Whether `sup` is a supertype of (or equal to) `sub`.
///
/// A by-reference wrapper on `sup` is looked through, so `Base&` accepts
/// `Derived`.
pub fn is_supertype_of(hierarchy: &RecordHierarchy, sup: &Type, sub: &Type) -> bool {
    if sup == sub {
        return true;
    }
    if sup.is_unknown() || sub.is_unknown() {
        return false;
    }
    let sup = sup.propagation_type();
    if sup.pointer_depth() != sub.pointer_depth() {
        return false;
    }
    common_supertype(hierarchy, [&sup, sub]).is_some_and(|joined| joined.similar(&sup))
}

fn join_roots(hierarchy: &RecordHierarchy, roots: &[&Type]) -> Option<Type> {
    let first = roots.first()?;
    if roots.iter().all(|t| t == first) {
        return Some((*first).clone());
    }

    match *first {
        Type::Primitive(_) => {
            let prims: Option<Vec<&PrimitiveType>> = roots
                .iter()
                .map(|t| match t {
                    Type::Primitive(p) => Some(p),
                    _ => None,
                })
                .collect();
            join_primitives(&prims?)
        }
        Type::Object(_) => {
            let mut names = Vec::with_capacity(roots.len());
            for t in roots {
                match t {
                    Type::Object(o) => names.push(o.name.as_str()),
                    _ => return None,
                }
            }
            let ancestor = hierarchy.lowest_common_ancestor(&names)?;
            // A member that is itself the ancestor keeps its generics.
            let member = roots
                .iter()
                .find(|t| t.name() == Some(ancestor.as_str()))
                .map(|t| (*t).clone());
            Some(member.unwrap_or_else(|| Type::object(&ancestor)))
        }
        Type::Tuple(first_elements) => {
            let arity = first_elements.len();
            let mut columns: Vec<Vec<&Type>> = vec![Vec::new(); arity];
            for t in roots {
                match t {
                    Type::Tuple(elements) if elements.len() == arity => {
                        for (column, element) in columns.iter_mut().zip(elements) {
                            column.push(element);
                        }
                    }
                    _ => return None,
                }
            }
            let mut joined = Vec::with_capacity(arity);
            for column in columns {
                if column.iter().all(|t| t.is_unknown()) {
                    joined.push(Type::Unknown);
                } else {
                    joined.push(common_supertype(hierarchy, column)?);
                }
            }
            Some(Type::Tuple(joined))
        }
        Type::FunctionPointer { .. } | Type::Parameterized(_) | Type::Pointer { .. } => None,
        Type::Unknown => None,
    }
}

fn join_primitives(prims: &[&PrimitiveType]) -> Option<Type> {
    let has = |kind: PrimitiveKind| prims.iter().any(|p| p.kind == kind);

    if has(PrimitiveKind::Boolean) {
        return if prims.iter().all(|p| p.kind == PrimitiveKind::Boolean) {
            widest(prims.iter().copied())
        } else {
            None
        };
    }
    if has(PrimitiveKind::Float) {
        return widest(prims.iter().copied().filter(|p| p.kind == PrimitiveKind::Float));
    }
    widest(prims.iter().copied())
}

/// Widest member; signed wins a width tie, then the earliest member.
fn widest<'a>(prims: impl Iterator<Item = &'a PrimitiveType>) -> Option<Type> {
    let mut best: Option<&PrimitiveType> = None;
    for p in prims {
        best = match best {
            Some(b) if (b.width, b.signed) >= (p.width, p.signed) => Some(b),
            _ => Some(p),
        };
    }
    best.map(|p| Type::Primitive(p.clone()))
}
