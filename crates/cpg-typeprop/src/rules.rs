//! Per-kind reactions to a source's type change.
//!
//! [`react`] is called once per `(observer, source)` pair when the source's
//! state changed (or when the subscription was just created). It inspects how
//! the source relates to the observer (AST role, `RefersTo`, `Invokes`) and
//! returns a [`Reaction`]; it never mutates the graph. The match over
//! [`NodeKind`] has no wildcard arm, so a new kind must decide its rule here.

use cpg_core::edge::AstRole;
use cpg_core::graph::CodeGraph;
use cpg_core::id::NodeId;
use cpg_core::node::{NodeKind, TypeState};
use cpg_core::types::Type;

use crate::assign;
use crate::diagnostics::PropagationDiagnostic;
use crate::engine::{Proposal, Reaction};
use crate::join::{common_supertype, is_supertype_of};
use crate::profile::LanguageProfile;

/// How `observer` reacts to the current state of `src`.
pub fn react(
    graph: &CodeGraph,
    profile: &LanguageProfile,
    observer: NodeId,
    src: NodeId,
) -> Reaction {
    let (Some(obs), Some(source)) = (graph.node(observer), graph.node(src)) else {
        return Reaction::Nothing;
    };
    let Some(state) = source.types.as_ref() else {
        return Reaction::Nothing;
    };

    match &obs.kind {
        // -- Declarations --
        NodeKind::Variable { declared }
        | NodeKind::Field { declared }
        | NodeKind::Parameter { declared, .. } => {
            declaration(graph, observer, declared.as_ref(), src, &source.kind, state)
        }
        NodeKind::Function { .. } => Reaction::Nothing,
        NodeKind::TranslationUnit | NodeKind::Namespace | NodeKind::Record { .. } => {
            Reaction::Nothing
        }

        // -- Statements --
        NodeKind::Block | NodeKind::DeclarationStatement | NodeKind::Return => Reaction::Nothing,

        // -- Expressions --
        NodeKind::Reference | NodeKind::MemberAccess { .. } => {
            if graph.refers_to(observer) == Some(src) {
                propose_self(observer, Proposal::forwarded(state))
            } else {
                Reaction::Nothing
            }
        }
        NodeKind::BinaryOperator { op } => binary(graph, profile, observer, op, state),
        NodeKind::UnaryOperator { op, .. } => {
            if !is_child(graph, observer, src, AstRole::Operand) {
                return Reaction::Nothing;
            }
            unary(profile, observer, op, state)
        }
        NodeKind::Assign {
            op,
            used_as_expression,
        } => assignment(graph, profile, observer, op, *used_as_expression, src, state),
        NodeKind::Call { .. } => {
            if graph.invokes(observer).contains(&src) {
                Reaction::Reaggregate
            } else {
                Reaction::Nothing
            }
        }
        NodeKind::Cast { target } => {
            if !is_child(graph, observer, src, AstRole::Operand) {
                return Reaction::Nothing;
            }
            cast(graph, observer, target, state)
        }
        NodeKind::InitializerList => {
            if !is_child(graph, observer, src, AstRole::Element) {
                return Reaction::Nothing;
            }
            propose_self(observer, Proposal::forwarded(state).map(Type::array))
        }
        NodeKind::Conditional => {
            if is_child(graph, observer, src, AstRole::Then)
                || is_child(graph, observer, src, AstRole::Else)
            {
                propose_self(observer, Proposal::forwarded(state))
            } else {
                Reaction::Nothing
            }
        }
        NodeKind::Subscript => {
            if !is_child(graph, observer, src, AstRole::Base) {
                return Reaction::Nothing;
            }
            propose_self(observer, Proposal::forwarded(state).map(Type::dereference))
        }
        NodeKind::New => {
            if !is_child(graph, observer, src, AstRole::Initializer) {
                return Reaction::Nothing;
            }
            propose_self(observer, Proposal::forwarded(state).map(Type::pointer))
        }
        NodeKind::ExpressionList => {
            let last = graph.ast_children(observer, AstRole::Element).last().copied();
            if last == Some(src) {
                propose_self(observer, Proposal::forwarded(state))
            } else {
                Reaction::Nothing
            }
        }
        NodeKind::Literal { .. } | NodeKind::Construct { .. } => Reaction::Nothing,
    }
}

fn propose_self(observer: NodeId, proposal: Proposal) -> Reaction {
    if proposal.is_empty() {
        Reaction::Nothing
    } else {
        Reaction::Propose(vec![(observer, proposal)])
    }
}

fn is_child(graph: &CodeGraph, parent: NodeId, child: NodeId, role: AstRole) -> bool {
    graph.ast_parent(child) == Some(parent) && graph.ast_role(child) == Some(role)
}

fn current_of(graph: &CodeGraph, node: Option<NodeId>) -> Type {
    node.and_then(|n| graph.types(n))
        .map(|s| s.current.propagation_type())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// Variables, fields and parameters learn from their initializer and, when
/// they have no declared type, from references that write to them.
fn declaration(
    graph: &CodeGraph,
    decl: NodeId,
    declared: Option<&Type>,
    src: NodeId,
    src_kind: &NodeKind,
    state: &TypeState,
) -> Reaction {
    let proposal = if is_child(graph, decl, src, AstRole::Initializer) {
        let is_list = matches!(src_kind, NodeKind::InitializerList);
        if is_list && !declared.is_some_and(Type::is_array_shaped) {
            return Reaction::Nothing;
        }
        Proposal::forwarded(state)
    } else if declared.is_none()
        && graph.refers_to(src) == Some(decl)
        && graph.access_mode(src).writes()
    {
        Proposal::forwarded(state)
    } else {
        return Reaction::Nothing;
    };

    match declared {
        Some(declared) => match restrict_to(graph, declared, proposal) {
            Some(p) => propose_self(decl, p),
            None => Reaction::Nothing,
        },
        None => propose_self(decl, proposal),
    }
}

/// Keeps only the part of `proposal` that `declared` is a supertype of. A
/// declared by-reference type stays a reference.
fn restrict_to(graph: &CodeGraph, declared: &Type, proposal: Proposal) -> Option<Proposal> {
    let records = &graph.records;
    if !proposal.ty.is_unknown() && !is_supertype_of(records, declared, &proposal.ty) {
        return None;
    }
    let restricted = Proposal {
        ty: proposal.ty,
        sub_types: proposal
            .sub_types
            .into_iter()
            .filter(|s| is_supertype_of(records, declared, s))
            .collect(),
    };
    if restricted.is_empty() {
        return None;
    }
    if declared.is_reference() {
        let as_reference = |t: &Type| if t.is_reference() { t.clone() } else { t.reference() };
        return Some(restricted.map(as_reference));
    }
    Some(restricted)
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn binary(
    graph: &CodeGraph,
    profile: &LanguageProfile,
    observer: NodeId,
    op: &str,
    state: &TypeState,
) -> Reaction {
    if profile.yields_boolean(op) {
        return propose_self(observer, Proposal::of(profile.boolean_type.clone()));
    }

    let lhs = current_of(graph, graph.ast_child(observer, AstRole::Lhs));
    let rhs = current_of(graph, graph.ast_child(observer, AstRole::Rhs));

    if op == "+" {
        if let Some(string) = [&lhs, &rhs].into_iter().find(|t| profile.is_string(t)) {
            return propose_self(observer, Proposal::of(string.clone()));
        }
    }
    if lhs.is_numeric() && rhs.is_numeric() {
        if let Some(joined) = common_supertype(&graph.records, [&lhs, &rhs]) {
            return propose_self(observer, Proposal::of(joined));
        }
    }
    if op == "+" || op == "-" {
        if lhs.is_pointer() && rhs.is_integral() {
            return propose_self(observer, Proposal::of(lhs));
        }
        if op == "+" && rhs.is_pointer() && lhs.is_integral() {
            return propose_self(observer, Proposal::of(rhs));
        }
    }
    propose_self(observer, Proposal::forwarded(state))
}

fn unary(profile: &LanguageProfile, observer: NodeId, op: &str, state: &TypeState) -> Reaction {
    let forwarded = Proposal::forwarded(state);
    let proposal = match op {
        "*" => forwarded.map(Type::dereference),
        "&" => forwarded.map(Type::pointer),
        _ if profile.is_logical(op) => Proposal::of(profile.boolean_type.clone()),
        _ => forwarded,
    };
    propose_self(observer, proposal)
}

fn cast(graph: &CodeGraph, observer: NodeId, target: &Type, state: &TypeState) -> Reaction {
    let records = &graph.records;
    let forwarded = Proposal::forwarded(state);
    if forwarded.ty.is_unknown() || !is_supertype_of(records, target, &forwarded.ty) {
        return Reaction::Nothing;
    }
    let subs: Vec<Type> = std::iter::once(forwarded.ty)
        .chain(forwarded.sub_types)
        .filter(|s| is_supertype_of(records, target, s))
        .collect();
    propose_self(observer, Proposal::sub_types_only(subs))
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// A simple assignment distributes the right-hand side over its targets: a
/// tuple element-wise, anything else positionally. Compound assignments
/// never re-type their target. An assignment used as an expression takes the
/// type of its first right-hand side.
fn assignment(
    graph: &CodeGraph,
    profile: &LanguageProfile,
    assign_node: NodeId,
    op: &str,
    used_as_expression: bool,
    src: NodeId,
    state: &TypeState,
) -> Reaction {
    if !is_child(graph, assign_node, src, AstRole::Rhs) {
        return Reaction::Nothing;
    }
    let forwarded = Proposal::forwarded(state);
    let mut proposals = Vec::new();

    if profile.is_simple_assignment(op) {
        let targets = match assign::resolve_targets(graph, assign_node, src) {
            Ok(targets) => targets,
            Err(mismatch) => {
                assign::log_mismatch(assign_node, src, mismatch);
                return Reaction::Diagnose(PropagationDiagnostic::TupleArityMismatch {
                    assign: assign_node,
                    rhs: src,
                    expected: mismatch.expected,
                    actual: mismatch.actual,
                });
            }
        };
        match &forwarded.ty {
            Type::Tuple(elements) => {
                for (target, element) in targets.into_iter().zip(elements) {
                    proposals.push((target, Proposal::of(element.clone())));
                }
            }
            _ => {
                for target in targets {
                    proposals.push((target, forwarded.clone()));
                }
            }
        }
    }

    if used_as_expression && graph.ast_child(assign_node, AstRole::Rhs) == Some(src) {
        proposals.push((assign_node, forwarded));
    }

    proposals.retain(|(_, p)| !p.is_empty());
    if proposals.is_empty() {
        Reaction::Nothing
    } else {
        Reaction::Propose(proposals)
    }
}
