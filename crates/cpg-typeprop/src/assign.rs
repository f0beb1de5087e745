//! Assignment target resolution.
//!
//! An `Assign` node owns an ordered left-hand list (`AstRole::Lhs`) and an
//! ordered right-hand list (`AstRole::Rhs`). Both lookups here are positional
//! and read the `Index` property of the AST edges, so they stay correct when
//! unrelated pairs are inserted or removed.

use cpg_core::edge::AstRole;
use cpg_core::graph::CodeGraph;
use cpg_core::id::NodeId;
use cpg_core::types::Type;
use tracing::info;

/// A tuple-typed right-hand side whose arity differs from the number of
/// left-hand targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArityMismatch {
    /// Number of left-hand targets.
    pub expected: usize,
    /// Arity of the tuple.
    pub actual: usize,
}

pub fn lhs(graph: &CodeGraph, assign: NodeId) -> Vec<NodeId> {
    graph.ast_children(assign, AstRole::Lhs)
}

pub fn rhs(graph: &CodeGraph, assign: NodeId) -> Vec<NodeId> {
    graph.ast_children(assign, AstRole::Rhs)
}

/// The targets `rhs_expr` is assigned to.
///
/// A tuple-typed right-hand side is decomposed over the whole left-hand list
/// and must match its length. Any other right-hand side maps to the target at
/// its own position, if there is one.
pub fn resolve_targets(
    graph: &CodeGraph,
    assign: NodeId,
    rhs_expr: NodeId,
) -> Result<Vec<NodeId>, ArityMismatch> {
    let targets = lhs(graph, assign);
    let ty = graph
        .types(rhs_expr)
        .map(|s| s.current.propagation_type())
        .unwrap_or_default();

    if let Type::Tuple(elements) = &ty {
        if elements.len() != targets.len() {
            return Err(ArityMismatch {
                expected: targets.len(),
                actual: elements.len(),
            });
        }
        return Ok(targets);
    }

    let position = rhs(graph, assign).iter().position(|&r| r == rhs_expr);
    Ok(position
        .and_then(|i| targets.get(i).copied())
        .into_iter()
        .collect())
}

/// Like [`resolve_targets`], but an arity mismatch is logged and yields no
/// targets.
pub fn find_targets(graph: &CodeGraph, assign: NodeId, rhs_expr: NodeId) -> Vec<NodeId> {
    resolve_targets(graph, assign, rhs_expr).unwrap_or_else(|mismatch| {
        log_mismatch(assign, rhs_expr, mismatch);
        Vec::new()
    })
}

pub(crate) fn log_mismatch(assign: NodeId, rhs_expr: NodeId, mismatch: ArityMismatch) {
    info!(
        %assign,
        rhs = %rhs_expr,
        targets = mismatch.expected,
        arity = mismatch.actual,
        "tuple size on the right does not match the number of assignment targets"
    );
}

/// The value assigned to `lhs_expr`.
///
/// With several targets and a single source (destructuring one call), that
/// source is the value of every target. Otherwise the source at the target's
/// position.
pub fn find_value(graph: &CodeGraph, assign: NodeId, lhs_expr: NodeId) -> Option<NodeId> {
    let targets = lhs(graph, assign);
    let sources = rhs(graph, assign);
    let position = targets.iter().position(|&t| t == lhs_expr)?;

    match sources.as_slice() {
        [single] if targets.len() > 1 => Some(*single),
        _ => sources.get(position).copied(),
    }
}
