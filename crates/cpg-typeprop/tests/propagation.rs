//! End-to-end propagation tests.
//!
//! Each test builds a small program through the `TypedGraph` builder API,
//! runs resolution the way a symbol/call resolution pass would, and checks
//! the resulting `current` types and sub-types.
//!
//! Tests cover:
//! - Convergence and cycle safety
//! - Tuple distribution and arity mismatch
//! - Dereference / address-of, string concatenation
//! - Call re-resolution
//! - Declared-type filtering and record sub-types
//! - Compound assignment, assignments used as expressions, casts
//! - Initializer lists, templates
//! - Deferred mode, subscription order

use cpg_core::edge::AstRole;
use cpg_core::id::NodeId;
use cpg_core::node::{RecordKind, TypeState};
use cpg_core::types::Type;

use cpg_typeprop::{
    LanguageProfile, PropagationDiagnostic, PropagationMode, Proposal, TypedGraph, Wave,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// `name` as a reference resolved to `decl`.
fn reference(tg: &mut TypedGraph, name: &str, decl: NodeId) -> NodeId {
    let r = tg.add_reference(name);
    tg.resolve_reference(r, decl).unwrap();
    r
}

fn states(tg: &TypedGraph) -> Vec<(NodeId, Option<TypeState>)> {
    tg.graph()
        .node_ids()
        .map(|id| (id, tg.type_state(id).cloned()))
        .collect()
}

/// Re-broadcasts every type-bearing node once.
fn refresh_all(tg: &mut TypedGraph) {
    let ids: Vec<NodeId> = tg.graph().node_ids().collect();
    for id in ids {
        if tg.type_state(id).is_some() {
            tg.refresh(id).unwrap();
        }
    }
    tg.flush();
}

// ---------------------------------------------------------------------------
// Program builders
// ---------------------------------------------------------------------------

/// Nodes of interest in [`build_mixed_program`].
struct Mixed {
    a: NodeId,
    b: NodeId,
    call: NodeId,
    c: NodeId,
    p: NodeId,
}

/// Build:
///   fn f() -> (int, bool)
///   var a; var b
///   a, b = f()
///   var c = 1 + "n"
///   class Base; class Derived : Base
///   Base* p = new Derived()
///
/// References and call targets are resolved after the assignment is built.
fn build_mixed_program(tg: &mut TypedGraph) -> Mixed {
    let f = tg
        .add_function("f", &[], vec![Type::int(), Type::boolean()])
        .unwrap();
    let call = tg.add_call("f", &[]).unwrap();
    let a = tg.add_variable("a", None, None).unwrap();
    let b = tg.add_variable("b", None, None).unwrap();
    let ra = tg.add_reference("a");
    let rb = tg.add_reference("b");
    tg.add_assign("=", &[ra, rb], &[call], false).unwrap();
    tg.resolve_reference(ra, a).unwrap();
    tg.resolve_reference(rb, b).unwrap();
    tg.set_invokes(call, &[f]).unwrap();

    let one = tg.add_literal(Type::int(), "1");
    let n = tg.add_literal(Type::string(), "\"n\"");
    let plus = tg.add_binary("+", one, n).unwrap();
    let c = tg.add_variable("c", None, Some(plus)).unwrap();

    tg.add_record("Base", RecordKind::Class, &[]).unwrap();
    tg.add_record("Derived", RecordKind::Class, &["Base"]).unwrap();
    let construct = tg.add_construct(Type::object("Derived"), &[]).unwrap();
    let new = tg.add_new(construct).unwrap();
    let p = tg
        .add_variable("p", Some(Type::object("Base").pointer()), Some(new))
        .unwrap();

    Mixed { a, b, call, c, p }
}

/// Build:
///   var x = y
///   var y = x
/// with the two initializers resolved to each other.
fn build_cycle(tg: &mut TypedGraph) -> (NodeId, NodeId, NodeId, NodeId) {
    let ry = tg.add_reference("y");
    let x = tg.add_variable("x", None, Some(ry)).unwrap();
    let rx = tg.add_reference("x");
    let y = tg.add_variable("y", None, Some(rx)).unwrap();
    tg.resolve_reference(ry, y).unwrap();
    tg.resolve_reference(rx, x).unwrap();
    (x, y, rx, ry)
}

// ---------------------------------------------------------------------------
// Convergence and cycles
// ---------------------------------------------------------------------------

#[test]
fn redundant_propagation_is_idempotent() {
    let mut tg = TypedGraph::default();
    build_mixed_program(&mut tg);

    refresh_all(&mut tg);
    let first = states(&tg);
    refresh_all(&mut tg);
    assert_eq!(states(&tg), first);
}

#[test]
fn settled_cycle_does_not_change_on_refresh() {
    let mut tg = TypedGraph::default();
    let (x, ..) = build_cycle(&mut tg);
    tg.set_type(x, Type::int()).unwrap();

    let before = states(&tg);
    refresh_all(&mut tg);
    assert_eq!(states(&tg), before);
}

#[test]
fn mutually_initialized_declarations_terminate() {
    let mut tg = TypedGraph::default();
    let (x, y, rx, ry) = build_cycle(&mut tg);
    assert!(tg.type_of(x).is_unknown());

    tg.set_type(x, Type::int()).unwrap();
    for node in [x, y, rx, ry] {
        assert_eq!(tg.type_of(node), Type::int(), "{node}");
    }

    // Widening through the other side of the cycle also terminates.
    tg.set_type(y, Type::long()).unwrap();
    for node in [x, y, rx, ry] {
        assert_eq!(tg.type_of(node), Type::long(), "{node}");
    }

    let cycles = tg.graph().observer_cycles();
    assert_eq!(cycles.len(), 1);
    let mut members = vec![x, y, rx, ry];
    members.sort();
    assert_eq!(cycles[0], members);
}

#[test]
fn long_dependency_chain_propagates_to_the_end() {
    // v0; v1 = v0; v2 = v1; ...
    let mut tg = TypedGraph::default();
    let first = tg.add_variable("v0", None, None).unwrap();
    let mut last = first;
    for i in 1..10_000 {
        let name = format!("v{i}");
        let r = reference(&mut tg, &name, last);
        last = tg.add_variable(&name, None, Some(r)).unwrap();
    }
    assert!(tg.type_of(last).is_unknown());

    tg.set_type(first, Type::int()).unwrap();
    assert_eq!(tg.type_of(last), Type::int());
    assert_eq!(tg.sub_types_of(last), vec![Type::int()]);

    tg.set_type(first, Type::long()).unwrap();
    assert_eq!(tg.type_of(last), Type::long());
}

#[test]
fn unresolved_reference_stays_unknown() {
    let mut tg = TypedGraph::default();
    let r = tg.add_reference("missing");
    let v = tg.add_variable("v", None, Some(r)).unwrap();
    assert!(tg.type_of(r).is_unknown());
    assert!(tg.type_of(v).is_unknown());
    assert!(tg.diagnostics().is_empty());

    let decl = tg.add_variable("missing", Some(Type::double()), None).unwrap();
    tg.resolve_reference(r, decl).unwrap();
    assert_eq!(tg.type_of(v), Type::double());
}

// ---------------------------------------------------------------------------
// Tuples
// ---------------------------------------------------------------------------

#[test]
fn tuple_is_distributed_over_targets() {
    let mut tg = TypedGraph::default();
    let m = build_mixed_program(&mut tg);

    assert_eq!(
        tg.type_of(m.call),
        Type::tuple(vec![Type::int(), Type::boolean()])
    );
    assert_eq!(tg.type_of(m.a), Type::int());
    assert_eq!(tg.type_of(m.b), Type::boolean());
}

#[test]
fn tuple_arity_mismatch_changes_nothing() {
    let mut tg = TypedGraph::default();
    let f = tg
        .add_function("f", &[], vec![Type::int(), Type::boolean()])
        .unwrap();
    let call = tg.add_call("f", &[]).unwrap();
    tg.set_invokes(call, &[f]).unwrap();

    let decls: Vec<NodeId> = ["a", "b", "c"]
        .into_iter()
        .map(|name| tg.add_variable(name, None, None).unwrap())
        .collect();
    let targets: Vec<NodeId> = decls
        .iter()
        .zip(["a", "b", "c"])
        .map(|(&d, name)| reference(&mut tg, name, d))
        .collect();
    let assign = tg.add_assign("=", &targets, &[call], false).unwrap();
    tg.refresh(call).unwrap();

    for node in targets.iter().chain(&decls) {
        assert!(tg.type_of(*node).is_unknown());
    }
    assert_eq!(
        tg.diagnostics(),
        &[PropagationDiagnostic::TupleArityMismatch {
            assign,
            rhs: call,
            expected: 3,
            actual: 2,
        }]
    );
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[test]
fn dereference_and_address_of() {
    let mut tg = TypedGraph::default();
    let p = tg
        .add_variable("p", Some(Type::int().pointer()), None)
        .unwrap();
    let rp = reference(&mut tg, "p", p);
    let deref = tg.add_unary("*", rp, false).unwrap();
    assert_eq!(tg.type_of(deref), Type::int());

    let i = tg.add_variable("i", Some(Type::int()), None).unwrap();
    let ri = reference(&mut tg, "i", i);
    let addr = tg.add_unary("&", ri, false).unwrap();
    assert_eq!(tg.type_of(addr), Type::int().pointer());
}

#[test]
fn string_concatenation_in_both_orders() {
    let mut tg = TypedGraph::default();
    let s = tg.add_variable("s", Some(Type::string()), None).unwrap();
    let n = tg.add_variable("n", Some(Type::int()), None).unwrap();

    let (rs, rn) = (reference(&mut tg, "s", s), reference(&mut tg, "n", n));
    let left = tg.add_binary("+", rs, rn).unwrap();
    let (rs, rn) = (reference(&mut tg, "s", s), reference(&mut tg, "n", n));
    let right = tg.add_binary("+", rn, rs).unwrap();

    assert_eq!(tg.type_of(left), Type::string());
    assert_eq!(tg.type_of(right), Type::string());
}

#[test]
fn string_concatenation_after_late_resolution() {
    let mut tg = TypedGraph::default();
    let rn = tg.add_reference("n");
    let rs = tg.add_reference("s");
    let plus = tg.add_binary("+", rn, rs).unwrap();

    let n = tg.add_variable("n", Some(Type::int()), None).unwrap();
    let s = tg.add_variable("s", Some(Type::string()), None).unwrap();
    tg.resolve_reference(rn, n).unwrap();
    assert_eq!(tg.type_of(plus), Type::int());

    tg.resolve_reference(rs, s).unwrap();
    assert_eq!(tg.type_of(plus), Type::string());
}

#[test]
fn arithmetic_joins_numeric_operands() {
    let mut tg = TypedGraph::default();
    let one = tg.add_literal(Type::int(), "1");
    let half = tg.add_literal(Type::double(), "0.5");
    let mul = tg.add_binary("*", one, half).unwrap();
    assert_eq!(tg.type_of(mul), Type::double());

    let two = tg.add_literal(Type::int(), "2");
    let three = tg.add_literal(Type::int(), "3");
    let eq = tg.add_binary("==", two, three).unwrap();
    assert_eq!(tg.type_of(eq), Type::boolean());
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

#[test]
fn call_re_resolution_joins_all_targets() {
    let mut tg = TypedGraph::default();
    let f1 = tg.add_function("f1", &[], vec![Type::int()]).unwrap();
    let f2 = tg.add_function("f2", &[], vec![Type::float()]).unwrap();
    let call = tg.add_call("f", &[]).unwrap();
    let v = tg.add_variable("v", None, Some(call)).unwrap();

    tg.set_invokes(call, &[f1]).unwrap();
    assert_eq!(tg.type_of(call), Type::int());
    assert_eq!(tg.type_of(v), Type::int());

    tg.set_invokes(call, &[f1, f2]).unwrap();
    assert_eq!(tg.type_of(call), Type::float());
    assert_eq!(tg.sub_types_of(call), vec![Type::int(), Type::float()]);
    assert_eq!(tg.type_of(v), Type::float());
}

#[test]
fn call_without_common_supertype_takes_first_target() {
    let mut tg = TypedGraph::default();
    let f1 = tg.add_function("f1", &[], vec![Type::int()]).unwrap();
    let f2 = tg.add_function("f2", &[], vec![Type::string()]).unwrap();
    let call = tg.add_call("f", &[]).unwrap();
    tg.set_invokes(call, &[f1, f2]).unwrap();

    assert_eq!(tg.type_of(call), Type::int());
    assert!(matches!(
        tg.diagnostics(),
        [PropagationDiagnostic::NoCommonSupertype { node, chosen, .. }]
            if *node == call && *chosen == Type::int()
    ));
}

#[test]
fn function_type_change_reaggregates_calls() {
    let mut tg = TypedGraph::default();
    let f = tg.add_function("f", &[], vec![Type::int()]).unwrap();
    let call = tg.add_call("f", &[]).unwrap();
    tg.set_invokes(call, &[f]).unwrap();

    tg.substitute_type(f, Type::function(vec![], vec![Type::long()]))
        .unwrap();
    assert_eq!(tg.type_of(call), Type::long());
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[test]
fn derived_allocation_keeps_declared_base() {
    let mut tg = TypedGraph::default();
    let m = build_mixed_program(&mut tg);

    let base = Type::object("Base").pointer();
    let derived = Type::object("Derived").pointer();
    assert_eq!(tg.type_of(m.p), base);
    assert_eq!(tg.sub_types_of(m.p), vec![base, derived]);
}

#[test]
fn narrower_declared_type_rejects_wider_initializer() {
    let mut tg = TypedGraph::default();
    let one = tg.add_literal(Type::int(), "1");
    let s = tg.add_variable("s", Some(Type::short()), Some(one)).unwrap();
    assert_eq!(tg.type_of(s), Type::short());
    assert_eq!(tg.sub_types_of(s), vec![Type::short()]);
}

#[test]
fn reference_wrapper_is_looked_through() {
    let mut tg = TypedGraph::default();
    let i = tg.add_variable("i", Some(Type::int()), None).unwrap();
    let ri = reference(&mut tg, "i", i);
    let alias = tg
        .add_variable("r", Some(Type::int().reference()), Some(ri))
        .unwrap();
    let use_site = reference(&mut tg, "r", alias);

    assert_eq!(tg.type_of(alias), Type::int().reference());
    assert_eq!(tg.type_of(use_site), Type::int());
}

#[test]
fn untyped_declaration_learns_from_assignments() {
    let mut tg = TypedGraph::default();
    let x = tg.add_variable("x", None, None).unwrap();
    let rx = reference(&mut tg, "x", x);
    let one = tg.add_literal(Type::int(), "1");
    tg.add_assign("=", &[rx], &[one], false).unwrap();
    assert_eq!(tg.type_of(x), Type::int());

    let rx2 = reference(&mut tg, "x", x);
    let half = tg.add_literal(Type::double(), "0.5");
    tg.add_assign("=", &[rx2], &[half], false).unwrap();
    assert_eq!(tg.type_of(x), Type::double());
    assert_eq!(tg.sub_types_of(x), vec![Type::int(), Type::double()]);
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

#[test]
fn compound_assignment_does_not_retype() {
    let mut tg = TypedGraph::default();
    let zero = tg.add_literal(Type::int(), "0");
    let x = tg.add_variable("x", None, Some(zero)).unwrap();
    let rx = reference(&mut tg, "x", x);
    let half = tg.add_literal(Type::double(), "0.5");
    tg.add_assign("+=", &[rx], &[half], false).unwrap();

    assert_eq!(tg.type_of(x), Type::int());
    assert_eq!(tg.type_of(rx), Type::int());
}

#[test]
fn assignment_used_as_expression() {
    let mut tg = TypedGraph::default();
    let x = tg.add_variable("x", None, None).unwrap();
    let rx = reference(&mut tg, "x", x);
    let one = tg.add_literal(Type::long(), "1L");
    let inner = tg.add_assign("=", &[rx], &[one], true).unwrap();
    let y = tg.add_variable("y", None, Some(inner)).unwrap();

    assert_eq!(tg.type_of(inner), Type::long());
    assert_eq!(tg.type_of(y), Type::long());
    assert_eq!(tg.type_of(x), Type::long());
}

#[test]
fn positional_assignment_pairs_targets_and_values() {
    let mut tg = TypedGraph::default();
    let a = tg.add_variable("a", None, None).unwrap();
    let b = tg.add_variable("b", None, None).unwrap();
    let ra = reference(&mut tg, "a", a);
    let rb = reference(&mut tg, "b", b);
    let one = tg.add_literal(Type::int(), "1");
    let yes = tg.add_literal(Type::boolean(), "true");
    tg.add_assign("=", &[ra, rb], &[one, yes], false).unwrap();

    assert_eq!(tg.type_of(a), Type::int());
    assert_eq!(tg.type_of(b), Type::boolean());
}

// ---------------------------------------------------------------------------
// Casts, lists, templates
// ---------------------------------------------------------------------------

#[test]
fn cast_records_operand_as_sub_type() {
    let mut tg = TypedGraph::default();
    tg.add_record("Base", RecordKind::Class, &[]).unwrap();
    tg.add_record("Derived", RecordKind::Class, &["Base"]).unwrap();
    let d = tg
        .add_variable("d", Some(Type::object("Derived").pointer()), None)
        .unwrap();
    let rd = reference(&mut tg, "d", d);
    let cast = tg.add_cast(Type::object("Base").pointer(), rd).unwrap();
    let p = tg.add_variable("p", None, Some(cast)).unwrap();

    let base = Type::object("Base").pointer();
    let derived = Type::object("Derived").pointer();
    assert_eq!(tg.type_of(cast), base);
    assert_eq!(tg.sub_types_of(cast), vec![base.clone(), derived.clone()]);
    assert_eq!(tg.type_of(p), base);
    assert_eq!(tg.sub_types_of(p), vec![base, derived]);
}

#[test]
fn initializer_list_only_types_arrays() {
    let mut tg = TypedGraph::default();
    let elems: Vec<NodeId> = (1..=2)
        .map(|i| tg.add_literal(Type::int(), &i.to_string()))
        .collect();
    let list = tg.add_initializer_list(&elems).unwrap();
    let array = tg
        .add_variable("a", Some(Type::int().array()), Some(list))
        .unwrap();
    assert_eq!(tg.type_of(list), Type::int().array());
    assert_eq!(tg.type_of(array), Type::int().array());

    tg.add_record("Point", RecordKind::Struct, &[]).unwrap();
    let coords: Vec<NodeId> = (1..=2)
        .map(|i| tg.add_literal(Type::int(), &i.to_string()))
        .collect();
    let list = tg.add_initializer_list(&coords).unwrap();
    let point = tg
        .add_variable("pt", Some(Type::object("Point")), Some(list))
        .unwrap();
    assert_eq!(tg.type_of(point), Type::object("Point"));
    assert_eq!(tg.sub_types_of(point), vec![Type::object("Point")]);
}

#[test]
fn subscript_and_conditional() {
    let mut tg = TypedGraph::default();
    let arr = tg
        .add_variable("arr", Some(Type::double().array()), None)
        .unwrap();
    let rarr = reference(&mut tg, "arr", arr);
    let zero = tg.add_literal(Type::int(), "0");
    let elem = tg.add_subscript(rarr, zero).unwrap();
    assert_eq!(tg.type_of(elem), Type::double());

    let cond = tg.add_literal(Type::boolean(), "true");
    let one = tg.add_literal(Type::int(), "1");
    let ternary = tg.add_conditional(cond, one, elem).unwrap();
    assert_eq!(tg.type_of(ternary), Type::double());
    assert_eq!(tg.sub_types_of(ternary), vec![Type::int(), Type::double()]);
}

#[test]
fn template_call_waits_for_substitution() {
    let mut tg = TypedGraph::default();
    let f = tg
        .add_function("make", &[], vec![Type::parameter("T")])
        .unwrap();
    let call = tg
        .add_template_call("make", vec![Type::parameter("T")], &[])
        .unwrap();
    let v = tg.add_variable("v", None, Some(call)).unwrap();
    tg.set_invokes(call, &[f]).unwrap();

    assert!(tg.type_of(call).is_unknown());
    assert!(tg.type_of(v).is_unknown());

    tg.set_type(call, Type::int()).unwrap();
    assert!(tg.type_of(call).is_unknown());
    assert!(tg
        .diagnostics()
        .iter()
        .any(|d| matches!(d, PropagationDiagnostic::UnresolvedTemplate { node, .. } if *node == call)));

    tg.substitute_type(call, Type::generic("Box", vec![Type::int()]))
        .unwrap();
    assert_eq!(tg.type_of(v), Type::generic("Box", vec![Type::int()]));
}

#[test]
fn substituted_template_call_keeps_type_when_targets_arrive() {
    let mut tg = TypedGraph::default();
    let make = tg
        .add_function("make", &[], vec![Type::parameter("T")])
        .unwrap();
    let call = tg
        .add_template_call("make", vec![Type::parameter("T")], &[])
        .unwrap();
    let v = tg.add_variable("v", None, Some(call)).unwrap();

    tg.substitute_type(call, Type::int()).unwrap();
    tg.set_invokes(call, &[make]).unwrap();
    assert_eq!(tg.type_of(call), Type::int());
    assert_eq!(tg.type_of(v), Type::int());

    // A concrete target still takes part in the aggregation.
    let make_long = tg.add_function("make", &[], vec![Type::long()]).unwrap();
    tg.set_invokes(call, &[make, make_long]).unwrap();
    assert_eq!(tg.type_of(call), Type::long());
    assert_eq!(tg.type_of(v), Type::long());
}

// ---------------------------------------------------------------------------
// Modes and ordering
// ---------------------------------------------------------------------------

#[test]
fn deferred_mode_matches_live_mode() {
    let mut live = TypedGraph::default();
    build_mixed_program(&mut live);

    let mut deferred = TypedGraph::new(LanguageProfile::default(), PropagationMode::Deferred);
    let m = build_mixed_program(&mut deferred);
    assert!(deferred.pending_len() > 0);
    assert!(deferred.type_of(m.c).is_unknown());
    deferred.flush();

    let ids: Vec<NodeId> = live.graph().node_ids().collect();
    assert_eq!(ids, deferred.graph().node_ids().collect::<Vec<_>>());
    for id in ids {
        assert_eq!(live.type_of(id), deferred.type_of(id), "{id}");
    }
    assert_eq!(deferred.type_of(m.c), Type::string());
}

#[test]
fn dependents_are_visited_in_subscription_order() {
    let mut tg = TypedGraph::default();
    let x = tg.add_variable("x", None, None).unwrap();
    let refs: Vec<NodeId> = (0..3).map(|_| reference(&mut tg, "x", x)).collect();
    assert_eq!(tg.graph().observers(x), refs);

    let mut wave = Wave::new();
    tg.propose(x, Proposal::of(Type::int()), &mut wave);
    let mut expected = vec![x];
    expected.extend(&refs);
    assert_eq!(wave.visited().collect::<Vec<_>>(), expected);
}

#[test]
fn mixed_program_graph_roundtrips_through_json() {
    let mut tg = TypedGraph::default();
    let m = build_mixed_program(&mut tg);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");
    std::fs::write(&path, tg.graph().to_json().unwrap()).unwrap();

    let json = std::fs::read_to_string(&path).unwrap();
    let graph = cpg_core::graph::CodeGraph::from_json(&json).unwrap();
    let restored = TypedGraph::from_graph(graph, LanguageProfile::default(), PropagationMode::Live);
    assert_eq!(restored.type_of(m.a), Type::int());
    assert_eq!(restored.graph().ast_children(m.c, AstRole::Initializer).len(), 1);
}
