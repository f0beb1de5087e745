//! Property-based tests for the propagation engine.
//!
//! Random straight-line programs over numeric primitives: declarations with
//! optional declared types and initializers, followed by assignments between
//! them. Assignments to untyped declarations create observer cycles.

use proptest::prelude::*;

use cpg_core::id::NodeId;
use cpg_core::node::TypeState;
use cpg_core::types::Type;
use cpg_typeprop::join::common_supertype;
use cpg_typeprop::{LanguageProfile, PropagationMode, TypedGraph};

fn numeric(i: usize) -> Type {
    match i % 6 {
        0 => Type::char(),
        1 => Type::short(),
        2 => Type::int(),
        3 => Type::long(),
        4 => Type::float(),
        _ => Type::double(),
    }
}

#[derive(Debug, Clone)]
enum Source {
    Literal(usize),
    Ref(usize),
}

#[derive(Debug, Clone)]
enum Step {
    Declare {
        declared: Option<usize>,
        init: Option<Source>,
    },
    Assign {
        target: usize,
        value: Source,
    },
}

fn value_strategy() -> impl Strategy<Value = Source> {
    prop_oneof![
        (0usize..6).prop_map(Source::Literal),
        (0usize..16).prop_map(Source::Ref),
    ]
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (proptest::option::of(0usize..6), proptest::option::of(value_strategy()))
            .prop_map(|(declared, init)| Step::Declare { declared, init }),
        (0usize..16, value_strategy()).prop_map(|(target, value)| Step::Assign { target, value }),
    ]
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn value_node(tg: &mut TypedGraph, decls: &[NodeId], value: &Source) -> Option<NodeId> {
    match value {
        Source::Literal(i) => Some(tg.add_literal(numeric(*i), "0")),
        Source::Ref(j) => {
            let decl = *decls.get(j % decls.len().max(1))?;
            let r = tg.add_reference("v");
            tg.resolve_reference(r, decl).unwrap();
            Some(r)
        }
    }
}

fn build(tg: &mut TypedGraph, steps: &[Step]) {
    let mut decls: Vec<NodeId> = Vec::new();
    for step in steps {
        match step {
            Step::Declare { declared, init } => {
                let init = init.as_ref().and_then(|v| value_node(tg, &decls, v));
                let decl = tg
                    .add_variable("v", declared.map(numeric), init)
                    .unwrap();
                decls.push(decl);
            }
            Step::Assign { target, value } => {
                if decls.is_empty() {
                    continue;
                }
                let decl = decls[target % decls.len()];
                let Some(rhs) = value_node(tg, &decls, value) else {
                    continue;
                };
                let lhs = tg.add_reference("v");
                tg.add_assign("=", &[lhs], &[rhs], false).unwrap();
                tg.resolve_reference(lhs, decl).unwrap();
            }
        }
    }
    tg.flush();
}

fn states(tg: &TypedGraph) -> Vec<(NodeId, Option<TypeState>)> {
    tg.graph()
        .node_ids()
        .map(|id| (id, tg.type_state(id).cloned()))
        .collect()
}

fn refresh_all(tg: &mut TypedGraph) {
    let ids: Vec<NodeId> = tg.graph().node_ids().collect();
    for id in ids {
        if tg.type_state(id).is_some() {
            tg.refresh(id).unwrap();
        }
    }
    tg.flush();
}

/// Refreshes until a full pass changes nothing. Returns whether that
/// happened within the bound.
fn settle(tg: &mut TypedGraph) -> bool {
    let bound = 12 * tg.graph().node_count() + 2;
    for _ in 0..bound {
        let before = states(tg);
        refresh_all(tg);
        if states(tg) == before {
            return true;
        }
    }
    false
}

fn assert_consistent(tg: &TypedGraph) -> Result<(), TestCaseError> {
    for id in tg.graph().node_ids() {
        let Some(state) = tg.type_state(id) else {
            continue;
        };
        if state.possible_sub_types.is_empty() {
            prop_assert!(state.current.is_unknown(), "{id} has a type but no candidates");
            continue;
        }
        let joined = common_supertype(&tg.graph().records, &state.possible_sub_types);
        prop_assert_eq!(joined, Some(state.current.clone()), "{}", id);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn current_is_join_of_sub_types(steps in prop::collection::vec(step_strategy(), 1..12)) {
        let mut tg = TypedGraph::default();
        build(&mut tg, &steps);
        assert_consistent(&tg)?;

        refresh_all(&mut tg);
        assert_consistent(&tg)?;
    }

    #[test]
    fn propagation_converges_and_stays_put(steps in prop::collection::vec(step_strategy(), 1..12)) {
        let mut tg = TypedGraph::default();
        build(&mut tg, &steps);
        prop_assert!(settle(&mut tg));

        let settled = states(&tg);
        refresh_all(&mut tg);
        prop_assert_eq!(states(&tg), settled);
    }

    #[test]
    fn deferred_and_live_settle_to_the_same_types(steps in prop::collection::vec(step_strategy(), 1..12)) {
        // Without declared types every rule only widens, so the settled
        // state does not depend on the order in which updates ran.
        let untyped: Vec<Step> = steps
            .into_iter()
            .map(|step| match step {
                Step::Declare { init, .. } => Step::Declare { declared: None, init },
                other => other,
            })
            .collect();

        let mut live = TypedGraph::default();
        build(&mut live, &untyped);
        prop_assert!(settle(&mut live));

        let mut deferred = TypedGraph::new(LanguageProfile::default(), PropagationMode::Deferred);
        build(&mut deferred, &untyped);
        prop_assert!(settle(&mut deferred));

        prop_assert_eq!(states(&live), states(&deferred));
    }
}
