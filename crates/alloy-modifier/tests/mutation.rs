//! Subdomain mutations driven through the threaded engine.

use alloy_core::{BoundaryId, ElementId, ExecFlag, ExecutionError, FieldSystem, Mesh, NodeId, SubdomainId};
use alloy_engine::{EngineConfig, Problem, ThreadedExecutionEngine};
use alloy_modifier::{
    Criterion, FnPolicy, MovingBoundarySpec, MutationError, MutatorState, ReinitStrategy,
    SubdomainMutator, SubdomainMutatorConfig, ThresholdPolicy,
};
use alloy_property::{PropertyHandle, PropertyRegistry, QpLayout};
use alloy_test_utils::mesh::{BOTTOM, LEFT, RIGHT, TOP};
use alloy_test_utils::{GridMesh, RecordingFieldSystem};
use alloy_userobject::ExecuteContext;
use proptest::prelude::*;

const A: SubdomainId = SubdomainId(1);
const B: SubdomainId = SubdomainId(2);

type TestProblem = Problem<GridMesh, RecordingFieldSystem>;

/// A row of `n` elements in subdomain A with a "phase" field naming the
/// desired subdomain of every element and a "u" field to reinitialize.
fn row(n: usize, registry: PropertyRegistry) -> TestProblem {
    let mut mesh = GridMesh::new(n, 1);
    mesh.assign_blocks(|_, _| A);
    let elems: Vec<_> = (0..n as u64).map(ElementId).collect();
    let mut fields = RecordingFieldSystem::new()
        .with_variable("phase", f64::from(A.0))
        .with_variable("u", 0.0);
    fields.fill("phase", &elems, f64::from(A.0));
    fields.fill("u", &elems, 5.0);
    Problem::new(mesh, fields, registry, QpLayout::Uniform(1)).unwrap()
}

fn follow_phase(elem: ElementId, _: SubdomainId, ctx: &ExecuteContext<'_>) -> SubdomainId {
    match ctx.fields().element_value("phase", elem) {
        Some(v) => SubdomainId(v as u16),
        None => SubdomainId::INVALID,
    }
}

fn only_u() -> SubdomainMutatorConfig {
    SubdomainMutatorConfig {
        reinitialize_variables: vec!["u".into()],
        ..Default::default()
    }
}

fn engine_with(
    problem: &TestProblem,
    config: SubdomainMutatorConfig,
    threads: usize,
) -> ThreadedExecutionEngine {
    let mutator = SubdomainMutator::new(
        "mover",
        config,
        FnPolicy(follow_phase),
        problem.mesh(),
        problem.fields(),
    )
    .unwrap();
    ThreadedExecutionEngine::new(
        EngineConfig::default().with_threads(threads),
        vec![Box::new(mutator)],
    )
    .unwrap()
}

fn mutator(engine: &ThreadedExecutionEngine) -> &SubdomainMutator {
    engine.user_object_as::<SubdomainMutator>("mover").unwrap()
}

fn set_phase(problem: &mut TestProblem, elem: u64, to: SubdomainId) {
    problem
        .fields_mut()
        .set("phase", ElementId(elem), f64::from(to.0));
}

fn sorted_sides(mesh: &GridMesh, boundary: BoundaryId) -> Vec<(ElementId, u16)> {
    let mut sides = mesh.sides_on_boundary(boundary);
    sides.sort();
    sides
}

// ── Moving boundaries ──────────────────────────────────────────

#[test]
fn moved_element_gets_a_stable_moving_boundary() {
    let mut problem = row(4, PropertyRegistry::new());
    let mut engine = engine_with(&problem, only_u(), 2);

    set_phase(&mut problem, 1, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert_eq!(problem.mesh().subdomain_of(ElementId(1)), Some(B));
    let boundary = mutator(&engine).registry().get(A, B).unwrap().clone();
    assert_ne!(boundary.id, BoundaryId::INVALID);
    assert_eq!(boundary.owner, B);
    assert_eq!(
        problem.mesh().boundary_name(boundary.id),
        Some(boundary.name.as_str())
    );
    assert_eq!(
        sorted_sides(problem.mesh(), boundary.id),
        vec![(ElementId(1), RIGHT), (ElementId(1), LEFT)]
    );
    assert_eq!(mutator(&engine).state(), MutatorState::Idle);
    assert_eq!(engine.value("mover").unwrap().as_scalar(), Some(1.0));

    // the interface moves right; the pair keeps its id
    set_phase(&mut problem, 2, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    let again = mutator(&engine).registry().get(B, A).unwrap();
    assert_eq!(again.id, boundary.id);
    assert_eq!(mutator(&engine).registry().len(), 1);
    assert_eq!(
        sorted_sides(problem.mesh(), boundary.id),
        vec![(ElementId(1), LEFT), (ElementId(2), RIGHT)]
    );
    // node set follows the sides
    assert!(problem.mesh().is_boundary_node(NodeId(1), boundary.id));
    assert!(!problem.mesh().is_boundary_node(NodeId(2), boundary.id));
}

#[test]
fn emptied_boundary_keeps_its_registry_entry() {
    let mut problem = row(3, PropertyRegistry::new());
    let mut engine = engine_with(&problem, only_u(), 1);
    set_phase(&mut problem, 1, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    let id = mutator(&engine).registry().get(A, B).unwrap().id;

    set_phase(&mut problem, 1, A);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert!(problem.mesh().sides_on_boundary(id).is_empty());
    assert_eq!(mutator(&engine).registry().get(A, B).unwrap().id, id);
}

#[test]
fn configured_external_boundary_follows_the_owner() {
    let mut problem = row(3, PropertyRegistry::new());
    let config = SubdomainMutatorConfig {
        moving_boundaries: vec![MovingBoundarySpec::external("skin", B).with_id(BoundaryId(20))],
        ..only_u()
    };
    let mut engine = engine_with(&problem, config, 2);
    set_phase(&mut problem, 1, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert_eq!(
        sorted_sides(problem.mesh(), BoundaryId(20)),
        vec![(ElementId(1), BOTTOM), (ElementId(1), TOP)]
    );
    assert_eq!(problem.mesh().boundary_name(BoundaryId(20)), Some("skin"));
}

#[test]
fn lazy_boundaries_leave_existing_mesh_boundaries_alone() {
    let mut problem = row(5, PropertyRegistry::new());
    problem
        .mesh_mut()
        .add_boundary_side(ElementId(0), BOTTOM, BoundaryId(5))
        .unwrap();
    problem.mesh_mut().sync_boundary_nodes(BoundaryId(5)).unwrap();
    let mut engine = engine_with(&problem, only_u(), 2);

    set_phase(&mut problem, 1, B);
    set_phase(&mut problem, 3, SubdomainId(3));
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();

    let registry = mutator(&engine).registry();
    let ids: Vec<_> = registry.ids().collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&BoundaryId(5)), "{ids:?}");
    assert!(!registry.is_moving(BoundaryId(5)));
    assert_eq!(
        sorted_sides(problem.mesh(), BoundaryId(5)),
        vec![(ElementId(0), BOTTOM)]
    );
}

#[test]
fn configured_id_of_an_existing_boundary_is_rejected() {
    let problem = row(3, PropertyRegistry::new());
    let config = SubdomainMutatorConfig {
        moving_boundaries: vec![MovingBoundarySpec::between("front", B, A).with_id(BoundaryId(1))],
        ..only_u()
    };
    let r = SubdomainMutator::new(
        "mover",
        config,
        FnPolicy(follow_phase),
        problem.mesh(),
        problem.fields(),
    );
    match r {
        Err(MutationError::BoundaryIdInUse { boundary, .. }) => {
            assert_eq!(boundary, BoundaryId(1))
        }
        other => panic!("expected BoundaryIdInUse, got {other:?}"),
    }
}

#[test]
fn ancestors_move_with_their_children() {
    let mut problem = row(2, PropertyRegistry::new());
    problem
        .mesh_mut()
        .add_parent(ElementId(0), ElementId(100), A);
    let mut engine = engine_with(&problem, only_u(), 1);
    set_phase(&mut problem, 0, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert_eq!(problem.mesh().subdomain_of(ElementId(100)), Some(B));
}

// ── Reinitialization ───────────────────────────────────────────

fn stateful_problem(n: usize) -> (TestProblem, PropertyHandle<f64>) {
    let mut registry = PropertyRegistry::new();
    let strain = registry.declare::<f64>("material", "strain").unwrap();
    registry.mark_stateful(strain).unwrap();
    let mut problem = row(n, registry);
    problem
        .properties_mut()
        .set_initializer(strain, |_, _| -1.0)
        .unwrap();
    (problem, strain)
}

#[test]
fn reinitialization_leaves_untouched_elements_bit_identical() {
    let (mut problem, strain) = stateful_problem(6);
    let mut engine = engine_with(&problem, only_u(), 3);
    for step in 0..3u32 {
        for e in 0..6u64 {
            *problem
                .properties_mut()
                .value_at(strain, ElementId(e), 0)
                .unwrap() = 0.1 * f64::from(step) + e as f64;
        }
        engine.advance_timestep(&mut problem).unwrap();
    }
    let history = |p: &TestProblem, e: u64| {
        let store = p.properties();
        (
            store.old_value_at(strain, ElementId(e), 0).unwrap().to_bits(),
            store.older_value_at(strain, ElementId(e), 0).unwrap().to_bits(),
        )
    };
    let before: Vec<_> = (0..6).map(|e| history(&problem, e)).collect();

    set_phase(&mut problem, 2, B);
    set_phase(&mut problem, 3, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();

    for e in [0u64, 1, 4, 5] {
        assert_eq!(history(&problem, e), before[e as usize], "element {e}");
    }
    for e in [2u64, 3] {
        let store = problem.properties();
        assert_eq!(*store.old_value_at(strain, ElementId(e), 0).unwrap(), -1.0);
        assert_eq!(*store.older_value_at(strain, ElementId(e), 0).unwrap(), -1.0);
    }

    let fields = problem.fields();
    assert_eq!(fields.ic_calls.len(), 1);
    assert_eq!(fields.ic_calls[0].variables, vec!["u"]);
    assert_eq!(fields.ic_elements(), vec![ElementId(2), ElementId(3)]);
    assert_eq!(fields.element_value("u", ElementId(2)), Some(0.0));
    assert_eq!(fields.element_value("u", ElementId(1)), Some(5.0));
    assert_eq!(fields.reinit_count, 1);
    assert_eq!(
        fields.old_solution_calls,
        vec![(vec![ElementId(2), ElementId(3)], vec![])]
    );
}

#[test]
fn partial_reinit_list_reseeds_newly_covered_boundary_nodes() {
    let (mut problem, _) = stateful_problem(4);
    problem
        .mesh_mut()
        .assign_blocks(|i, _| if i < 2 { A } else { B });
    let config = SubdomainMutatorConfig {
        reinitialize_subdomains: vec![B],
        old_subdomain_reinitialized: false,
        ..only_u()
    };
    let mut engine = engine_with(&problem, config, 2);
    for e in 2..4 {
        set_phase(&mut problem, e, B);
    }
    set_phase(&mut problem, 1, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();

    let report = mutator(&engine).last_report();
    assert_eq!(report.moved, vec![ElementId(1)]);
    assert_eq!(report.reinitialized_elements, vec![ElementId(1)]);
    // nodes 1 and 6 only touched subdomain A before the move
    assert_eq!(report.reinitialized_nodes, vec![NodeId(1), NodeId(6)]);
    assert_eq!(problem.fields().ic_calls[0].nodes, vec![NodeId(1), NodeId(6)]);
}

#[test]
fn leaving_the_reinit_list_reseeds_nothing() {
    let (mut problem, _) = stateful_problem(4);
    problem
        .mesh_mut()
        .assign_blocks(|i, _| if i < 2 { A } else { B });
    let config = SubdomainMutatorConfig {
        reinitialize_subdomains: vec![B],
        ..only_u()
    };
    let mut engine = engine_with(&problem, config, 1);
    for e in 2..4 {
        set_phase(&mut problem, e, B);
    }
    set_phase(&mut problem, 3, A);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();

    assert_eq!(problem.mesh().subdomain_of(ElementId(3)), Some(A));
    assert!(mutator(&engine).last_report().reinitialized_elements.is_empty());
    assert!(problem.fields().ic_calls.is_empty());
    assert_eq!(problem.fields().reinit_count, 1);
}

/// Like [`row`], with nodal "u" values and element connectivity so an
/// initial condition overwrites every node of the elements it covers.
fn connected_row(n: usize) -> TestProblem {
    let mut mesh = GridMesh::new(n, 1);
    mesh.assign_blocks(|_, _| A);
    let elems: Vec<_> = (0..n as u64).map(ElementId).collect();
    let nodes = mesh.active_nodes();
    let mut fields = RecordingFieldSystem::new()
        .with_variable("phase", f64::from(A.0))
        .with_variable("u", 0.0)
        .with_connectivity(&mesh);
    fields.fill("phase", &elems, f64::from(A.0));
    fields.fill("u", &elems, 5.0);
    fields.fill_nodes("u", &nodes, 5.0);
    Problem::new(mesh, fields, PropertyRegistry::new(), QpLayout::Uniform(1)).unwrap()
}

#[test]
fn polynomial_strategy_extrapolates_from_the_neighbor_patch() {
    let mut problem = row(5, PropertyRegistry::new());
    for (e, u) in [1.0, 2.0, 100.0, 4.0, 8.0].into_iter().enumerate() {
        problem.fields_mut().set("u", ElementId(e as u64), u);
    }
    let config = SubdomainMutatorConfig {
        reinitialization_strategy: vec![ReinitStrategy::PolynomialNeighbor],
        ..only_u()
    };
    let mut engine = engine_with(&problem, config, 2);
    set_phase(&mut problem, 2, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();

    let fields = problem.fields();
    assert!(fields.ic_calls.is_empty());
    assert_eq!(fields.extrapolations.len(), 1);
    assert_eq!(fields.extrapolations[0].variable, "u");
    assert_eq!(fields.extrapolations[0].patch, vec![ElementId(1), ElementId(3)]);
    assert_eq!(fields.extrapolations[0].elements, vec![ElementId(2)]);
    assert_eq!(fields.element_value("u", ElementId(2)), Some(3.0));
    assert_eq!(fields.old_solution_calls.len(), 1);
}

#[test]
fn strategies_can_differ_per_variable() {
    let mut problem = row(5, PropertyRegistry::new());
    let config = SubdomainMutatorConfig {
        reinitialize_variables: vec!["phase".into(), "u".into()],
        reinitialization_strategy: vec![
            ReinitStrategy::Ic,
            ReinitStrategy::PolynomialNearby { radius: 2.0 },
        ],
        ..Default::default()
    };
    let mut engine = engine_with(&problem, config, 1);
    set_phase(&mut problem, 2, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();

    let fields = problem.fields();
    assert_eq!(fields.ic_calls.len(), 1);
    assert_eq!(fields.ic_calls[0].variables, vec!["phase"]);
    assert_eq!(
        fields.extrapolations[0].patch,
        vec![ElementId(0), ElementId(1), ElementId(3), ElementId(4)]
    );
}

#[test]
fn missing_fitter_fails_the_pass() {
    struct NoFitter(RecordingFieldSystem);
    impl alloy_core::FieldSystem for NoFitter {
        fn variable_names(&self) -> Vec<String> {
            self.0.variable_names()
        }
        fn element_value(&self, var: &str, elem: ElementId) -> Option<f64> {
            self.0.element_value(var, elem)
        }
        fn nodal_values(
            &self,
            var: &str,
            nodes: &[NodeId],
        ) -> Result<Vec<f64>, alloy_core::CollaboratorError> {
            self.0.nodal_values(var, nodes)
        }
        fn set_nodal_values(
            &mut self,
            var: &str,
            nodes: &[NodeId],
            values: &[f64],
        ) -> Result<(), alloy_core::CollaboratorError> {
            self.0.set_nodal_values(var, nodes, values)
        }
        fn apply_initial_condition(
            &mut self,
            vars: &[String],
            elems: &[ElementId],
            nodes: &[NodeId],
        ) -> Result<(), alloy_core::CollaboratorError> {
            self.0.apply_initial_condition(vars, elems, nodes)
        }
        fn set_old_solutions(
            &mut self,
            elems: &[ElementId],
            nodes: &[NodeId],
        ) -> Result<(), alloy_core::CollaboratorError> {
            self.0.set_old_solutions(elems, nodes)
        }
        fn reinitialize_equation_systems(&mut self) -> Result<(), alloy_core::CollaboratorError> {
            self.0.reinitialize_equation_systems()
        }
        fn compute_aux(&mut self, flag: ExecFlag) -> Result<(), alloy_core::CollaboratorError> {
            self.0.compute_aux(flag)
        }
    }

    let inner = row(3, PropertyRegistry::new());
    let mut fields = NoFitter(inner.fields().clone());
    fields.0.set("phase", ElementId(1), f64::from(B.0));
    let mut problem = Problem::new(
        inner.mesh().clone(),
        fields,
        PropertyRegistry::new(),
        QpLayout::Uniform(1),
    )
    .unwrap();
    let mutator = SubdomainMutator::new(
        "mover",
        SubdomainMutatorConfig {
            reinitialization_strategy: vec![ReinitStrategy::PolynomialWhole],
            ..only_u()
        },
        FnPolicy(follow_phase),
        problem.mesh(),
        problem.fields(),
    )
    .unwrap();
    let mut engine =
        ThreadedExecutionEngine::new(EngineConfig::default().with_threads(1), vec![Box::new(mutator)])
            .unwrap();
    match engine.execute(&mut problem, ExecFlag::TimestepBegin) {
        Err(ExecutionError::FinalizeFailed { object, reason }) => {
            assert_eq!(object, "mover");
            assert!(reason.to_string().contains("polynomial fitter"), "{reason}");
        }
        other => panic!("expected FinalizeFailed, got {other:?}"),
    }
}

#[test]
fn overridden_nodal_values_are_restored_on_request() {
    for restore in [false, true] {
        let mut problem = connected_row(3);
        let config = SubdomainMutatorConfig {
            restore_overridden_dofs: vec![restore],
            ..only_u()
        };
        let mut engine = engine_with(&problem, config, 2);
        assert_eq!(mutator(&engine).reinit_plan()[0].restore_overridden, restore);
        set_phase(&mut problem, 1, B);
        engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();

        let fields = problem.fields();
        // element 1 has nodes 1, 2, 5, 6, all shared with elements 0 and 2
        assert_eq!(fields.element_value("u", ElementId(1)), Some(0.0));
        let shared = [NodeId(1), NodeId(2), NodeId(5), NodeId(6)];
        let expected = if restore { 5.0 } else { 0.0 };
        for n in shared {
            assert_eq!(fields.nodal_value("u", n), Some(expected), "node {n} restore {restore}");
        }
        assert_eq!(fields.nodal_value("u", NodeId(0)), Some(5.0));
        if restore {
            assert_eq!(
                fields.nodal_writes,
                vec![("u".to_string(), shared.to_vec(), vec![5.0; 4])]
            );
        } else {
            assert!(fields.nodal_writes.is_empty());
        }
    }
}

// ── Time steps ─────────────────────────────────────────────────

#[test]
fn repeated_step_restores_subdomains_without_reinitializing() {
    let mut problem = row(3, PropertyRegistry::new());
    let mut engine = engine_with(&problem, only_u(), 2);
    engine.advance_timestep(&mut problem).unwrap();
    set_phase(&mut problem, 1, B);
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert_eq!(problem.mesh().subdomain_of(ElementId(1)), Some(B));
    assert_eq!(problem.fields().ic_calls.len(), 1);

    engine.repeat_timestep(&mut problem).unwrap();
    assert_eq!(problem.mesh().subdomain_of(ElementId(1)), Some(A));
    let report = mutator(&engine).last_report();
    assert!(report.restep);
    assert!(report.reinitialized_elements.is_empty());
    assert_eq!(problem.fields().ic_calls.len(), 1);
    assert_eq!(problem.fields().reinit_count, 2);
    let id = mutator(&engine).registry().get(A, B).unwrap().id;
    assert!(problem.mesh().sides_on_boundary(id).is_empty());

    // the step runs again and moves the element again
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert_eq!(problem.mesh().subdomain_of(ElementId(1)), Some(B));
    assert_eq!(problem.fields().ic_calls.len(), 2);

    // a new step never reverts
    engine.advance_timestep(&mut problem).unwrap();
    assert_eq!(problem.mesh().subdomain_of(ElementId(1)), Some(B));
}

#[test]
fn mutator_only_runs_on_its_flags() {
    let mut problem = row(3, PropertyRegistry::new());
    let mut engine = engine_with(&problem, only_u(), 1);
    set_phase(&mut problem, 0, B);
    engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
    assert_eq!(problem.mesh().subdomain_of(ElementId(0)), Some(A));
}

// ── Policies and failures ──────────────────────────────────────

#[test]
fn threshold_policy_moves_hot_elements() {
    let mut problem = row(4, PropertyRegistry::new());
    let hot = vec![ElementId(0), ElementId(3)];
    problem.fields_mut().fill("u", &hot, 12.0);
    let mutator = SubdomainMutator::new(
        "mover",
        only_u(),
        ThresholdPolicy::new("u", 10.0, Criterion::Above, B),
        problem.mesh(),
        problem.fields(),
    )
    .unwrap();
    let mut engine = ThreadedExecutionEngine::new(
        EngineConfig::default().with_threads(2),
        vec![Box::new(mutator)],
    )
    .unwrap();
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert_eq!(problem.mesh().elements_in_block(B), hot);
}

#[test]
fn unknown_target_is_warned_and_created() {
    let mut problem = row(4, PropertyRegistry::new());
    let mut engine = engine_with(&problem, only_u(), 2);
    for e in 0..4 {
        set_phase(&mut problem, e, SubdomainId(7));
    }
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    assert_eq!(mutator(&engine).warned_subdomains(), vec![SubdomainId(7)]);
    assert!(problem.mesh().has_subdomain(SubdomainId(7)));
}

#[test]
fn rejected_mesh_update_fails_the_pass() {
    let mut problem = row(2, PropertyRegistry::new());
    let mut engine = engine_with(&problem, only_u(), 1);
    set_phase(&mut problem, 0, SubdomainId::ANY);
    match engine.execute(&mut problem, ExecFlag::TimestepBegin) {
        Err(ExecutionError::FinalizeFailed { object, reason }) => {
            assert_eq!(object, "mover");
            assert!(reason.to_string().contains("sentinel"), "{reason}");
        }
        other => panic!("expected FinalizeFailed, got {other:?}"),
    }
    assert_eq!(mutator(&engine).state(), MutatorState::Applying);
}

#[test]
fn invalid_config_fails_construction() {
    let problem = row(2, PropertyRegistry::new());
    let config = SubdomainMutatorConfig {
        reinitialize_variables: vec!["T".into()],
        ..Default::default()
    };
    let r = SubdomainMutator::new(
        "mover",
        config,
        FnPolicy(follow_phase),
        problem.mesh(),
        problem.fields(),
    );
    assert!(r.is_err());
}

// ── Thread independence ────────────────────────────────────────

fn mutate_with(pattern: &[bool], threads: usize) -> (Vec<Option<SubdomainId>>, Vec<(ElementId, u16)>) {
    let mut problem = row(pattern.len(), PropertyRegistry::new());
    let mut engine = engine_with(&problem, only_u(), threads);
    for (e, moved) in pattern.iter().enumerate() {
        if *moved {
            set_phase(&mut problem, e as u64, B);
        }
    }
    engine.execute(&mut problem, ExecFlag::TimestepBegin).unwrap();
    let subdomains = (0..pattern.len() as u64)
        .map(|e| problem.mesh().subdomain_of(ElementId(e)))
        .collect();
    let sides = match mutator(&engine).registry().get(A, B) {
        Some(b) => sorted_sides(problem.mesh(), b.id),
        None => Vec::new(),
    };
    (subdomains, sides)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn mutation_is_independent_of_thread_count(
        pattern in prop::collection::vec(any::<bool>(), 1..24),
    ) {
        let serial = mutate_with(&pattern, 1);
        for threads in [2, 4] {
            prop_assert_eq!(&mutate_with(&pattern, threads), &serial);
        }
    }
}
