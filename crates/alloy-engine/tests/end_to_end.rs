//! Full passes over the in-memory mesh: ordering, failures, groups and
//! stateful history.

use std::any::Any;

use alloy_core::{ElementId, ExecFlag, ExecutionError, UserObjectError};
use alloy_engine::{ConfigError, EngineConfig, Problem, ThreadedExecutionEngine, ValueStatus};
use alloy_property::{PropertyRegistry, QpLayout};
use alloy_test_utils::{
    ElementAverage, ElementSum, EntityRecorder, FailingUserObject, FailureMode, GridMesh,
    RecordingFieldSystem,
};
use alloy_userobject::{
    Entity, EntityCategory, ExecuteContext, FinalizeContext, GraphError, UserObject,
};

fn field_problem(n: usize, x: f64) -> Problem<GridMesh, RecordingFieldSystem> {
    let mesh = GridMesh::line(n);
    let mut fields = RecordingFieldSystem::new().with_variable("x", x);
    let elems: Vec<_> = (0..n as u64).map(ElementId).collect();
    fields.fill("x", &elems, x);
    Problem::new(mesh, fields, PropertyRegistry::new(), QpLayout::default()).unwrap()
}

fn threads(n: usize) -> EngineConfig {
    EngineConfig::default().with_threads(n)
}

// ── Sum / Average ──────────────────────────────────────────────

#[test]
fn sum_and_average_in_either_declaration_order() {
    for sum_first in [true, false] {
        for n_threads in [1, 3] {
            let mut problem = field_problem(10, 2.0);
            let sum: Box<dyn UserObject> = Box::new(ElementSum::of_field("Sum", "x"));
            let avg: Box<dyn UserObject> = Box::new(ElementAverage::new("Average", "Sum"));
            let objects = if sum_first { vec![sum, avg] } else { vec![avg, sum] };
            let mut engine = ThreadedExecutionEngine::new(threads(n_threads), objects).unwrap();
            assert_eq!(engine.execution_order(), vec!["Sum", "Average"]);

            engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
            assert_eq!(engine.value("Sum").unwrap().as_scalar(), Some(20.0));
            assert_eq!(engine.value("Average").unwrap().as_scalar(), Some(2.0));
        }
    }
}

#[test]
fn values_are_recomputed_every_pass() {
    let mut problem = field_problem(4, 1.0);
    let mut engine = ThreadedExecutionEngine::new(
        threads(2),
        vec![Box::new(ElementSum::of_field("Sum", "x"))],
    )
    .unwrap();
    engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
    assert_eq!(engine.value("Sum").unwrap().as_scalar(), Some(4.0));
    problem.fields_mut().set("x", ElementId(0), 5.0);
    engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
    assert_eq!(engine.value("Sum").unwrap().as_scalar(), Some(8.0));
}

// ── Failures ───────────────────────────────────────────────────

#[test]
fn execute_error_aborts_without_finalize() {
    let mut problem = field_problem(8, 1.0);
    let mut engine = ThreadedExecutionEngine::new(
        threads(4),
        vec![Box::new(FailingUserObject::new(
            "bad",
            ElementId(5),
            FailureMode::Error,
        ))],
    )
    .unwrap();
    match engine.execute(&mut problem, ExecFlag::TimestepEnd) {
        Err(ExecutionError::Aborted {
            object,
            thread,
            reason: UserObjectError::ExecutionFailed { .. },
        }) => {
            assert_eq!(object, "bad");
            // chunks of 2: element 5 lives in chunk 2
            assert_eq!(thread, 2);
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
    assert_eq!(engine.status("bad"), Some(&ValueStatus::Aborted));
    assert!(engine.value("bad").is_err());
    // post-aux object: aux ran before it
    assert_eq!(problem.fields().aux_calls, vec![ExecFlag::TimestepEnd]);
}

#[test]
fn panic_is_caught_and_reported() {
    let mut problem = field_problem(3, 1.0);
    let mut engine = ThreadedExecutionEngine::new(
        threads(1),
        vec![Box::new(FailingUserObject::new(
            "explosive",
            ElementId(1),
            FailureMode::Panic,
        ))],
    )
    .unwrap();
    match engine.execute(&mut problem, ExecFlag::TimestepEnd) {
        Err(ExecutionError::Aborted {
            object,
            thread: 0,
            reason: UserObjectError::Panicked { message },
        }) => {
            assert_eq!(object, "explosive");
            assert!(message.contains("element 1"), "{message}");
        }
        other => panic!("expected Aborted with Panicked, got {other:?}"),
    }
}

#[test]
fn failure_on_absent_element_never_fires() {
    let mut problem = field_problem(4, 1.0);
    let mut engine = ThreadedExecutionEngine::new(
        threads(2),
        vec![Box::new(FailingUserObject::new(
            "flaky",
            ElementId(9),
            FailureMode::Error,
        ))],
    )
    .unwrap();
    engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
    assert_eq!(engine.value("flaky").unwrap().as_scalar(), Some(4.0));
}

#[test]
fn cyclic_objects_fail_at_setup() {
    let r = ThreadedExecutionEngine::new(
        threads(1),
        vec![
            Box::new(EntityRecorder::new("a", EntityCategory::General).depending_on(&["b"])),
            Box::new(EntityRecorder::new("b", EntityCategory::General).depending_on(&["a"])),
        ],
    );
    match r {
        Err(ConfigError::Graph(GraphError::CyclicDependency { cycle })) => {
            assert_eq!(cycle, vec!["a", "b", "a"]);
        }
        Err(other) => panic!("expected CyclicDependency, got {other:?}"),
        Ok(_) => panic!("expected CyclicDependency, got an engine"),
    }
}

// ── Undeclared reads ───────────────────────────────────────────

/// Reads "Sum" without declaring it.
#[derive(Clone)]
struct Sneaky;

impl UserObject for Sneaky {
    fn name(&self) -> &str {
        "Sneaky"
    }
    fn category(&self) -> EntityCategory {
        EntityCategory::General
    }
    fn clone_for_thread(&self) -> Box<dyn UserObject> {
        Box::new(self.clone())
    }
    fn initialize(&mut self) {}
    fn execute(&mut self, _: &Entity, ctx: &ExecuteContext<'_>) -> Result<(), UserObjectError> {
        ctx.value("Sum")?;
        Ok(())
    }
    fn thread_join(&mut self, _: &dyn UserObject) -> Result<(), UserObjectError> {
        Ok(())
    }
    fn finalize(&mut self, _: &mut FinalizeContext<'_>) -> Result<(), UserObjectError> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn undeclared_reads_pass_unless_checked() {
    let objects = || -> Vec<Box<dyn UserObject>> {
        vec![Box::new(ElementSum::of_field("Sum", "x")), Box::new(Sneaky)]
    };
    let mut problem = field_problem(2, 1.0);
    let mut lax = ThreadedExecutionEngine::new(threads(1), objects()).unwrap();
    lax.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();

    let config = EngineConfig {
        check_unpublished_reads: true,
        ..threads(1)
    };
    let mut strict = ThreadedExecutionEngine::new(config, objects()).unwrap();
    match strict.execute(&mut problem, ExecFlag::TimestepEnd) {
        Err(ExecutionError::Aborted { object, reason, .. }) => {
            assert_eq!(object, "Sneaky");
            assert!(reason.to_string().contains("without declaring"), "{reason}");
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
}

// ── Groups ─────────────────────────────────────────────────────

#[test]
fn pre_ic_and_pre_aux_objects_run_first() {
    let mut problem = field_problem(2, 1.0);
    let config = EngineConfig {
        pre_ic: vec!["ic".into()],
        pre_aux: vec!["aux".into()],
        ..threads(2)
    };
    let all = alloy_core::ExecFlags::only(ExecFlag::Initial).with(ExecFlag::TimestepEnd);
    let mut engine = ThreadedExecutionEngine::new(
        config,
        vec![
            Box::new(EntityRecorder::new("post", EntityCategory::Element).on(all)),
            Box::new(EntityRecorder::new("aux", EntityCategory::Element).on(all)),
            Box::new(EntityRecorder::new("ic", EntityCategory::Element).on(all)),
        ],
    )
    .unwrap();
    engine.execute_initial(&mut problem).unwrap();
    let ran: Vec<_> = engine
        .metrics()
        .objects
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    assert_eq!(ran, vec!["ic", "aux", "post"]);
    assert_eq!(problem.fields().aux_calls, vec![ExecFlag::Initial]);
}

#[test]
fn pre_ic_objects_only_run_in_the_initial_pass() {
    let mut problem = field_problem(3, 1.0);
    let config = EngineConfig {
        pre_ic: vec!["ic".into()],
        ..threads(2)
    };
    let all = alloy_core::ExecFlags::only(ExecFlag::Initial).with(ExecFlag::TimestepEnd);
    let mut engine = ThreadedExecutionEngine::new(
        config,
        vec![
            Box::new(EntityRecorder::new("ic", EntityCategory::Element).on(all)),
            Box::new(EntityRecorder::new("post", EntityCategory::Element).on(all)),
        ],
    )
    .unwrap();

    engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
    let ran: Vec<_> = engine
        .metrics()
        .objects
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    assert_eq!(ran, vec!["post"]);

    // an explicit Initial flag is not the initial pass either
    engine.execute(&mut problem, ExecFlag::Initial).unwrap();
    assert_eq!(engine.metrics().objects.len(), 1);

    engine.execute_initial(&mut problem).unwrap();
    assert_eq!(engine.metrics().objects[0].name, "ic");
}

// ── Stateful history ───────────────────────────────────────────

#[test]
fn older_value_trails_by_two_steps() {
    let mut registry = PropertyRegistry::new();
    let handle = registry.declare::<f64>("material", "strain").unwrap();
    registry.mark_stateful(handle).unwrap();
    let mut problem = Problem::new(
        GridMesh::line(3),
        RecordingFieldSystem::new(),
        registry,
        QpLayout::Uniform(2),
    )
    .unwrap();
    let mut engine = ThreadedExecutionEngine::new(
        threads(2),
        vec![Box::new(ElementSum::of_property("total", handle))],
    )
    .unwrap();

    for pass in 0..5u32 {
        for e in 0..3 {
            for qp in 0..2 {
                *problem
                    .properties_mut()
                    .value_at(handle, ElementId(e), qp)
                    .unwrap() = f64::from(pass);
            }
        }
        engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
        assert_eq!(
            engine.value("total").unwrap().as_scalar(),
            Some(6.0 * f64::from(pass))
        );
        engine.advance_timestep(&mut problem).unwrap();
        if pass >= 1 {
            let older = *problem
                .properties()
                .older_value_at(handle, ElementId(1), 1)
                .unwrap();
            assert_eq!(older, f64::from(pass - 1));
        }
    }
}
