//! The threaded UserObject execution engine.
//!
//! [`ThreadedExecutionEngine`] owns every UserObject (one copy per worker
//! thread), the dependency graph and the published values. A pass runs
//! each object in sorted order through
//!
//! 1. entity range build (cached per mesh revision) and a static
//!    contiguous split into one chunk per copy,
//! 2. `initialize` + `execute` per entity, one rayon task per chunk,
//! 3. `thread_join` of copies 1..N into copy 0 in thread order,
//! 4. `finalize` on copy 0 and publication of its value.
//!
//! An error or panic inside any chunk aborts that object's pass: nothing
//! is joined or finalized and its value stays unreadable.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error, info};
use rayon::prelude::*;

use alloy_core::{ExecFlag, ExecFlags, ExecutionError, FieldSystem, Mesh, UserObjectError};
use alloy_userobject::{
    AuxGroup, Entity, EntityCategory, ExecuteContext, FinalizeContext, Restriction, UserObject,
    UserObjectGraph, UserObjectNode, UserObjectValue, ValueLookup,
};

use crate::config::{ConfigError, EngineConfig};
use crate::metrics::{ExecutionMetrics, ObjectMetrics};
use crate::partition::{chunk_bounds, EntityCache};
use crate::problem::Problem;
use crate::values::{DeclaredLookup, ValueStatus, ValueStore};

const PRE_IC: usize = 0;
const PRE_AUX: usize = 1;
const POST_AUX: usize = 2;

/// One registered object and its thread copies.
struct ObjectSlot {
    name: String,
    category: EntityCategory,
    restriction: Restriction,
    execute_on: ExecFlags,
    depends_on: Vec<String>,
    /// Copy 0 is the primary; general objects have no other copy.
    copies: Vec<Box<dyn UserObject>>,
}

/// Runs UserObjects over mesh entities on a fixed rayon pool.
///
/// # Example
///
/// ```ignore
/// let mut engine = ThreadedExecutionEngine::new(config, objects)?;
/// engine.execute_initial(&mut problem)?;
/// loop {
///     engine.advance_timestep(&mut problem)?;
///     engine.execute(&mut problem, ExecFlag::TimestepEnd)?;
///     let avg = engine.value("average")?;
/// }
/// ```
pub struct ThreadedExecutionEngine {
    config: EngineConfig,
    pool: rayon::ThreadPool,
    threads: usize,
    graph: UserObjectGraph,
    objects: Vec<ObjectSlot>,
    groups: [Vec<usize>; 3],
    sorted: Vec<usize>,
    values: ValueStore,
    entities: EntityCache,
    time_step: u64,
    metrics: ExecutionMetrics,
}

impl ThreadedExecutionEngine {
    /// Validate `config`, build the worker pool, and sort and partition
    /// `objects` by their declared dependencies.
    ///
    /// Thread copies are created here with
    /// [`UserObject::clone_for_thread`]; the passed object becomes copy 0.
    pub fn new(
        config: EngineConfig,
        objects: Vec<Box<dyn UserObject>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let threads = config.resolved_thread_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("alloy-worker-{i}"))
            .build()
            .map_err(|e| ConfigError::ThreadPool {
                reason: e.to_string(),
            })?;

        let mut graph = UserObjectGraph::new();
        let mut values = ValueStore::new();
        let mut slots = Vec::with_capacity(objects.len());
        for object in objects {
            let node = UserObjectNode::from_object(object.as_ref());
            graph.register(node.clone())?;
            values.register(&node.name);
            let n_copies = match node.category {
                EntityCategory::General => 1,
                _ => threads,
            };
            let mut copies = Vec::with_capacity(n_copies);
            let extra: Vec<_> = (1..n_copies).map(|_| object.clone_for_thread()).collect();
            copies.push(object);
            copies.extend(extra);
            slots.push(ObjectSlot {
                name: node.name,
                category: node.category,
                restriction: node.restriction,
                execute_on: node.execute_on,
                depends_on: node.depends_on,
                copies,
            });
        }

        let sorted = graph.sort()?.to_vec();
        graph.partition_groups(&config.pre_ic, &config.pre_aux)?;
        let groups = [
            graph.order(AuxGroup::PreIc)?.to_vec(),
            graph.order(AuxGroup::PreAux)?.to_vec(),
            graph.order(AuxGroup::PostAux)?.to_vec(),
        ];
        info!(
            "execution engine ready: {} user objects ({} pre-IC, {} pre-aux, {} post-aux) on {threads} threads",
            slots.len(),
            groups[PRE_IC].len(),
            groups[PRE_AUX].len(),
            groups[POST_AUX].len()
        );

        Ok(Self {
            config,
            pool,
            threads,
            graph,
            objects: slots,
            groups,
            sorted,
            values,
            entities: EntityCache::default(),
            time_step: 0,
            metrics: ExecutionMetrics::default(),
        })
    }

    // ── Passes ──────────────────────────────────────────────────

    /// Run one pass for `flag`: PRE_AUX objects, the field system's aux
    /// computation, then POST_AUX objects. Objects whose execute-on flags
    /// do not contain `flag` are skipped. PRE_IC objects only run from
    /// [`execute_initial`](Self::execute_initial).
    pub fn execute<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
        flag: ExecFlag,
    ) -> Result<(), ExecutionError> {
        self.pass(problem, flag, false)
    }

    /// Run the initial pass with [`ExecFlag::Initial`]. PRE_IC objects
    /// finish before any other object starts.
    pub fn execute_initial<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
    ) -> Result<(), ExecutionError> {
        self.pass(problem, ExecFlag::Initial, true)
    }

    fn pass<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
        flag: ExecFlag,
        with_pre_ic: bool,
    ) -> Result<(), ExecutionError> {
        let start = Instant::now();
        self.metrics = ExecutionMetrics::start(flag, self.threads);
        if with_pre_ic {
            self.run_group(problem, PRE_IC, flag)?;
        }
        self.run_group(problem, PRE_AUX, flag)?;

        let aux_start = Instant::now();
        problem
            .fields
            .compute_aux(flag)
            .map_err(|reason| ExecutionError::AuxFailed { flag, reason })?;
        self.metrics.aux_us = aux_start.elapsed().as_micros() as u64;

        self.run_group(problem, POST_AUX, flag)?;
        self.metrics.total_us = start.elapsed().as_micros() as u64;
        debug!(
            "{flag} pass: {} objects, {} skipped, {} entities in {}us",
            self.metrics.objects.len(),
            self.metrics.skipped,
            self.metrics.total_entities(),
            self.metrics.total_us
        );
        Ok(())
    }

    fn run_group<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
        group: usize,
        flag: ExecFlag,
    ) -> Result<(), ExecutionError> {
        for i in 0..self.groups[group].len() {
            let index = self.groups[group][i];
            if !self.objects[index].execute_on.contains(flag) {
                self.metrics.skipped += 1;
                continue;
            }
            self.run_object(problem, index, flag)?;
        }
        Ok(())
    }

    fn run_object<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
        index: usize,
        flag: ExecFlag,
    ) -> Result<(), ExecutionError> {
        let start = Instant::now();
        let Self {
            config,
            pool,
            objects,
            values,
            entities,
            metrics,
            ..
        } = self;
        let slot = &mut objects[index];
        values.mark_pending(&slot.name);

        let range = entities.range(index, &problem.mesh, slot.category, &slot.restriction);
        let chunks = chunk_bounds(range.len(), slot.copies.len());

        // 1-2. Threaded initialize + execute.
        let outcomes: Vec<Result<usize, UserObjectError>> = {
            let declared = DeclaredLookup::new(values, &slot.name, &slot.depends_on);
            let lookup: &dyn ValueLookup = if config.check_unpublished_reads {
                &declared
            } else {
                &*values
            };
            let mesh: &dyn Mesh = &problem.mesh;
            let fields: &dyn FieldSystem = &problem.fields;
            let registry = &problem.registry;
            let properties = &problem.properties;
            let abort = AtomicBool::new(false);
            pool.install(|| {
                slot.copies
                    .par_iter_mut()
                    .zip(chunks.par_iter())
                    .enumerate()
                    .map(|(thread, (copy, chunk))| {
                        let ctx = ExecuteContext::new(
                            mesh, fields, registry, properties, lookup, thread, flag,
                        );
                        run_chunk(&mut **copy, &range[chunk.clone()], &ctx, &abort)
                    })
                    .collect()
            })
        };
        let mut executed = 0;
        for (thread, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(n) => executed += n,
                Err(reason) => {
                    values.mark_aborted(&slot.name);
                    error!("'{}' aborted on thread {thread} during {flag}: {reason}", slot.name);
                    return Err(ExecutionError::Aborted {
                        object: slot.name.clone(),
                        thread,
                        reason,
                    });
                }
            }
        }

        let Some((primary, rest)) = slot.copies.split_first_mut() else {
            return Ok(());
        };

        // 3. Fold copies into copy 0 in thread order.
        for (offset, other) in rest.iter().enumerate() {
            if let Err(reason) = primary.thread_join(&**other) {
                values.mark_aborted(&slot.name);
                error!("'{}' failed to join thread {}: {reason}", slot.name, offset + 1);
                return Err(ExecutionError::Aborted {
                    object: slot.name.clone(),
                    thread: offset + 1,
                    reason,
                });
            }
        }

        // 4. Finalize on the calling thread.
        let finalized = {
            let declared = DeclaredLookup::new(values, &slot.name, &slot.depends_on);
            let lookup: &dyn ValueLookup = if config.check_unpublished_reads {
                &declared
            } else {
                &*values
            };
            let mut ctx = FinalizeContext::new(
                &mut problem.mesh,
                &mut problem.fields,
                &problem.registry,
                &mut problem.properties,
                problem.comm.as_ref(),
                lookup,
                Some(flag),
            );
            primary.finalize(&mut ctx)
        };
        if let Err(reason) = finalized {
            values.mark_aborted(&slot.name);
            error!("'{}' failed to finalize during {flag}: {reason}", slot.name);
            return Err(ExecutionError::FinalizeFailed {
                object: slot.name.clone(),
                reason,
            });
        }
        values.publish(&slot.name, primary.value());

        let elapsed_us = start.elapsed().as_micros() as u64;
        debug!(
            "'{}' finalized on {flag}: {executed} {} entities, {} copies, {elapsed_us}us",
            slot.name,
            slot.category,
            slot.copies.len()
        );
        metrics.objects.push(ObjectMetrics {
            name: slot.name.clone(),
            entities: executed,
            elapsed_us,
        });
        Ok(())
    }

    // ── Time steps ──────────────────────────────────────────────

    /// Begin the next time step: rotate stateful property history, then
    /// run `timestep_setup` on every object in sorted order.
    ///
    /// Returns the new time step number; the first call returns 1.
    pub fn advance_timestep<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
    ) -> Result<u64, ExecutionError> {
        self.time_step += 1;
        problem.properties.shift();
        self.setup_timestep(problem)?;
        Ok(self.time_step)
    }

    /// Repeat the current time step after a failed solve. Property history
    /// is not rotated; objects see the same step number again in
    /// `timestep_setup`.
    pub fn repeat_timestep<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
    ) -> Result<u64, ExecutionError> {
        info!("repeating time step {}", self.time_step);
        self.setup_timestep(problem)?;
        Ok(self.time_step)
    }

    fn setup_timestep<M: Mesh, F: FieldSystem>(
        &mut self,
        problem: &mut Problem<M, F>,
    ) -> Result<(), ExecutionError> {
        let time_step = self.time_step;
        for &index in &self.sorted {
            let slot = &mut self.objects[index];
            let Some(primary) = slot.copies.first_mut() else {
                continue;
            };
            let mut ctx = FinalizeContext::new(
                &mut problem.mesh,
                &mut problem.fields,
                &problem.registry,
                &mut problem.properties,
                problem.comm.as_ref(),
                &self.values,
                None,
            );
            primary
                .timestep_setup(time_step, &mut ctx)
                .map_err(|reason| {
                    error!("'{}' failed timestep setup {time_step}: {reason}", slot.name);
                    ExecutionError::SetupFailed {
                        object: slot.name.clone(),
                        reason,
                    }
                })?;
        }
        debug!("time step {time_step} set up for {} objects", self.sorted.len());
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Published value of an object.
    pub fn value(&self, object: &str) -> Result<&UserObjectValue, ExecutionError> {
        self.values.value(object)
    }

    /// Publication state of an object's value.
    pub fn status(&self, object: &str) -> Option<&ValueStatus> {
        self.values.status(object)
    }

    /// Copy 0 of an object.
    pub fn user_object(&self, name: &str) -> Option<&dyn UserObject> {
        let index = self.graph.index_of(name)?;
        self.objects[index].copies.first().map(|c| &**c)
    }

    /// Copy 0 of an object, downcast to its concrete type.
    pub fn user_object_as<T: UserObject>(&self, name: &str) -> Option<&T> {
        let object: &dyn Any = self.user_object(name)?.as_any();
        object.downcast_ref::<T>()
    }

    /// Number of copies kept for an object.
    pub fn copy_count(&self, name: &str) -> Option<usize> {
        let index = self.graph.index_of(name)?;
        Some(self.objects[index].copies.len())
    }

    /// The frozen dependency graph.
    pub fn graph(&self) -> &UserObjectGraph {
        &self.graph
    }

    /// Object names in execution order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.sorted
            .iter()
            .map(|&i| self.objects[i].name.as_str())
            .collect()
    }

    /// Worker threads in the pool.
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Current time step number.
    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    /// Metrics of the most recent pass.
    pub fn metrics(&self) -> &ExecutionMetrics {
        &self.metrics
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for ThreadedExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedExecutionEngine")
            .field("threads", &self.threads)
            .field("objects", &self.execution_order())
            .field("time_step", &self.time_step)
            .finish()
    }
}

/// `initialize` then `execute` over one chunk. Stops early once any
/// chunk of the same object has failed.
fn run_chunk(
    copy: &mut dyn UserObject,
    entities: &[Entity],
    ctx: &ExecuteContext<'_>,
    abort: &AtomicBool,
) -> Result<usize, UserObjectError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<usize, UserObjectError> {
        copy.initialize();
        let mut done = 0;
        for entity in entities {
            if abort.load(Ordering::Relaxed) {
                break;
            }
            copy.execute(entity, ctx)?;
            done += 1;
        }
        Ok(done)
    }));
    let result = outcome.unwrap_or_else(|payload| {
        Err(UserObjectError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    });
    if result.is_err() {
        abort.store(true, Ordering::Relaxed);
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
