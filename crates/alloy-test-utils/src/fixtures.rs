//! Concrete [`UserObject`] fixtures for engine and modifier tests.
//!
//! - [`ElementSum`]: sums an `f64` property or a field over elements.
//! - [`ElementAverage`]: divides another object's sum by the element count.
//! - [`EntityRecorder`]: records every entity it is handed.
//! - [`FailingUserObject`]: errors or panics on one chosen element.
//! - [`StaticValues`]: a fixed [`ValueLookup`] for driving contexts by hand.

use std::any::Any;

use indexmap::IndexMap;

use alloy_core::{ElementId, ExecFlag, ExecFlags, ExecutionError, UserObjectError};
use alloy_property::PropertyHandle;
use alloy_userobject::{
    join_as, Entity, EntityCategory, ExecuteContext, FinalizeContext, Restriction, UserObject,
    UserObjectValue, ValueLookup,
};

/// What [`ElementSum`] reads on each element.
#[derive(Clone, Debug)]
pub enum SumSource {
    /// Every qp of an `f64` material property.
    Property(PropertyHandle<f64>),
    /// The element value of a field variable.
    Field(String),
}

/// Sums a per-element quantity.
///
/// Contributions are kept in entity order and only added up in
/// `finalize`, so the result is bit-identical for any thread count.
#[derive(Clone, Debug)]
pub struct ElementSum {
    /// Object name.
    pub name: String,
    /// Quantity summed.
    pub source: SumSource,
    /// Blocks or boundaries it runs on.
    pub restriction: Restriction,
    /// Flags it runs for.
    pub execute_on: ExecFlags,
    contributions: Vec<f64>,
    total: Option<f64>,
}

impl ElementSum {
    /// Unrestricted sum running on `TIMESTEP_END`.
    pub fn new(name: &str, source: SumSource) -> Self {
        Self {
            name: name.to_string(),
            source,
            restriction: Restriction::default(),
            execute_on: ExecFlags::only(ExecFlag::TimestepEnd),
            contributions: Vec::new(),
            total: None,
        }
    }

    /// Sum of a material property over every qp.
    pub fn of_property(name: &str, handle: PropertyHandle<f64>) -> Self {
        Self::new(name, SumSource::Property(handle))
    }

    /// Sum of a field variable's element values.
    pub fn of_field(name: &str, var: &str) -> Self {
        Self::new(name, SumSource::Field(var.to_string()))
    }

    /// Replace the execute-on flags.
    pub fn on(mut self, flags: ExecFlags) -> Self {
        self.execute_on = flags;
        self
    }

    /// Restrict to blocks or boundaries.
    pub fn restricted_to(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }

    /// The finalized sum, if a pass completed.
    pub fn total(&self) -> Option<f64> {
        self.total
    }
}

impl UserObject for ElementSum {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> EntityCategory {
        EntityCategory::Element
    }

    fn restriction(&self) -> Restriction {
        self.restriction.clone()
    }

    fn execute_on(&self) -> ExecFlags {
        self.execute_on
    }

    fn clone_for_thread(&self) -> Box<dyn UserObject> {
        Box::new(self.clone())
    }

    fn initialize(&mut self) {
        self.contributions.clear();
        self.total = None;
    }

    fn execute(&mut self, entity: &Entity, ctx: &ExecuteContext<'_>) -> Result<(), UserObjectError> {
        let Entity::Element(elem) = *entity else {
            return Ok(());
        };
        match &self.source {
            SumSource::Property(handle) => {
                let n_qp = ctx.properties().layout().qp_count(elem);
                for qp in 0..n_qp {
                    let v = ctx
                        .properties()
                        .current_value(*handle, elem, qp)
                        .map_err(UserObjectError::failed)?;
                    self.contributions.push(*v);
                }
            }
            SumSource::Field(var) => {
                let v = ctx.fields().element_value(var, elem).ok_or_else(|| {
                    UserObjectError::failed(format!("no value of '{var}' on element {elem}"))
                })?;
                self.contributions.push(v);
            }
        }
        Ok(())
    }

    fn thread_join(&mut self, other: &dyn UserObject) -> Result<(), UserObjectError> {
        let other = join_as::<Self>(&self.name, other)?;
        self.contributions.extend_from_slice(&other.contributions);
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut FinalizeContext<'_>) -> Result<(), UserObjectError> {
        let local: f64 = self.contributions.iter().sum();
        self.total = Some(ctx.comm().gather_sum(local)?);
        Ok(())
    }

    fn value(&self) -> Option<UserObjectValue> {
        self.total.map(UserObjectValue::Scalar)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Average of a published sum over the elements it executes on.
#[derive(Clone, Debug)]
pub struct ElementAverage {
    /// Object name.
    pub name: String,
    /// The [`ElementSum`] it divides.
    pub sum: String,
    /// Flags it runs for.
    pub execute_on: ExecFlags,
    count: u64,
    average: Option<f64>,
}

impl ElementAverage {
    /// Average of `sum`, running on `TIMESTEP_END`.
    pub fn new(name: &str, sum: &str) -> Self {
        Self {
            name: name.to_string(),
            sum: sum.to_string(),
            execute_on: ExecFlags::only(ExecFlag::TimestepEnd),
            count: 0,
            average: None,
        }
    }

    /// Replace the execute-on flags.
    pub fn on(mut self, flags: ExecFlags) -> Self {
        self.execute_on = flags;
        self
    }
}

impl UserObject for ElementAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> EntityCategory {
        EntityCategory::Element
    }

    fn depends_on(&self) -> Vec<String> {
        vec![self.sum.clone()]
    }

    fn execute_on(&self) -> ExecFlags {
        self.execute_on
    }

    fn clone_for_thread(&self) -> Box<dyn UserObject> {
        Box::new(self.clone())
    }

    fn initialize(&mut self) {
        self.count = 0;
        self.average = None;
    }

    fn execute(&mut self, _entity: &Entity, ctx: &ExecuteContext<'_>) -> Result<(), UserObjectError> {
        // The sum must already be published when this object runs.
        ctx.value(&self.sum)?;
        self.count += 1;
        Ok(())
    }

    fn thread_join(&mut self, other: &dyn UserObject) -> Result<(), UserObjectError> {
        self.count += join_as::<Self>(&self.name, other)?.count;
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut FinalizeContext<'_>) -> Result<(), UserObjectError> {
        let count = ctx.comm().gather_sum_u64(self.count)?;
        let sum = ctx
            .value(&self.sum)?
            .as_scalar()
            .ok_or_else(|| UserObjectError::failed(format!("'{}' is not a scalar", self.sum)))?;
        if count == 0 {
            return Err(UserObjectError::failed("average over zero elements"));
        }
        self.average = Some(sum / count as f64);
        Ok(())
    }

    fn value(&self) -> Option<UserObjectValue> {
        self.average.map(UserObjectValue::Scalar)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records the entities and threads it executes on.
///
/// Publishes the number of entities seen as a scalar.
#[derive(Clone, Debug)]
pub struct EntityRecorder {
    /// Object name.
    pub name: String,
    /// Kind of entity it loops over.
    pub category: EntityCategory,
    /// Blocks or boundaries it runs on.
    pub restriction: Restriction,
    /// Objects it declares as dependencies.
    pub depends_on: Vec<String>,
    /// Flags it runs for.
    pub execute_on: ExecFlags,
    /// Entities in join order after a pass.
    pub seen: Vec<Entity>,
    /// Worker thread of each entry in `seen`.
    pub threads: Vec<usize>,
    /// Calls to `initialize` on this copy.
    pub initialize_calls: usize,
    /// Calls to `finalize` on this copy.
    pub finalize_calls: usize,
    /// Steps passed to `timestep_setup`.
    pub setup_steps: Vec<u64>,
}

impl EntityRecorder {
    /// Unrestricted recorder with no dependencies.
    pub fn new(name: &str, category: EntityCategory) -> Self {
        Self {
            name: name.to_string(),
            category,
            restriction: Restriction::default(),
            depends_on: Vec::new(),
            execute_on: ExecFlags::only(ExecFlag::TimestepEnd),
            seen: Vec::new(),
            threads: Vec::new(),
            initialize_calls: 0,
            finalize_calls: 0,
            setup_steps: Vec::new(),
        }
    }

    /// Restrict to blocks or boundaries.
    pub fn restricted_to(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }

    /// Declare dependencies by name.
    pub fn depending_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Replace the execute-on flags.
    pub fn on(mut self, flags: ExecFlags) -> Self {
        self.execute_on = flags;
        self
    }

    /// Elements among the recorded entities.
    pub fn elements(&self) -> Vec<ElementId> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                Entity::Element(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl UserObject for EntityRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> EntityCategory {
        self.category
    }

    fn depends_on(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn restriction(&self) -> Restriction {
        self.restriction.clone()
    }

    fn execute_on(&self) -> ExecFlags {
        self.execute_on
    }

    fn clone_for_thread(&self) -> Box<dyn UserObject> {
        Box::new(self.clone())
    }

    fn initialize(&mut self) {
        self.seen.clear();
        self.threads.clear();
        self.initialize_calls += 1;
    }

    fn execute(&mut self, entity: &Entity, ctx: &ExecuteContext<'_>) -> Result<(), UserObjectError> {
        for dep in &self.depends_on {
            ctx.value(dep)?;
        }
        self.seen.push(*entity);
        self.threads.push(ctx.thread());
        Ok(())
    }

    fn thread_join(&mut self, other: &dyn UserObject) -> Result<(), UserObjectError> {
        let other = join_as::<Self>(&self.name, other)?;
        self.seen.extend_from_slice(&other.seen);
        self.threads.extend_from_slice(&other.threads);
        Ok(())
    }

    fn finalize(&mut self, _ctx: &mut FinalizeContext<'_>) -> Result<(), UserObjectError> {
        self.finalize_calls += 1;
        Ok(())
    }

    fn value(&self) -> Option<UserObjectValue> {
        Some(UserObjectValue::Scalar(self.seen.len() as f64))
    }

    fn timestep_setup(
        &mut self,
        time_step: u64,
        _ctx: &mut FinalizeContext<'_>,
    ) -> Result<(), UserObjectError> {
        self.setup_steps.push(time_step);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How [`FailingUserObject`] fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureMode {
    /// Return `ExecutionFailed`.
    Error,
    /// Panic inside `execute`.
    Panic,
}

/// Fails on one element and counts the rest.
#[derive(Clone, Debug)]
pub struct FailingUserObject {
    /// Object name.
    pub name: String,
    /// Element that triggers the failure.
    pub fail_on: ElementId,
    /// Error or panic.
    pub mode: FailureMode,
    /// Elements executed without failing.
    pub executed: usize,
}

impl FailingUserObject {
    /// Fail on `fail_on`, running on `TIMESTEP_END`.
    pub fn new(name: &str, fail_on: ElementId, mode: FailureMode) -> Self {
        Self {
            name: name.to_string(),
            fail_on,
            mode,
            executed: 0,
        }
    }
}

impl UserObject for FailingUserObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> EntityCategory {
        EntityCategory::Element
    }

    fn clone_for_thread(&self) -> Box<dyn UserObject> {
        Box::new(self.clone())
    }

    fn initialize(&mut self) {
        self.executed = 0;
    }

    fn execute(&mut self, entity: &Entity, _ctx: &ExecuteContext<'_>) -> Result<(), UserObjectError> {
        if *entity == Entity::Element(self.fail_on) {
            match self.mode {
                FailureMode::Error => {
                    return Err(UserObjectError::failed(format!(
                        "refusing element {}",
                        self.fail_on
                    )))
                }
                FailureMode::Panic => panic!("exploded on element {}", self.fail_on),
            }
        }
        self.executed += 1;
        Ok(())
    }

    fn thread_join(&mut self, other: &dyn UserObject) -> Result<(), UserObjectError> {
        self.executed += join_as::<Self>(&self.name, other)?.executed;
        Ok(())
    }

    fn finalize(&mut self, _ctx: &mut FinalizeContext<'_>) -> Result<(), UserObjectError> {
        Ok(())
    }

    fn value(&self) -> Option<UserObjectValue> {
        Some(UserObjectValue::Scalar(self.executed as f64))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A fixed set of published values.
#[derive(Clone, Debug, Default)]
pub struct StaticValues {
    values: IndexMap<String, UserObjectValue>,
}

impl StaticValues {
    /// No values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a published value.
    pub fn with(mut self, object: &str, value: UserObjectValue) -> Self {
        self.values.insert(object.to_string(), value);
        self
    }
}

impl ValueLookup for StaticValues {
    fn value(&self, object: &str) -> Result<&UserObjectValue, ExecutionError> {
        self.values
            .get(object)
            .ok_or_else(|| ExecutionError::UnknownUserObject {
                name: object.to_string(),
            })
    }
}
