//! Per-element target subdomain computations.

use std::fmt;

use alloy_core::{ElementId, SubdomainId, UserObjectError};
use alloy_userobject::ExecuteContext;

/// Decides the subdomain an element should belong to.
///
/// Called once per element per pass from worker threads. Returning the
/// current subdomain or [`SubdomainId::INVALID`] leaves the element where
/// it is.
pub trait SubdomainPolicy: Send + Sync {
    /// Target subdomain of `elem`, currently in `current`.
    fn compute_subdomain_id(
        &self,
        elem: ElementId,
        current: SubdomainId,
        ctx: &ExecuteContext<'_>,
    ) -> Result<SubdomainId, UserObjectError>;
}

/// Policy backed by a closure.
pub struct FnPolicy<F>(pub F);

impl<F> SubdomainPolicy for FnPolicy<F>
where
    F: Fn(ElementId, SubdomainId, &ExecuteContext<'_>) -> SubdomainId + Send + Sync,
{
    fn compute_subdomain_id(
        &self,
        elem: ElementId,
        current: SubdomainId,
        ctx: &ExecuteContext<'_>,
    ) -> Result<SubdomainId, UserObjectError> {
        Ok((self.0)(elem, current, ctx))
    }
}

impl<F> fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPolicy(..)")
    }
}

/// Which side of the threshold selects the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Criterion {
    /// Strictly greater than the threshold.
    Above,
    /// Strictly less than the threshold.
    Below,
}

/// Moves elements whose field value crosses a threshold.
#[derive(Clone, Debug)]
pub struct ThresholdPolicy {
    variable: String,
    threshold: f64,
    criterion: Criterion,
    target: SubdomainId,
    complement: Option<SubdomainId>,
}

impl ThresholdPolicy {
    /// Send elements whose `variable` meets `criterion` relative to
    /// `threshold` to `target`.
    pub fn new(variable: &str, threshold: f64, criterion: Criterion, target: SubdomainId) -> Self {
        Self {
            variable: variable.to_string(),
            threshold,
            criterion,
            target,
            complement: None,
        }
    }

    /// Builder: send elements that do not meet the criterion to
    /// `subdomain` instead of leaving them in place.
    pub fn otherwise(mut self, subdomain: SubdomainId) -> Self {
        self.complement = Some(subdomain);
        self
    }

    fn met(&self, value: f64) -> bool {
        match self.criterion {
            Criterion::Above => value > self.threshold,
            Criterion::Below => value < self.threshold,
        }
    }
}

impl SubdomainPolicy for ThresholdPolicy {
    fn compute_subdomain_id(
        &self,
        elem: ElementId,
        _current: SubdomainId,
        ctx: &ExecuteContext<'_>,
    ) -> Result<SubdomainId, UserObjectError> {
        let Some(value) = ctx.fields().element_value(&self.variable, elem) else {
            if !ctx.fields().has_variable(&self.variable) {
                return Err(UserObjectError::failed(format!(
                    "threshold variable '{}' does not exist",
                    self.variable
                )));
            }
            return Ok(SubdomainId::INVALID);
        };
        if self.met(value) {
            Ok(self.target)
        } else {
            Ok(self.complement.unwrap_or(SubdomainId::INVALID))
        }
    }
}
