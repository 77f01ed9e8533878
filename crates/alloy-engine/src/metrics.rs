//! Per-pass performance metrics for the execution engine.
//!
//! [`ExecutionMetrics`] captures timing and workload data for a single
//! `execute` call, for telemetry and profiling.

use alloy_core::ExecFlag;

/// Workload of one UserObject in a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMetrics {
    /// Object name.
    pub name: String,
    /// Entities executed across all threads.
    pub entities: usize,
    /// Wall-clock time from `initialize` to publication, in microseconds.
    pub elapsed_us: u64,
}

/// Timing and workload metrics collected during a single pass.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default)]
pub struct ExecutionMetrics {
    /// The pass flag, `None` before the first pass.
    pub flag: Option<ExecFlag>,
    /// Worker threads available to the pass.
    pub thread_count: usize,
    /// Wall-clock time for the entire pass.
    pub total_us: u64,
    /// Time spent in the field collaborator's aux computation.
    pub aux_us: u64,
    /// Objects that ran, in execution order.
    pub objects: Vec<ObjectMetrics>,
    /// Objects skipped because their execute-on flags did not match.
    pub skipped: usize,
}

impl ExecutionMetrics {
    pub(crate) fn start(flag: ExecFlag, thread_count: usize) -> Self {
        Self {
            flag: Some(flag),
            thread_count,
            ..Self::default()
        }
    }

    /// Metrics of one object, if it ran.
    pub fn object(&self, name: &str) -> Option<&ObjectMetrics> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Entities executed by every object in the pass.
    pub fn total_entities(&self) -> usize {
        self.objects.iter().map(|o| o.entities).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_empty() {
        let m = ExecutionMetrics::default();
        assert_eq!(m.flag, None);
        assert_eq!(m.total_us, 0);
        assert!(m.objects.is_empty());
        assert_eq!(m.total_entities(), 0);
    }

    #[test]
    fn object_lookup_by_name() {
        let mut m = ExecutionMetrics::start(ExecFlag::Linear, 4);
        m.objects.push(ObjectMetrics {
            name: "sum".into(),
            entities: 10,
            elapsed_us: 5,
        });
        m.objects.push(ObjectMetrics {
            name: "avg".into(),
            entities: 10,
            elapsed_us: 3,
        });
        assert_eq!(m.object("avg").map(|o| o.elapsed_us), Some(3));
        assert_eq!(m.total_entities(), 20);
        assert_eq!(m.thread_count, 4);
    }
}
