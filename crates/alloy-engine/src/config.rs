//! Engine configuration, validation, and error types.
//!
//! [`EngineConfig`] is the input for constructing a
//! [`ThreadedExecutionEngine`](crate::ThreadedExecutionEngine).
//! [`validate()`](EngineConfig::validate) checks structural invariants at
//! setup; graph and property errors found while building the engine are
//! reported through the same [`ConfigError`].

use std::error::Error;
use std::fmt;

use alloy_property::PropertyError;
use alloy_userobject::GraphError;

/// Upper bound on worker threads.
pub const MAX_THREADS: usize = 64;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while setting up a problem or an engine.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The UserObject graph could not be built, sorted or partitioned.
    Graph(GraphError),
    /// The property registry could not be sealed.
    Property(PropertyError),
    /// `threads` was explicitly set to zero.
    ZeroThreads,
    /// A group list names the same object twice.
    DuplicateGroupEntry {
        /// The repeated name.
        name: String,
    },
    /// The rayon pool could not be built.
    ThreadPool {
        /// Description from the pool builder.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(e) => write!(f, "user object graph: {e}"),
            Self::Property(e) => write!(f, "material properties: {e}"),
            Self::ZeroThreads => write!(f, "threads must be at least 1"),
            Self::DuplicateGroupEntry { name } => {
                write!(f, "user object '{name}' is listed twice in execution groups")
            }
            Self::ThreadPool { reason } => write!(f, "thread pool construction failed: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Graph(e) => Some(e),
            Self::Property(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for ConfigError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<PropertyError> for ConfigError {
    fn from(e: PropertyError) -> Self {
        Self::Property(e)
    }
}

// ── EngineConfig ───────────────────────────────────────────────────

/// Configuration for a [`ThreadedExecutionEngine`](crate::ThreadedExecutionEngine).
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Number of worker threads. `None` = auto-detect from
    /// `available_parallelism`.
    pub threads: Option<usize>,
    /// When set, reading a value of an object that is not a declared
    /// dependency fails with
    /// [`ExecutionError::UndeclaredDependency`](alloy_core::ExecutionError::UndeclaredDependency).
    pub check_unpublished_reads: bool,
    /// Objects that must run before initial conditions, together with
    /// everything they depend on.
    pub pre_ic: Vec<String>,
    /// Objects that must run before auxiliary variables are computed,
    /// together with everything they depend on.
    pub pre_aux: Vec<String>,
}

impl EngineConfig {
    /// Builder: fixed thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Resolve the actual thread count, applying auto-detection if `None`.
    ///
    /// Values are clamped to `[1, 64]`.
    pub fn resolved_thread_count(&self) -> usize {
        match self.threads {
            Some(n) => n.clamp(1, MAX_THREADS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .clamp(1, MAX_THREADS),
        }
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        let mut seen = std::collections::BTreeSet::new();
        for name in self.pre_ic.iter().chain(&self.pre_aux) {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateGroupEntry { name: name.clone() });
            }
        }
        Ok(())
    }
}
