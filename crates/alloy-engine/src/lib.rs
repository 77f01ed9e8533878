//! Threaded execution engine for Alloy UserObjects.
//!
//! A [`Problem`] owns the mesh, fields, communicator and material
//! property data. A [`ThreadedExecutionEngine`] runs the registered
//! UserObjects against it in dependency order on a fixed rayon pool,
//! with a deterministic join order and per-pass [`ExecutionMetrics`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod executor;
pub mod metrics;
pub mod partition;
pub mod problem;
pub mod values;

pub use config::{ConfigError, EngineConfig, MAX_THREADS};
pub use executor::ThreadedExecutionEngine;
pub use metrics::{ExecutionMetrics, ObjectMetrics};
pub use partition::{build_range, chunk_bounds, EntityCache};
pub use problem::Problem;
pub use values::{DeclaredLookup, ValueStatus, ValueStore};
