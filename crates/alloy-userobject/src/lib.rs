//! UserObject trait, execution contexts and dependency graph.
//!
//! The [`UserObject`] trait defines the per-pass lifecycle
//! (`initialize` / `execute` / `thread_join` / `finalize`) with read-only
//! [`ExecuteContext`] access on worker threads and mutable
//! [`FinalizeContext`] access on the calling thread. [`UserObjectGraph`]
//! orders objects by their declared dependencies.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod graph;
pub mod userobject;

pub use context::{ExecuteContext, FinalizeContext, ValueLookup};
pub use error::GraphError;
pub use graph::{AuxGroup, GraphState, UserObjectGraph, UserObjectNode};
pub use userobject::{
    join_as, Entity, EntityCategory, Restriction, UserObject, UserObjectValue,
};
