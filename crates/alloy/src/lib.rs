//! Alloy: UserObject and material property execution for multiphysics
//! finite-element simulations.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Alloy sub-crates. For most users, adding `alloy-fem` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use alloy::prelude::*;
//! use alloy_test_utils::{ElementSum, GridMesh, RecordingFieldSystem};
//!
//! let mut registry = PropertyRegistry::new();
//! let k = registry.declare::<f64>("material", "conductivity").unwrap();
//! let mut problem = Problem::new(
//!     GridMesh::new(4, 4),
//!     RecordingFieldSystem::new(),
//!     registry,
//!     QpLayout::Uniform(1),
//! )
//! .unwrap();
//! for e in problem.mesh().active_elements() {
//!     *problem.properties_mut().value_at(k, e, 0).unwrap() = 0.5;
//! }
//!
//! let mut engine = ThreadedExecutionEngine::new(
//!     EngineConfig::default().with_threads(2),
//!     vec![Box::new(ElementSum::of_property("total_k", k))],
//! )
//! .unwrap();
//! engine.execute(&mut problem, ExecFlag::TimestepEnd).unwrap();
//! assert_eq!(engine.value("total_k").unwrap().as_scalar(), Some(8.0));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `alloy-core` | IDs, execute-on flags, errors, collaborator traits |
//! | [`property`] | `alloy-property` | Property registry and stateful storage |
//! | [`userobject`] | `alloy-userobject` | UserObject trait, contexts, dependency graph |
//! | [`engine`] | `alloy-engine` | Problem state and the threaded execution engine |
//! | [`modifier`] | `alloy-modifier` | Element subdomain mutation |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core ids, flags, errors and collaborator traits (`alloy-core`).
///
/// The [`types::Mesh`], [`types::FieldSystem`] and
/// [`types::Communicator`] traits are what a host framework implements.
pub use alloy_core as types;

/// Material property declaration and storage (`alloy-property`).
pub use alloy_property as property;

/// The UserObject trait and dependency graph (`alloy-userobject`).
pub use alloy_userobject as userobject;

/// Per-problem state and the threaded engine (`alloy-engine`).
pub use alloy_engine as engine;

/// Element subdomain mutation (`alloy-modifier`).
///
/// [`modifier::SubdomainMutator`] is a UserObject; register it with the
/// engine like any other.
pub use alloy_modifier as modifier;

/// Common imports for typical Alloy usage.
///
/// ```rust
/// use alloy::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use alloy_core::{
        BoundaryId, Communicator, ElementId, ExecFlag, ExecFlags, FieldSystem, Mesh, NodeId,
        SubdomainId,
    };

    // Errors
    pub use alloy_core::{CollaboratorError, ExecutionError, UserObjectError};
    pub use alloy_engine::ConfigError;
    pub use alloy_modifier::MutationError;
    pub use alloy_property::PropertyError;
    pub use alloy_userobject::GraphError;

    // Properties
    pub use alloy_property::{PropertyHandle, PropertyRegistry, QpLayout, StatefulPropertyStore};

    // UserObjects
    pub use alloy_userobject::{
        join_as, Entity, EntityCategory, ExecuteContext, FinalizeContext, Restriction,
        UserObject, UserObjectValue,
    };

    // Engine
    pub use alloy_engine::{EngineConfig, ExecutionMetrics, Problem, ThreadedExecutionEngine};

    // Modifier
    pub use alloy_modifier::{
        FnPolicy, MovingBoundarySpec, ReinitStrategy, SubdomainMutator, SubdomainMutatorConfig,
        SubdomainPolicy, ThresholdPolicy,
    };
}
