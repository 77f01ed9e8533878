//! Core types and traits for the Alloy finite-element engine.
//!
//! This is the leaf crate of the workspace. It defines the vocabulary the
//! other crates share: element, node, subdomain and property ids with
//! their sentinel values, execute-on flags, the error types raised while
//! running UserObjects, and the collaborator traits (`Mesh`,
//! `FieldSystem`, `Communicator`) through which the engine talks to the
//! surrounding framework.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod exec;
pub mod id;
pub mod traits;

pub use error::{CollaboratorError, ExecutionError, UserObjectError};
pub use exec::{ExecFlag, ExecFlags};
pub use id::{BoundaryId, ElementId, NodeId, PropertyId, Side, SubdomainId, ThreadIndex};
pub use traits::{Communicator, FieldSystem, Mesh, SerialCommunicator, SideNeighbor};
