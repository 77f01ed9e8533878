//! Test utilities and mock collaborators for Alloy development.
//!
//! Provides an in-memory structured [`GridMesh`] implementing
//! [`Mesh`](alloy_core::Mesh), a [`RecordingFieldSystem`] that logs
//! every collaborator call, and fixture UserObjects in [`fixtures`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fields;
pub mod fixtures;
pub mod mesh;

pub use fields::{ExtrapolationCall, InitialConditionCall, RecordingFieldSystem};
pub use fixtures::{
    ElementAverage, ElementSum, EntityRecorder, FailingUserObject, FailureMode, StaticValues,
    SumSource,
};
pub use mesh::GridMesh;
