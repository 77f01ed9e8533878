//! Errors raised while moving elements between subdomains.

use std::error::Error;
use std::fmt;

use alloy_core::{BoundaryId, CollaboratorError, ElementId, SubdomainId, UserObjectError};
use alloy_property::PropertyError;

/// Failure of a subdomain mutation.
///
/// Everything after collection is fatal for the pass: the mesh may
/// already be partially updated and nothing is rolled back.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationError {
    /// Two thread copies assigned different targets to one element.
    ConflictingAssignment {
        /// The element with conflicting assignments.
        element: ElementId,
        /// Target recorded first.
        first: SubdomainId,
        /// Target recorded second.
        second: SubdomainId,
    },
    /// The mesh rejected a subdomain or boundary update.
    MeshUpdate {
        /// Name of the mutator.
        mutator: String,
        /// The underlying collaborator failure.
        source: CollaboratorError,
    },
    /// Fields or stateful properties could not be reinitialized.
    Reinitialization {
        /// Name of the mutator.
        mutator: String,
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A configured moving boundary id already names a boundary of the
    /// mesh that the mutator does not own.
    BoundaryIdInUse {
        /// Name of the mutator.
        mutator: String,
        /// Name of the configured moving boundary.
        name: String,
        /// The requested id.
        boundary: BoundaryId,
    },
    /// The mutator configuration is inconsistent with the problem.
    InvalidConfig {
        /// Name of the mutator.
        mutator: String,
        /// What is wrong.
        reason: String,
    },
}

impl MutationError {
    pub(crate) fn mesh(mutator: &str, source: CollaboratorError) -> Self {
        Self::MeshUpdate {
            mutator: mutator.to_string(),
            source,
        }
    }

    pub(crate) fn reinit(mutator: &str, reason: impl fmt::Display) -> Self {
        Self::Reinitialization {
            mutator: mutator.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn config(mutator: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidConfig {
            mutator: mutator.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn from_property(mutator: &str, e: PropertyError) -> Self {
        Self::reinit(mutator, e)
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictingAssignment {
                element,
                first,
                second,
            } => write!(
                f,
                "element {element} assigned to both subdomain {first} and subdomain {second}"
            ),
            Self::MeshUpdate { mutator, source } => {
                write!(f, "'{mutator}' could not update the mesh: {source}")
            }
            Self::Reinitialization { mutator, reason } => {
                write!(f, "'{mutator}' could not reinitialize moved elements: {reason}")
            }
            Self::BoundaryIdInUse {
                mutator,
                name,
                boundary,
            } => write!(
                f,
                "'{mutator}' cannot use boundary id {boundary} for moving boundary '{name}': \
                 the mesh already has a boundary with that id"
            ),
            Self::InvalidConfig { mutator, reason } => {
                write!(f, "invalid configuration for '{mutator}': {reason}")
            }
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MeshUpdate { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<MutationError> for UserObjectError {
    fn from(e: MutationError) -> Self {
        match e {
            MutationError::ConflictingAssignment {
                element,
                first,
                second,
            } => UserObjectError::ConflictingAssignment {
                element,
                first,
                second,
            },
            MutationError::MeshUpdate { source, .. } => UserObjectError::Collaborator(source),
            other => UserObjectError::failed(other),
        }
    }
}
