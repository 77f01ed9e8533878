//! Error types shared by the execution stack.
//!
//! Organized by layer: collaborator failures (mesh, fields, communication),
//! failures raised by a single UserObject, and failures of a whole
//! execution pass as reported by the engine.

use std::error::Error;
use std::fmt;

use crate::exec::ExecFlag;
use crate::id::{ElementId, SubdomainId, ThreadIndex};

// ── Collaborators ──────────────────────────────────────────────────

/// Errors reported by the mesh, field-system or communicator collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The mesh rejected an update.
    Mesh {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The element is not part of the mesh.
    UnknownElement {
        /// The element that was looked up.
        element: ElementId,
    },
    /// The field system failed.
    Field {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A variable name is not known to the field system.
    UnknownVariable {
        /// The missing variable.
        name: String,
    },
    /// A collective operation failed.
    Communication {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mesh { reason } => write!(f, "mesh update failed: {reason}"),
            Self::UnknownElement { element } => write!(f, "element {element} is not in the mesh"),
            Self::Field { reason } => write!(f, "field system failed: {reason}"),
            Self::UnknownVariable { name } => write!(f, "unknown variable '{name}'"),
            Self::Communication { reason } => write!(f, "communication failed: {reason}"),
        }
    }
}

impl Error for CollaboratorError {}

// ── UserObject ─────────────────────────────────────────────────────

/// Errors raised by a single UserObject while executing, joining or
/// finalizing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserObjectError {
    /// The object's computation failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The object panicked on a worker thread.
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
    /// `thread_join` received a copy of a different concrete type.
    JoinTypeMismatch {
        /// Name of the receiving object.
        object: String,
    },
    /// Two thread copies assigned different targets to the same element.
    ConflictingAssignment {
        /// The element with conflicting assignments.
        element: ElementId,
        /// Target recorded by the receiving copy.
        first: SubdomainId,
        /// Target recorded by the joined copy.
        second: SubdomainId,
    },
    /// The published value of a dependency was not available.
    ValueUnavailable {
        /// Name of the dependency.
        object: String,
    },
    /// A collaborator call failed.
    Collaborator(CollaboratorError),
}

impl UserObjectError {
    /// Shorthand for [`UserObjectError::ExecutionFailed`] from any
    /// displayable cause.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::ExecutionFailed {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for UserObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::Panicked { message } => write!(f, "panicked: {message}"),
            Self::JoinTypeMismatch { object } => {
                write!(f, "'{object}' cannot join a thread copy of another type")
            }
            Self::ConflictingAssignment {
                element,
                first,
                second,
            } => write!(
                f,
                "element {element} assigned to both subdomain {first} and subdomain {second}"
            ),
            Self::ValueUnavailable { object } => {
                write!(f, "value of '{object}' is not available")
            }
            Self::Collaborator(e) => write!(f, "{e}"),
        }
    }
}

impl Error for UserObjectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Collaborator(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CollaboratorError> for UserObjectError {
    fn from(e: CollaboratorError) -> Self {
        Self::Collaborator(e)
    }
}

impl From<ExecutionError> for UserObjectError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::NotFinalized { object }
            | ExecutionError::UnknownUserObject { name: object } => {
                Self::ValueUnavailable { object }
            }
            other => Self::failed(other),
        }
    }
}

// ── Execution passes ───────────────────────────────────────────────

/// Errors from an execution pass over one or more UserObjects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    /// `execute` failed or panicked on a worker thread; the pass was
    /// abandoned before join and finalize.
    Aborted {
        /// Name of the failing object.
        object: String,
        /// Thread on which the failure happened.
        thread: ThreadIndex,
        /// The underlying failure.
        reason: UserObjectError,
    },
    /// `thread_join` or `finalize` failed.
    FinalizeFailed {
        /// Name of the failing object.
        object: String,
        /// The underlying failure.
        reason: UserObjectError,
    },
    /// A value was read before its producer finalized it, or after its
    /// producer's pass was aborted.
    NotFinalized {
        /// Name of the producing object.
        object: String,
    },
    /// No UserObject with this name is registered.
    UnknownUserObject {
        /// The requested name.
        name: String,
    },
    /// An object read the value of another object it did not declare as
    /// a dependency.
    UndeclaredDependency {
        /// The reading object.
        object: String,
        /// The object whose value was read.
        dependency: String,
    },
    /// The field system's auxiliary computation failed.
    AuxFailed {
        /// The execute-on flag being processed.
        flag: ExecFlag,
        /// The underlying failure.
        reason: CollaboratorError,
    },
    /// `timestep_setup` failed.
    SetupFailed {
        /// Name of the failing object.
        object: String,
        /// The underlying failure.
        reason: UserObjectError,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted {
                object,
                thread,
                reason,
            } => write!(f, "'{object}' aborted on thread {thread}: {reason}"),
            Self::FinalizeFailed { object, reason } => {
                write!(f, "'{object}' failed to finalize: {reason}")
            }
            Self::NotFinalized { object } => write!(f, "value of '{object}' is not finalized"),
            Self::UnknownUserObject { name } => write!(f, "no user object named '{name}'"),
            Self::UndeclaredDependency { object, dependency } => write!(
                f,
                "'{object}' read the value of '{dependency}' without declaring the dependency"
            ),
            Self::AuxFailed { flag, reason } => {
                write!(f, "aux computation on {flag} failed: {reason}")
            }
            Self::SetupFailed { object, reason } => {
                write!(f, "'{object}' failed timestep setup: {reason}")
            }
        }
    }
}

impl Error for ExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Aborted { reason, .. }
            | Self::FinalizeFailed { reason, .. }
            | Self::SetupFailed { reason, .. } => Some(reason),
            Self::AuxFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
