//! Property-specific error types.

use std::error::Error;
use std::fmt;

use alloy_core::{ElementId, PropertyId};

/// Errors from property declaration, lookup and storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyError {
    /// The property was already declared with another value type or by
    /// another owner.
    DuplicateDeclaration {
        /// Canonical property name.
        name: String,
        /// Owner of the existing declaration.
        existing_owner: String,
        /// Value type of the existing declaration.
        existing_type: &'static str,
        /// Owner attempting the new declaration.
        owner: String,
        /// Value type of the new declaration.
        requested_type: &'static str,
    },
    /// No property with this name was declared.
    UnknownProperty {
        /// Canonical property name.
        name: String,
        /// Object that requested the property, if known.
        requested_by: Option<String>,
    },
    /// The property exists with a different value type.
    TypeMismatch {
        /// Canonical property name.
        name: String,
        /// Declared value type.
        declared: &'static str,
        /// Value type of the lookup.
        requested: &'static str,
    },
    /// Old or older state was read before any history exists.
    UninitializedState {
        /// Canonical property name.
        name: String,
        /// Element whose state was read.
        element: ElementId,
    },
    /// History was requested for a property not marked stateful.
    NotStateful {
        /// Canonical property name.
        name: String,
    },
    /// Quadrature point index beyond the element's qp count.
    QpOutOfRange {
        /// Canonical property name.
        name: String,
        /// Element being accessed.
        element: ElementId,
        /// Requested qp index.
        qp: usize,
        /// Number of qps on the element.
        n_qp: usize,
    },
    /// The registry no longer accepts declarations.
    RegistrySealed {
        /// Canonical property name of the rejected declaration.
        name: String,
    },
    /// Reinitialization needs an initializer that was never registered.
    NoInitializer {
        /// Canonical property name.
        name: String,
    },
    /// The handle does not belong to this registry or store.
    InvalidHandle {
        /// The offending id.
        id: PropertyId,
    },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateDeclaration {
                name,
                existing_owner,
                existing_type,
                owner,
                requested_type,
            } => write!(
                f,
                "property '{name}' declared by '{owner}' as {requested_type} \
                 but already declared by '{existing_owner}' as {existing_type}"
            ),
            Self::UnknownProperty { name, requested_by } => {
                write!(f, "unknown property '{name}'")?;
                if let Some(who) = requested_by {
                    write!(f, " (requested by '{who}')")?;
                }
                Ok(())
            }
            Self::TypeMismatch {
                name,
                declared,
                requested,
            } => write!(
                f,
                "property '{name}' is declared as {declared}, requested as {requested}"
            ),
            Self::UninitializedState { name, element } => {
                write!(f, "property '{name}' has no history on element {element}")
            }
            Self::NotStateful { name } => write!(f, "property '{name}' is not stateful"),
            Self::QpOutOfRange {
                name,
                element,
                qp,
                n_qp,
            } => write!(
                f,
                "property '{name}': qp {qp} out of range on element {element} ({n_qp} qps)"
            ),
            Self::RegistrySealed { name } => {
                write!(f, "cannot declare '{name}': property registry is sealed")
            }
            Self::NoInitializer { name } => {
                write!(f, "property '{name}' has no stateful initializer")
            }
            Self::InvalidHandle { id } => write!(f, "invalid property handle {id}"),
        }
    }
}

impl Error for PropertyError {}
