//! Material property registry and stateful property storage.
//!
//! [`PropertyRegistry`] maps property names (with optional derivative
//! chains) to typed slots. [`StatefulPropertyStore`] holds the per-element,
//! per-qp values of those slots with current/old/older history, and
//! [`DerivativeTable`] declares a property together with its derivatives.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod derivative;
pub mod error;
pub mod layout;
pub mod registry;
pub mod store;

pub use derivative::{DerivativeTable, MAX_DERIVATIVE_ORDER};
pub use error::PropertyError;
pub use layout::QpLayout;
pub use registry::{PropertyHandle, PropertyKey, PropertyRegistry, PropertyValue};
pub use store::{StatefulInitializer, StatefulPropertyStore};
