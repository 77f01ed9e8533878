//! Element subdomain modifiers for Alloy.
//!
//! A [`SubdomainMutator`] is a UserObject that moves elements between
//! subdomains while a simulation runs. A [`SubdomainPolicy`] picks the
//! target subdomain of each element; the mutator keeps moving boundaries
//! in a [`MovingBoundaryRegistry`] up to date and reseeds fields and
//! stateful material properties on the elements that need it, per
//! variable from initial conditions or a fitted polynomial
//! ([`ReinitStrategy`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod assignment;
pub mod boundary;
pub mod config;
pub mod error;
pub mod mutator;
pub mod policy;
pub mod reinit;

pub use assignment::{ElementSubdomainAssignment, SubdomainChange};
pub use boundary::{MovingBoundary, MovingBoundaryRegistry, SubdomainPair};
pub use config::{MovingBoundarySpec, SubdomainMutatorConfig};
pub use error::MutationError;
pub use mutator::{BoundarySide, MutationReport, MutatorState, SubdomainMutator};
pub use policy::{Criterion, FnPolicy, SubdomainPolicy, ThresholdPolicy};
pub use reinit::{ReinitStrategy, VariableReinit};
