//! Per-problem state shared by every pass.
//!
//! A [`Problem`] owns the mesh, the solution fields, the communicator and
//! the material property data. There is no global scratch state: two
//! problems in one process never share storage.

use log::info;

use alloy_core::{Communicator, FieldSystem, Mesh, SerialCommunicator};
use alloy_property::{PropertyRegistry, QpLayout, StatefulPropertyStore};

use crate::config::ConfigError;

/// Collaborators and material property data of one simulation.
///
/// `M` and `F` stay concrete so callers keep typed access to their mesh
/// and field implementations; the engine only sees them as trait objects.
pub struct Problem<M: Mesh, F: FieldSystem> {
    pub(crate) mesh: M,
    pub(crate) fields: F,
    pub(crate) comm: Box<dyn Communicator>,
    pub(crate) registry: PropertyRegistry,
    pub(crate) properties: StatefulPropertyStore,
}

impl<M: Mesh, F: FieldSystem> Problem<M, F> {
    /// Seal `registry` and allocate property storage with `layout`.
    ///
    /// Fails with [`ConfigError::Property`] when a requested property was
    /// never declared.
    pub fn new(
        mesh: M,
        fields: F,
        mut registry: PropertyRegistry,
        layout: QpLayout,
    ) -> Result<Self, ConfigError> {
        registry.seal()?;
        let properties = StatefulPropertyStore::new(&registry, layout);
        info!(
            "problem ready: {} elements, {} material properties ({} stateful)",
            mesh.active_elements().len(),
            registry.len(),
            registry.stateful_ids().len()
        );
        Ok(Self {
            mesh,
            fields,
            comm: Box::new(SerialCommunicator),
            registry,
            properties,
        })
    }

    /// Builder: replace the single-process communicator.
    pub fn with_communicator(mut self, comm: Box<dyn Communicator>) -> Self {
        self.comm = comm;
        self
    }

    /// The mesh.
    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    /// The mesh, for setup outside a pass.
    pub fn mesh_mut(&mut self) -> &mut M {
        &mut self.mesh
    }

    /// The solution fields.
    pub fn fields(&self) -> &F {
        &self.fields
    }

    /// The solution fields, for setup outside a pass.
    pub fn fields_mut(&mut self) -> &mut F {
        &mut self.fields
    }

    /// The communicator.
    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    /// The sealed property registry.
    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Material property values.
    pub fn properties(&self) -> &StatefulPropertyStore {
        &self.properties
    }

    /// Material property values, for material evaluation between passes.
    pub fn properties_mut(&mut self) -> &mut StatefulPropertyStore {
        &mut self.properties
    }
}

impl<M: Mesh + std::fmt::Debug, F: FieldSystem + std::fmt::Debug> std::fmt::Debug
    for Problem<M, F>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("mesh", &self.mesh)
            .field("fields", &self.fields)
            .field("ranks", &self.comm.size())
            .field("registry", &self.registry)
            .field("properties", &self.properties)
            .finish()
    }
}
