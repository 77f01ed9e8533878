//! Contexts handed to UserObjects during a pass.
//!
//! [`ExecuteContext`] is shared by all worker threads and is read-only.
//! [`FinalizeContext`] is created once, on the calling thread, and grants
//! mutable access to the collaborators for `finalize` and
//! `timestep_setup`.

use alloy_core::{Communicator, ExecFlag, ExecutionError, FieldSystem, Mesh, ThreadIndex};
use alloy_property::{PropertyRegistry, StatefulPropertyStore};

use crate::userobject::UserObjectValue;

/// Read access to values published by finalized UserObjects.
pub trait ValueLookup: Sync {
    /// Value published by `object` in the current pass sequence.
    ///
    /// Fails with [`ExecutionError::NotFinalized`] when the producer has
    /// not finalized yet or its pass was aborted, and with
    /// [`ExecutionError::UnknownUserObject`] for unknown names.
    fn value(&self, object: &str) -> Result<&UserObjectValue, ExecutionError>;
}

/// Everything a thread copy may read while executing.
pub struct ExecuteContext<'a> {
    mesh: &'a dyn Mesh,
    fields: &'a dyn FieldSystem,
    registry: &'a PropertyRegistry,
    properties: &'a StatefulPropertyStore,
    values: &'a dyn ValueLookup,
    thread: ThreadIndex,
    flag: ExecFlag,
}

impl<'a> ExecuteContext<'a> {
    /// Construct a new execute context.
    ///
    /// Typically called by the engine. For testing, construct with the
    /// in-memory collaborators from `alloy-test-utils`.
    pub fn new(
        mesh: &'a dyn Mesh,
        fields: &'a dyn FieldSystem,
        registry: &'a PropertyRegistry,
        properties: &'a StatefulPropertyStore,
        values: &'a dyn ValueLookup,
        thread: ThreadIndex,
        flag: ExecFlag,
    ) -> Self {
        Self {
            mesh,
            fields,
            registry,
            properties,
            values,
            thread,
            flag,
        }
    }

    /// The mesh.
    pub fn mesh(&self) -> &dyn Mesh {
        self.mesh
    }

    /// The solution fields.
    pub fn fields(&self) -> &dyn FieldSystem {
        self.fields
    }

    /// The property registry.
    pub fn registry(&self) -> &PropertyRegistry {
        self.registry
    }

    /// Material property values.
    pub fn properties(&self) -> &StatefulPropertyStore {
        self.properties
    }

    /// Published value of another object.
    pub fn value(&self, object: &str) -> Result<&UserObjectValue, ExecutionError> {
        self.values.value(object)
    }

    /// Index of the worker thread running this copy.
    pub fn thread(&self) -> ThreadIndex {
        self.thread
    }

    /// The execute-on flag of the current pass.
    pub fn flag(&self) -> ExecFlag {
        self.flag
    }
}

/// Mutable collaborator access for the serial phases of a pass.
pub struct FinalizeContext<'a> {
    mesh: &'a mut dyn Mesh,
    fields: &'a mut dyn FieldSystem,
    registry: &'a PropertyRegistry,
    properties: &'a mut StatefulPropertyStore,
    comm: &'a dyn Communicator,
    values: &'a dyn ValueLookup,
    flag: Option<ExecFlag>,
}

impl<'a> FinalizeContext<'a> {
    /// Construct a new finalize context. `flag` is `None` outside an
    /// execution pass (time step setup).
    pub fn new(
        mesh: &'a mut dyn Mesh,
        fields: &'a mut dyn FieldSystem,
        registry: &'a PropertyRegistry,
        properties: &'a mut StatefulPropertyStore,
        comm: &'a dyn Communicator,
        values: &'a dyn ValueLookup,
        flag: Option<ExecFlag>,
    ) -> Self {
        Self {
            mesh,
            fields,
            registry,
            properties,
            comm,
            values,
            flag,
        }
    }

    /// The mesh.
    pub fn mesh(&self) -> &dyn Mesh {
        &*self.mesh
    }

    /// The mesh, for topology and subdomain updates.
    pub fn mesh_mut(&mut self) -> &mut dyn Mesh {
        &mut *self.mesh
    }

    /// The solution fields.
    pub fn fields(&self) -> &dyn FieldSystem {
        &*self.fields
    }

    /// The solution fields, for reinitialization.
    pub fn fields_mut(&mut self) -> &mut dyn FieldSystem {
        &mut *self.fields
    }

    /// The property registry.
    pub fn registry(&self) -> &PropertyRegistry {
        self.registry
    }

    /// Material property values.
    pub fn properties(&self) -> &StatefulPropertyStore {
        &*self.properties
    }

    /// Material property values, for reinitialization.
    pub fn properties_mut(&mut self) -> &mut StatefulPropertyStore {
        &mut *self.properties
    }

    /// Cross-process collectives.
    pub fn comm(&self) -> &dyn Communicator {
        self.comm
    }

    /// Published value of another object.
    pub fn value(&self, object: &str) -> Result<&UserObjectValue, ExecutionError> {
        self.values.value(object)
    }

    /// The execute-on flag of the current pass, if any.
    pub fn flag(&self) -> Option<ExecFlag> {
        self.flag
    }
}
