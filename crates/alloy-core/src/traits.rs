//! Collaborator traits: the mesh, the field system and the process
//! communicator the engine drives but does not own the implementation of.

use std::collections::BTreeSet;

use crate::error::CollaboratorError;
use crate::exec::ExecFlag;
use crate::id::{BoundaryId, ElementId, NodeId, Side, SubdomainId};

/// One face of an element and what lies across it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SideNeighbor {
    /// Local side index on the queried element.
    pub side: Side,
    /// The neighboring element and its side facing back, or `None` on the
    /// external boundary.
    pub neighbor: Option<(ElementId, Side)>,
}

/// Unstructured mesh access.
///
/// Element and node lists are returned in ascending id order; entity
/// partitioning relies on this to keep thread chunks deterministic.
/// Every mutating call bumps [`Mesh::revision`].
pub trait Mesh: Send + Sync {
    /// All active (leaf) elements.
    fn active_elements(&self) -> Vec<ElementId>;

    /// Active elements whose subdomain is `block`.
    fn elements_in_block(&self, block: SubdomainId) -> Vec<ElementId> {
        self.active_elements()
            .into_iter()
            .filter(|e| self.subdomain_of(*e) == Some(block))
            .collect()
    }

    /// Subdomain of an element, or `None` if the element does not exist.
    fn subdomain_of(&self, elem: ElementId) -> Option<SubdomainId>;

    /// Every subdomain present in the mesh.
    fn subdomains(&self) -> BTreeSet<SubdomainId>;

    /// Whether `id` is a subdomain of the mesh.
    fn has_subdomain(&self, id: SubdomainId) -> bool {
        self.subdomains().contains(&id)
    }

    /// Move an element to another subdomain.
    fn change_element_subdomain(
        &mut self,
        elem: ElementId,
        subdomain: SubdomainId,
    ) -> Result<(), CollaboratorError>;

    /// Refinement ancestors of an element, parent first. Empty for
    /// unrefined meshes.
    fn ancestors_of(&self, elem: ElementId) -> Vec<ElementId>;

    /// Every side of an element with its neighbor, in side order.
    fn neighbors_of(&self, elem: ElementId) -> Vec<SideNeighbor>;

    /// Boundary ids attached to the sides of an element.
    fn boundary_sides_of(&self, elem: ElementId) -> Vec<(Side, BoundaryId)>;

    /// All `(element, side)` pairs on a boundary, ascending.
    fn sides_on_boundary(&self, boundary: BoundaryId) -> Vec<(ElementId, Side)>;

    /// Every boundary id with at least one side or node.
    fn boundary_ids(&self) -> BTreeSet<BoundaryId>;

    /// Attach a boundary id to an element side. Adding an existing
    /// entry is a no-op.
    fn add_boundary_side(
        &mut self,
        elem: ElementId,
        side: Side,
        boundary: BoundaryId,
    ) -> Result<(), CollaboratorError>;

    /// Detach a boundary id from an element side. Removing a missing
    /// entry is a no-op.
    fn remove_boundary_side(
        &mut self,
        elem: ElementId,
        side: Side,
        boundary: BoundaryId,
    ) -> Result<(), CollaboratorError>;

    /// Nodes of an element.
    fn nodes_of(&self, elem: ElementId) -> Vec<NodeId>;

    /// Active elements sharing a node.
    fn elements_of_node(&self, node: NodeId) -> Vec<ElementId>;

    /// Whether a node belongs to the node set of `boundary`.
    fn is_boundary_node(&self, node: NodeId, boundary: BoundaryId) -> bool;

    /// Nodes in the node set of `boundary`, ascending.
    fn boundary_nodes(&self, boundary: BoundaryId) -> Vec<NodeId>;

    /// Nodes of all active elements, ascending.
    fn active_nodes(&self) -> Vec<NodeId>;

    /// Rebuild the node set of `boundary` from its side set.
    fn sync_boundary_nodes(&mut self, boundary: BoundaryId) -> Result<(), CollaboratorError>;

    /// Name a boundary (side set and node set).
    fn set_boundary_name(&mut self, boundary: BoundaryId, name: &str);

    /// Lowest boundary id not used by any side set, node set or boundary
    /// name. Ids above it may still be taken.
    fn next_free_boundary_id(&self) -> BoundaryId;

    /// Vertex average of an element, `None` for an unknown element.
    fn centroid(&self, elem: ElementId) -> Option<[f64; 3]>;

    /// Monotonic counter bumped on every topology or subdomain change.
    fn revision(&self) -> u64;
}

/// Solution fields and equation systems.
pub trait FieldSystem: Send + Sync {
    /// Names of every variable (nonlinear and auxiliary).
    fn variable_names(&self) -> Vec<String>;

    /// Whether a variable exists.
    fn has_variable(&self, name: &str) -> bool {
        self.variable_names().iter().any(|v| v == name)
    }

    /// Element-averaged value of a variable, if defined on the element.
    fn element_value(&self, var: &str, elem: ElementId) -> Option<f64>;

    /// Apply initial conditions of `vars` to exactly the given elements
    /// and nodes.
    fn apply_initial_condition(
        &mut self,
        vars: &[String],
        elems: &[ElementId],
        nodes: &[NodeId],
    ) -> Result<(), CollaboratorError>;

    /// Nodal values of `var`, one per entry of `nodes`.
    fn nodal_values(&self, var: &str, nodes: &[NodeId]) -> Result<Vec<f64>, CollaboratorError>;

    /// Overwrite nodal values of `var`. `values` pairs up with `nodes`.
    fn set_nodal_values(
        &mut self,
        var: &str,
        nodes: &[NodeId],
        values: &[f64],
    ) -> Result<(), CollaboratorError>;

    /// Fit a polynomial to `var` over the `patch` elements and evaluate it
    /// on the given elements and nodes.
    ///
    /// The default rejects the request; field systems without a fitter
    /// can only reinitialize from initial conditions.
    fn extrapolate_polynomial(
        &mut self,
        var: &str,
        patch: &[ElementId],
        elems: &[ElementId],
        nodes: &[NodeId],
    ) -> Result<(), CollaboratorError> {
        let _ = (patch, elems, nodes);
        Err(CollaboratorError::Field {
            reason: format!("no polynomial fitter for variable '{var}'"),
        })
    }

    /// Copy current solutions into old and older on the given range.
    fn set_old_solutions(
        &mut self,
        elems: &[ElementId],
        nodes: &[NodeId],
    ) -> Result<(), CollaboratorError>;

    /// Reallocate degree-of-freedom maps after a mesh change.
    fn reinitialize_equation_systems(&mut self) -> Result<(), CollaboratorError>;

    /// Compute auxiliary variables for an execute-on flag.
    fn compute_aux(&mut self, flag: ExecFlag) -> Result<(), CollaboratorError>;
}

/// Cross-process collectives.
pub trait Communicator: Send + Sync {
    /// Rank of this process.
    fn rank(&self) -> usize;

    /// Number of processes.
    fn size(&self) -> usize;

    /// Sum a scalar across all processes.
    fn gather_sum(&self, value: f64) -> Result<f64, CollaboratorError>;

    /// Sum a counter across all processes.
    fn gather_sum_u64(&self, value: u64) -> Result<u64, CollaboratorError>;

    /// Element-wise sum of a slice across all processes, in place.
    fn gather_sum_slice(&self, values: &mut [f64]) -> Result<(), CollaboratorError>;

    /// Overwrite `values` with the contents held by `root`.
    fn broadcast(&self, root: usize, values: &mut [f64]) -> Result<(), CollaboratorError>;

    /// Block until every process arrives.
    fn barrier(&self) -> Result<(), CollaboratorError>;
}

/// Single-process communicator: every collective is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn gather_sum(&self, value: f64) -> Result<f64, CollaboratorError> {
        Ok(value)
    }

    fn gather_sum_u64(&self, value: u64) -> Result<u64, CollaboratorError> {
        Ok(value)
    }

    fn gather_sum_slice(&self, _values: &mut [f64]) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn broadcast(&self, root: usize, _values: &mut [f64]) -> Result<(), CollaboratorError> {
        if root != 0 {
            return Err(CollaboratorError::Communication {
                reason: format!("broadcast root {root} out of range for 1 process"),
            });
        }
        Ok(())
    }

    fn barrier(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
