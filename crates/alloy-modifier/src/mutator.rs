//! The [`SubdomainMutator`] UserObject.
//!
//! One pass moves elements between subdomains in four phases:
//!
//! 1. **Collecting** (`execute`, worker threads): ask the policy for every
//!    element in scope and record real changes.
//! 2. **Validating** (`finalize`): reduce the move count across ranks and
//!    make sure every moved pair has a moving boundary.
//! 3. **Applying**: move the elements and their refinement ancestors,
//!    then rebuild the moving boundary sides around them.
//! 4. **Reinitializing**: reallocate the equation systems and reseed
//!    fields and stateful properties on the minimal element range only.
//!
//! The mesh is never modified while it is being iterated: changes are
//! collected first and applied from `finalize` on the calling thread.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use alloy_core::{
    BoundaryId, CollaboratorError, ElementId, ExecFlags, FieldSystem, Mesh, NodeId, Side,
    SubdomainId, UserObjectError,
};
use alloy_userobject::{
    join_as, Entity, EntityCategory, ExecuteContext, FinalizeContext, Restriction, UserObject,
    UserObjectValue,
};

use crate::assignment::{ElementSubdomainAssignment, SubdomainChange};
use crate::boundary::MovingBoundaryRegistry;
use crate::config::SubdomainMutatorConfig;
use crate::error::MutationError;
use crate::policy::SubdomainPolicy;
use crate::reinit::{self as strategy, VariableReinit};

/// Phase of the current mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutatorState {
    /// Between passes.
    Idle,
    /// Recording per-element targets.
    Collecting,
    /// Reducing the assignment and registering moving boundaries.
    Validating,
    /// Updating subdomains and boundary sides on the mesh.
    Applying,
    /// Reseeding fields and stateful properties.
    Reinitializing,
}

/// An `(element, side, boundary)` entry of a side set.
pub type BoundarySide = (ElementId, Side, BoundaryId);

/// What the last completed mutation did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// Elements that changed subdomain, ascending.
    pub moved: Vec<ElementId>,
    /// Elements whose fields and stateful properties were reseeded.
    pub reinitialized_elements: Vec<ElementId>,
    /// Boundary nodes whose fields were reseeded.
    pub reinitialized_nodes: Vec<NodeId>,
    /// Moving boundary sides detached from the mesh.
    pub removed_sides: Vec<BoundarySide>,
    /// Moving boundary sides attached to the mesh.
    pub added_sides: Vec<BoundarySide>,
    /// Whether this was the revert of a repeated time step.
    pub restep: bool,
}

/// Moves elements between subdomains as decided by a [`SubdomainPolicy`].
#[derive(Clone)]
pub struct SubdomainMutator {
    name: String,
    config: SubdomainMutatorConfig,
    plan: Vec<VariableReinit>,
    policy: Arc<dyn SubdomainPolicy>,
    // Target ids already reported as unknown to the mesh, shared by all
    // thread copies.
    warned: Arc<Mutex<BTreeSet<SubdomainId>>>,
    known: Option<BTreeSet<SubdomainId>>,
    assignment: ElementSubdomainAssignment,
    registry: MovingBoundaryRegistry,
    state: MutatorState,
    last_moved: ElementSubdomainAssignment,
    last_step: Option<u64>,
    modified_this_step: bool,
    report: MutationReport,
}

impl SubdomainMutator {
    /// Validate `config` against the problem and register the configured
    /// moving boundaries.
    pub fn new(
        name: &str,
        config: SubdomainMutatorConfig,
        policy: impl SubdomainPolicy + 'static,
        mesh: &dyn Mesh,
        fields: &dyn FieldSystem,
    ) -> Result<Self, MutationError> {
        config.validate(name, mesh, fields)?;
        let plan = config.reinit_plan(name, fields)?;
        let mut registry = MovingBoundaryRegistry::new(name);
        for spec in &config.moving_boundaries {
            registry.register(
                &spec.name,
                spec.id,
                spec.owner,
                spec.other_or_invalid(),
                mesh,
            )?;
        }
        info!(
            "subdomain mutator '{name}' ready: {} moving boundaries, reinitializing {:?}",
            registry.len(),
            config.reinitialize_subdomains
        );
        Ok(Self {
            name: name.to_string(),
            config,
            plan,
            policy: Arc::new(policy),
            warned: Arc::new(Mutex::new(BTreeSet::new())),
            known: None,
            assignment: ElementSubdomainAssignment::new(),
            registry,
            state: MutatorState::Idle,
            last_moved: ElementSubdomainAssignment::new(),
            last_step: None,
            modified_this_step: false,
            report: MutationReport::default(),
        })
    }

    /// Current phase.
    pub fn state(&self) -> MutatorState {
        self.state
    }

    /// The configuration.
    pub fn config(&self) -> &SubdomainMutatorConfig {
        &self.config
    }

    /// Strategy and restore flag of every reinitialized variable.
    pub fn reinit_plan(&self) -> &[VariableReinit] {
        &self.plan
    }

    /// Moving boundaries registered so far.
    pub fn registry(&self) -> &MovingBoundaryRegistry {
        &self.registry
    }

    /// Changes collected in the current pass.
    pub fn assignment(&self) -> &ElementSubdomainAssignment {
        &self.assignment
    }

    /// Summary of the last mutation.
    pub fn last_report(&self) -> &MutationReport {
        &self.report
    }

    /// Target ids that were reported as unknown to the mesh.
    pub fn warned_subdomains(&self) -> Vec<SubdomainId> {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn warn_if_unknown(&mut self, target: SubdomainId, mesh: &dyn Mesh) {
        let known = self.known.get_or_insert_with(|| mesh.subdomains());
        if known.contains(&target) {
            return;
        }
        let mut warned = self.warned.lock().unwrap_or_else(PoisonError::into_inner);
        if warned.insert(target) {
            warn!(
                "'{}' moves elements into subdomain {target}, which the mesh does not have yet",
                self.name
            );
        }
    }

    // ── Reinitialization range ─────────────────────────────────────

    fn needs_reinit(&self, change: &SubdomainChange) -> bool {
        if self.config.reinitializes_any() {
            return true;
        }
        if !self.config.reinitializes(change.to) {
            return false;
        }
        self.config.old_subdomain_reinitialized || !self.config.reinitializes(change.from)
    }

    /// A node is new to the reinitialized region when no element around
    /// it belongs to a reinitialized subdomain yet.
    fn node_is_new(&self, node: NodeId, mesh: &dyn Mesh) -> bool {
        mesh.elements_of_node(node).into_iter().all(|e| {
            mesh.subdomain_of(e)
                .map_or(true, |s| !self.config.reinitializes(s))
        })
    }

    /// Elements and nodes to reseed, computed on the mesh before the move.
    fn reinitialized_range(
        &self,
        moved: &ElementSubdomainAssignment,
        mesh: &dyn Mesh,
    ) -> (Vec<ElementId>, Vec<NodeId>) {
        let mut elems = Vec::new();
        let mut nodes = BTreeSet::new();
        for (elem, change) in moved.iter() {
            if !self.needs_reinit(&change) {
                continue;
            }
            elems.push(elem);
            for node in mesh.nodes_of(elem) {
                if self.node_is_new(node, mesh) {
                    nodes.insert(node);
                }
            }
        }
        (elems, nodes.into_iter().collect())
    }

    // ── Moving boundaries ──────────────────────────────────────────

    /// Sides to detach and attach, computed on the mesh after the move.
    fn boundary_changes(
        &self,
        moved: &ElementSubdomainAssignment,
        mesh: &dyn Mesh,
    ) -> (BTreeSet<BoundarySide>, BTreeSet<BoundarySide>) {
        let mut removed = BTreeSet::new();
        let mut added = BTreeSet::new();
        for elem in moved.elements() {
            for (side, bid) in mesh.boundary_sides_of(elem) {
                if self.registry.is_moving(bid) {
                    removed.insert((elem, side, bid));
                }
            }
            let Some(elem_sub) = mesh.subdomain_of(elem) else {
                continue;
            };
            for face in mesh.neighbors_of(elem) {
                let Some((neighbor, neighbor_side)) = face.neighbor else {
                    if let Some(bid) = self.registry.side_boundary(elem_sub, SubdomainId::INVALID)
                    {
                        added.insert((elem, face.side, bid));
                    }
                    continue;
                };
                let Some(neighbor_sub) = mesh.subdomain_of(neighbor) else {
                    continue;
                };
                if let Some(bid) = self.registry.side_boundary(elem_sub, neighbor_sub) {
                    added.insert((elem, face.side, bid));
                }
                for (side, bid) in mesh.boundary_sides_of(neighbor) {
                    if side == neighbor_side && self.registry.is_moving(bid) {
                        removed.insert((neighbor, side, bid));
                    }
                }
                if let Some(bid) = self.registry.side_boundary(neighbor_sub, elem_sub) {
                    added.insert((neighbor, neighbor_side, bid));
                }
            }
        }
        (removed, added)
    }

    // ── Field reseeding ────────────────────────────────────────────

    /// Apply each variable's strategy on the reinitialized range. Nodal
    /// values shared with untouched elements are saved first and put back
    /// afterwards for variables that ask for it.
    fn reseed_fields(
        &self,
        elems: &[ElementId],
        nodes: &[NodeId],
        ctx: &mut FinalizeContext<'_>,
    ) -> Result<(), MutationError> {
        let name = &self.name;
        let mut saved = Vec::new();
        for var in self.plan.iter().filter(|v| v.restore_overridden) {
            let shared = strategy::overridden_nodes(&var.variable, elems, ctx.mesh(), ctx.fields());
            let values = ctx
                .fields()
                .nodal_values(&var.variable, &shared)
                .map_err(|e| MutationError::reinit(name, e))?;
            saved.push((var.variable.as_str(), shared, values));
        }

        let ic_vars: Vec<String> = self
            .plan
            .iter()
            .filter(|v| !v.strategy.is_polynomial())
            .map(|v| v.variable.clone())
            .collect();
        if !ic_vars.is_empty() {
            ctx.fields_mut()
                .apply_initial_condition(&ic_vars, elems, nodes)
                .map_err(|e| MutationError::reinit(name, e))?;
        }
        for var in self.plan.iter().filter(|v| v.strategy.is_polynomial()) {
            let patch = strategy::patch_elements(
                name,
                &var.variable,
                var.strategy,
                elems,
                ctx.mesh(),
                ctx.fields(),
            )?;
            debug!(
                "'{name}' extrapolating '{}' from {} patch elements",
                var.variable,
                patch.len()
            );
            ctx.fields_mut()
                .extrapolate_polynomial(&var.variable, &patch, elems, nodes)
                .map_err(|e| MutationError::reinit(name, e))?;
        }

        for (var, shared, values) in saved {
            ctx.fields_mut()
                .set_nodal_values(var, &shared, &values)
                .map_err(|e| MutationError::reinit(name, e))?;
        }
        Ok(())
    }

    // ── Mutation ───────────────────────────────────────────────────

    fn modify(
        &mut self,
        moved: ElementSubdomainAssignment,
        restep: bool,
        ctx: &mut FinalizeContext<'_>,
    ) -> Result<(), MutationError> {
        let name = self.name.clone();
        if !restep {
            self.last_moved = moved.clone();
        }

        self.state = MutatorState::Validating;
        let total = ctx
            .comm()
            .gather_sum_u64(moved.len() as u64)
            .map_err(|e| MutationError::mesh(&name, e))?;
        if total == 0 {
            debug!("'{name}' found no elements to move");
            self.report = MutationReport {
                restep,
                ..MutationReport::default()
            };
            self.state = MutatorState::Idle;
            return Ok(());
        }
        if self.config.automatic_moving_boundaries {
            for (_, change) in moved.iter() {
                self.registry
                    .ensure(change.from, change.to, change.to, ctx.mesh())?;
            }
        }
        self.registry.name_on(ctx.mesh_mut());

        let (reinit_elems, reinit_nodes) = if restep {
            (Vec::new(), Vec::new())
        } else {
            self.reinitialized_range(&moved, ctx.mesh())
        };

        self.state = MutatorState::Applying;
        {
            let mesh = ctx.mesh_mut();
            for (elem, change) in moved.iter() {
                mesh.change_element_subdomain(elem, change.to)
                    .map_err(|e| MutationError::mesh(&name, e))?;
                for ancestor in mesh.ancestors_of(elem) {
                    mesh.change_element_subdomain(ancestor, change.to)
                        .map_err(|e| MutationError::mesh(&name, e))?;
                }
            }
        }
        let (removed, added) = self.boundary_changes(&moved, ctx.mesh());
        {
            let mesh = ctx.mesh_mut();
            for &(elem, side, bid) in &removed {
                mesh.remove_boundary_side(elem, side, bid)
                    .map_err(|e| MutationError::mesh(&name, e))?;
            }
            for &(elem, side, bid) in &added {
                mesh.add_boundary_side(elem, side, bid)
                    .map_err(|e| MutationError::mesh(&name, e))?;
            }
            for bid in self.registry.ids() {
                mesh.sync_boundary_nodes(bid)
                    .map_err(|e| MutationError::mesh(&name, e))?;
            }
        }
        debug!(
            "'{name}' moving boundaries: {} sides removed, {} added",
            removed.len(),
            added.len()
        );

        self.state = MutatorState::Reinitializing;
        ctx.fields_mut()
            .reinitialize_equation_systems()
            .map_err(|e| MutationError::reinit(&name, e))?;
        let reinit_nodes = on_any_boundary(reinit_nodes, ctx.mesh());
        if !restep && !(reinit_elems.is_empty() && reinit_nodes.is_empty()) {
            self.reseed_fields(&reinit_elems, &reinit_nodes, ctx)?;
            ctx.fields_mut()
                .set_old_solutions(&reinit_elems, &reinit_nodes)
                .map_err(|e| MutationError::reinit(&name, e))?;
            ctx.properties_mut()
                .reinit_all_stateful(&reinit_elems)
                .map_err(|e| MutationError::from_property(&name, e))?;
        }
        if !restep {
            self.modified_this_step = true;
        }

        info!(
            "'{name}' moved {total} elements, reinitialized {} elements and {} nodes",
            reinit_elems.len(),
            reinit_nodes.len()
        );
        self.report = MutationReport {
            moved: moved.elements(),
            reinitialized_elements: reinit_elems,
            reinitialized_nodes: reinit_nodes,
            removed_sides: removed.into_iter().collect(),
            added_sides: added.into_iter().collect(),
            restep,
        };
        self.state = MutatorState::Idle;
        Ok(())
    }
}

fn on_any_boundary(nodes: Vec<NodeId>, mesh: &dyn Mesh) -> Vec<NodeId> {
    let boundaries = mesh.boundary_ids();
    nodes
        .into_iter()
        .filter(|n| boundaries.iter().any(|b| mesh.is_boundary_node(*n, *b)))
        .collect()
}

impl UserObject for SubdomainMutator {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> EntityCategory {
        EntityCategory::Element
    }

    fn restriction(&self) -> Restriction {
        Restriction::blocks(self.config.blocks.iter().copied())
    }

    fn execute_on(&self) -> ExecFlags {
        self.config.execute_on
    }

    fn clone_for_thread(&self) -> Box<dyn UserObject> {
        Box::new(self.clone())
    }

    fn initialize(&mut self) {
        self.assignment.clear();
        self.known = None;
        self.state = MutatorState::Collecting;
    }

    fn execute(&mut self, entity: &Entity, ctx: &ExecuteContext<'_>) -> Result<(), UserObjectError> {
        let Entity::Element(elem) = *entity else {
            return Ok(());
        };
        let current = ctx
            .mesh()
            .subdomain_of(elem)
            .ok_or(CollaboratorError::UnknownElement { element: elem })?;
        let target = self.policy.compute_subdomain_id(elem, current, ctx)?;
        if target == current || target == SubdomainId::INVALID {
            return Ok(());
        }
        self.warn_if_unknown(target, ctx.mesh());
        self.assignment.record(elem, current, target)?;
        Ok(())
    }

    fn thread_join(&mut self, other: &dyn UserObject) -> Result<(), UserObjectError> {
        let other = join_as::<Self>(&self.name, other)?;
        self.assignment.merge(&other.assignment)?;
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut FinalizeContext<'_>) -> Result<(), UserObjectError> {
        let mut moved = std::mem::take(&mut self.assignment);
        moved.sort();
        self.modify(moved, false, ctx)?;
        Ok(())
    }

    fn value(&self) -> Option<UserObjectValue> {
        Some(UserObjectValue::Scalar(self.report.moved.len() as f64))
    }

    /// Reverts the last mutation when a time step is repeated.
    fn timestep_setup(
        &mut self,
        time_step: u64,
        ctx: &mut FinalizeContext<'_>,
    ) -> Result<(), UserObjectError> {
        if self.last_step == Some(time_step) && self.modified_this_step {
            info!(
                "'{}' restoring element subdomain changes for repeated step {time_step}",
                self.name
            );
            let reverted = self.last_moved.reversed();
            self.modify(reverted, true, ctx)?;
        }
        self.last_step = Some(time_step);
        self.modified_this_step = false;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for SubdomainMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubdomainMutator")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pending", &self.assignment.len())
            .field("moving_boundaries", &self.registry.len())
            .field("last_step", &self.last_step)
            .finish()
    }
}
