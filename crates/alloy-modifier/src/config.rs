//! Subdomain mutator configuration.

use std::collections::BTreeSet;

use alloy_core::{BoundaryId, ExecFlag, ExecFlags, FieldSystem, Mesh, SubdomainId};

use crate::error::MutationError;
use crate::reinit::{self, ReinitStrategy, VariableReinit};

/// A configured moving boundary between two subdomains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovingBoundarySpec {
    /// Boundary name.
    pub name: String,
    /// Explicit boundary id. A fresh id is allocated when `None`.
    pub id: Option<BoundaryId>,
    /// Subdomain whose element sides carry the boundary.
    pub owner: SubdomainId,
    /// The other subdomain, or `None` for the owner's external boundary.
    pub other: Option<SubdomainId>,
}

impl MovingBoundarySpec {
    /// Boundary between `owner` and `other`, sides on `owner`.
    pub fn between(name: &str, owner: SubdomainId, other: SubdomainId) -> Self {
        Self {
            name: name.to_string(),
            id: None,
            owner,
            other: Some(other),
        }
    }

    /// The part of the external boundary touching `owner`.
    pub fn external(name: &str, owner: SubdomainId) -> Self {
        Self {
            name: name.to_string(),
            id: None,
            owner,
            other: None,
        }
    }

    /// Builder: fix the boundary id.
    pub fn with_id(mut self, id: BoundaryId) -> Self {
        self.id = Some(id);
        self
    }

    /// The other subdomain, with [`SubdomainId::INVALID`] for the external
    /// boundary.
    pub fn other_or_invalid(&self) -> SubdomainId {
        self.other.unwrap_or(SubdomainId::INVALID)
    }
}

/// Configuration for a [`SubdomainMutator`](crate::SubdomainMutator).
#[derive(Clone, Debug)]
pub struct SubdomainMutatorConfig {
    /// Moving boundaries known before the first mutation.
    pub moving_boundaries: Vec<MovingBoundarySpec>,
    /// Create a moving boundary for every new `(from, to)` pair.
    pub automatic_moving_boundaries: bool,
    /// Subdomains whose newly added elements are reinitialized.
    /// `[SubdomainId::ANY]` reinitializes every moved element.
    pub reinitialize_subdomains: Vec<SubdomainId>,
    /// Reinitialize elements moving between two reinitialized subdomains.
    pub old_subdomain_reinitialized: bool,
    /// Variables whose initial conditions are reapplied. Empty means all
    /// variables of the field system.
    pub reinitialize_variables: Vec<String>,
    /// One strategy for every reinitialized variable, or one per entry of
    /// `reinitialize_variables`.
    pub reinitialization_strategy: Vec<ReinitStrategy>,
    /// Restore nodal values that reinitialization overwrote on nodes
    /// shared with untouched elements. Empty restores nothing; otherwise
    /// one flag for every variable or one per variable.
    pub restore_overridden_dofs: Vec<bool>,
    /// Solve-loop points at which the mutator runs.
    pub execute_on: ExecFlags,
    /// Subdomains whose elements are considered. Empty means all.
    pub blocks: Vec<SubdomainId>,
}

impl Default for SubdomainMutatorConfig {
    fn default() -> Self {
        Self {
            moving_boundaries: Vec::new(),
            automatic_moving_boundaries: true,
            reinitialize_subdomains: vec![SubdomainId::ANY],
            old_subdomain_reinitialized: true,
            reinitialize_variables: Vec::new(),
            reinitialization_strategy: vec![ReinitStrategy::Ic],
            restore_overridden_dofs: Vec::new(),
            execute_on: ExecFlags::only(ExecFlag::TimestepBegin),
            blocks: Vec::new(),
        }
    }
}

impl SubdomainMutatorConfig {
    /// Whether moving into `id` triggers reinitialization.
    pub fn reinitializes(&self, id: SubdomainId) -> bool {
        self.reinitialize_subdomains
            .iter()
            .any(|s| *s == id || *s == SubdomainId::ANY)
    }

    /// Whether every moved element is reinitialized.
    pub fn reinitializes_any(&self) -> bool {
        self.reinitialize_subdomains.contains(&SubdomainId::ANY)
    }

    /// Check the configuration against the problem it will run on.
    pub fn validate(
        &self,
        mutator: &str,
        mesh: &dyn Mesh,
        fields: &dyn FieldSystem,
    ) -> Result<(), MutationError> {
        if self.execute_on.is_empty() {
            return Err(MutationError::config(mutator, "execute_on is empty"));
        }
        if !self.old_subdomain_reinitialized {
            if self.reinitialize_subdomains.is_empty() {
                return Err(MutationError::config(
                    mutator,
                    "old_subdomain_reinitialized = false needs a non-empty \
                     reinitialize_subdomains list",
                ));
            }
            let listed: BTreeSet<_> = self.reinitialize_subdomains.iter().copied().collect();
            if self.reinitializes_any() || listed == mesh.subdomains() {
                return Err(MutationError::config(
                    mutator,
                    "old_subdomain_reinitialized = false cannot be combined with \
                     reinitializing every subdomain",
                ));
            }
        }
        for var in &self.reinitialize_variables {
            if !fields.has_variable(var) {
                return Err(MutationError::config(
                    mutator,
                    format!("reinitialize variable '{var}' does not exist"),
                ));
            }
        }
        self.reinit_plan(mutator, fields)?;
        for spec in &self.moving_boundaries {
            if !spec.owner.is_valid() {
                return Err(MutationError::config(
                    mutator,
                    format!("moving boundary '{}' has no owning subdomain", spec.name),
                ));
            }
            if spec.other == Some(spec.owner) {
                return Err(MutationError::config(
                    mutator,
                    format!(
                        "moving boundary '{}' lies between subdomain {} and itself",
                        spec.name, spec.owner
                    ),
                ));
            }
            if spec.id == Some(BoundaryId::INVALID) {
                return Err(MutationError::config(
                    mutator,
                    format!("moving boundary '{}' uses the invalid boundary id", spec.name),
                ));
            }
        }
        Ok(())
    }

    /// Variables to reinitialize.
    pub fn ic_variables(&self, fields: &dyn FieldSystem) -> Vec<String> {
        if self.reinitialize_variables.is_empty() {
            fields.variable_names()
        } else {
            self.reinitialize_variables.clone()
        }
    }

    /// Strategy and restore flag of every variable to reinitialize.
    pub fn reinit_plan(
        &self,
        mutator: &str,
        fields: &dyn FieldSystem,
    ) -> Result<Vec<VariableReinit>, MutationError> {
        reinit::resolve(
            mutator,
            &self.ic_variables(fields),
            &self.reinitialization_strategy,
            &self.restore_overridden_dofs,
        )
    }
}
