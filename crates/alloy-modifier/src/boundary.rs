//! Boundaries between subdomains that move with a mutation.
//!
//! A moving boundary is keyed by an unordered subdomain pair. Sides are
//! attached on the owner's side of the interface only. The pair
//! `(s, INVALID)` stands for the external boundary of subdomain `s`.
//! Entries are created lazily and never removed, so a pair keeps its
//! boundary id for the whole run even when the boundary becomes empty.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use log::{debug, info};

use alloy_core::{BoundaryId, Mesh, SubdomainId};

use crate::error::MutationError;

/// Unordered pair of subdomains, stored smallest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubdomainPair(SubdomainId, SubdomainId);

impl SubdomainPair {
    /// Normalize `(a, b)`.
    pub fn new(a: SubdomainId, b: SubdomainId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// The smaller subdomain id.
    pub fn low(&self) -> SubdomainId {
        self.0
    }

    /// The larger subdomain id. [`SubdomainId::INVALID`] for an external
    /// boundary.
    pub fn high(&self) -> SubdomainId {
        self.1
    }
}

/// A registered moving boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovingBoundary {
    /// Boundary id on the mesh.
    pub id: BoundaryId,
    /// Boundary name set on the mesh.
    pub name: String,
    /// Subdomain whose element sides carry the boundary.
    pub owner: SubdomainId,
}

/// Subdomain pair → moving boundary.
#[derive(Clone, Debug)]
pub struct MovingBoundaryRegistry {
    mutator: String,
    pairs: IndexMap<SubdomainPair, MovingBoundary>,
    ids: BTreeSet<BoundaryId>,
}

impl MovingBoundaryRegistry {
    /// Empty registry for the named mutator.
    pub fn new(mutator: &str) -> Self {
        Self {
            mutator: mutator.to_string(),
            pairs: IndexMap::new(),
            ids: BTreeSet::new(),
        }
    }

    /// Register a named boundary for `(owner, other)`.
    ///
    /// Pairs sharing a name share one boundary id. A name never seen
    /// before gets `id` if given, else a fresh id.
    pub fn register(
        &mut self,
        name: &str,
        id: Option<BoundaryId>,
        owner: SubdomainId,
        other: SubdomainId,
        mesh: &dyn Mesh,
    ) -> Result<BoundaryId, MutationError> {
        let pair = SubdomainPair::new(owner, other);
        if let Some(existing) = self.pairs.get(&pair) {
            return Err(MutationError::config(
                &self.mutator,
                format!(
                    "subdomain pair ({owner}, {other}) already belongs to moving boundary '{}'",
                    existing.name
                ),
            ));
        }
        let shared = self
            .pairs
            .values()
            .find(|b| b.name == name)
            .map(|b| b.id);
        let id = match (shared, id) {
            (Some(shared), Some(requested)) if shared != requested => {
                return Err(MutationError::config(
                    &self.mutator,
                    format!(
                        "moving boundary '{name}' given id {requested} but already has id {shared}"
                    ),
                ))
            }
            (Some(shared), _) => shared,
            (None, Some(requested)) => {
                if !self.ids.contains(&requested) && mesh.boundary_ids().contains(&requested) {
                    return Err(MutationError::BoundaryIdInUse {
                        mutator: self.mutator.clone(),
                        name: name.to_string(),
                        boundary: requested,
                    });
                }
                requested
            }
            (None, None) => self.fresh_id(mesh)?,
        };
        self.insert(pair, id, name.to_string(), owner);
        Ok(id)
    }

    /// The boundary for `(a, b)`, created if missing with `owner` as the
    /// side-carrying subdomain.
    pub fn ensure(
        &mut self,
        a: SubdomainId,
        b: SubdomainId,
        owner: SubdomainId,
        mesh: &dyn Mesh,
    ) -> Result<BoundaryId, MutationError> {
        let pair = SubdomainPair::new(a, b);
        if let Some(existing) = self.pairs.get(&pair) {
            return Ok(existing.id);
        }
        let id = self.fresh_id(mesh)?;
        let name = format!("moving_boundary_{}_{}", pair.low(), pair.high());
        info!("'{}' created moving boundary '{name}' (id {id})", self.mutator);
        self.insert(pair, id, name, owner);
        Ok(id)
    }

    fn insert(&mut self, pair: SubdomainPair, id: BoundaryId, name: String, owner: SubdomainId) {
        debug!(
            "moving boundary '{name}' (id {id}) covers ({}, {}) owned by {owner}",
            pair.low(),
            pair.high()
        );
        self.ids.insert(id);
        self.pairs.insert(pair, MovingBoundary { id, name, owner });
    }

    /// Lowest id from the mesh's next free id upward that neither the mesh
    /// nor this registry uses.
    fn fresh_id(&self, mesh: &dyn Mesh) -> Result<BoundaryId, MutationError> {
        let taken = mesh.boundary_ids();
        let mut candidate = mesh.next_free_boundary_id().0;
        while candidate < BoundaryId::INVALID.0 {
            let id = BoundaryId(candidate);
            if !taken.contains(&id) && !self.ids.contains(&id) {
                return Ok(id);
            }
            candidate += 1;
        }
        Err(MutationError::config(
            &self.mutator,
            "no free boundary id left for a moving boundary",
        ))
    }

    /// The registered boundary for a pair, in either order.
    pub fn get(&self, a: SubdomainId, b: SubdomainId) -> Option<&MovingBoundary> {
        self.pairs.get(&SubdomainPair::new(a, b))
    }

    /// Boundary to attach to a side of an element in `elem_sub` facing
    /// `neighbor_sub` (`INVALID` for the external boundary). `None` when
    /// the pair is unregistered or owned by the other side.
    pub fn side_boundary(
        &self,
        elem_sub: SubdomainId,
        neighbor_sub: SubdomainId,
    ) -> Option<BoundaryId> {
        self.get(elem_sub, neighbor_sub)
            .filter(|b| b.owner == elem_sub)
            .map(|b| b.id)
    }

    /// Whether `id` is a moving boundary.
    pub fn is_moving(&self, id: BoundaryId) -> bool {
        self.ids.contains(&id)
    }

    /// Distinct moving boundary ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = BoundaryId> + '_ {
        self.ids.iter().copied()
    }

    /// Registered pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&SubdomainPair, &MovingBoundary)> {
        self.pairs.iter()
    }

    /// Set every boundary name on the mesh.
    pub fn name_on(&self, mesh: &mut dyn Mesh) {
        for boundary in self.pairs.values() {
            mesh.set_boundary_name(boundary.id, &boundary.name);
        }
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair is registered.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
