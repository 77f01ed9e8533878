//! Entity ranges and their static split across worker threads.
//!
//! Category dispatch happens here, once per object per mesh revision:
//! the resulting [`Entity`] list is cached and every pass only slices it.

use std::collections::BTreeSet;
use std::ops::Range;

use indexmap::IndexMap;
use log::debug;

use alloy_core::{Mesh, SubdomainId};
use alloy_userobject::{Entity, EntityCategory, Restriction};

/// Split `len` items into `n` contiguous ranges in order. The first
/// `len % n` ranges hold one extra item; ranges may be empty.
pub fn chunk_bounds(len: usize, n: usize) -> Vec<Range<usize>> {
    let n = n.max(1);
    let base = len / n;
    let extra = len % n;
    let mut start = 0;
    (0..n)
        .map(|i| {
            let size = base + usize::from(i < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// The ordered entity list of one category under a restriction.
pub fn build_range(
    mesh: &dyn Mesh,
    category: EntityCategory,
    restriction: &Restriction,
) -> Vec<Entity> {
    let in_block = |elem| {
        mesh.subdomain_of(elem)
            .is_some_and(|s| restriction.has_block(s))
    };
    match category {
        EntityCategory::Element => mesh
            .active_elements()
            .into_iter()
            .filter(|e| in_block(*e))
            .map(Entity::Element)
            .collect(),
        EntityCategory::Side => {
            let boundaries: Vec<_> = if restriction.boundaries.is_empty() {
                mesh.boundary_ids().into_iter().collect()
            } else {
                restriction.boundaries.clone()
            };
            boundaries
                .into_iter()
                .flat_map(|boundary| {
                    mesh.sides_on_boundary(boundary)
                        .into_iter()
                        .map(move |(element, side)| Entity::Side {
                            element,
                            side,
                            boundary,
                        })
                })
                .filter(|entity| match entity {
                    Entity::Side { element, .. } => in_block(*element),
                    _ => false,
                })
                .collect()
        }
        EntityCategory::Nodal => {
            let block_restricted = !restriction.blocks.is_empty()
                && !restriction.blocks.contains(&SubdomainId::ANY);
            let nodes: BTreeSet<_> = if !restriction.boundaries.is_empty() {
                restriction
                    .boundaries
                    .iter()
                    .flat_map(|b| mesh.boundary_nodes(*b))
                    .collect()
            } else if block_restricted {
                mesh.active_elements()
                    .into_iter()
                    .filter(|e| in_block(*e))
                    .flat_map(|e| mesh.nodes_of(e))
                    .collect()
            } else {
                mesh.active_nodes().into_iter().collect()
            };
            nodes.into_iter().map(Entity::Node).collect()
        }
        EntityCategory::General => vec![Entity::General],
    }
}

/// Entity lists per object, invalidated when the mesh revision changes.
#[derive(Debug, Default)]
pub struct EntityCache {
    revision: Option<u64>,
    ranges: IndexMap<usize, Vec<Entity>>,
}

impl EntityCache {
    /// The range of object `index`, rebuilt if the mesh changed since it
    /// was cached.
    pub fn range(
        &mut self,
        index: usize,
        mesh: &dyn Mesh,
        category: EntityCategory,
        restriction: &Restriction,
    ) -> &[Entity] {
        let revision = mesh.revision();
        if self.revision != Some(revision) {
            if self.revision.is_some() {
                debug!(
                    "mesh revision {revision}: dropping {} cached entity ranges",
                    self.ranges.len()
                );
            }
            self.ranges.clear();
            self.revision = Some(revision);
        }
        self.ranges
            .entry(index)
            .or_insert_with(|| build_range(mesh, category, restriction))
    }

    /// Number of cached ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
