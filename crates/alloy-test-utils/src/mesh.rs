//! In-memory structured quadrilateral mesh.

use std::collections::{BTreeMap, BTreeSet};

use alloy_core::{
    BoundaryId, CollaboratorError, ElementId, Mesh, NodeId, Side, SideNeighbor, SubdomainId,
};

/// Side index of the `-y` face.
pub const BOTTOM: Side = 0;
/// Side index of the `+x` face.
pub const RIGHT: Side = 1;
/// Side index of the `+y` face.
pub const TOP: Side = 2;
/// Side index of the `-x` face.
pub const LEFT: Side = 3;

/// An `nx` by `ny` grid of unit quads.
///
/// Element `(i, j)` has id `j * nx + i`; node `(i, j)` has id
/// `j * (nx + 1) + i`. The four external boundaries carry ids 0-3
/// (bottom, right, top, left) with their node sets populated. Every
/// element starts in subdomain 0.
///
/// Refinement ancestors can be attached with [`GridMesh::add_parent`];
/// they are inactive elements that only carry a subdomain.
#[derive(Clone, Debug)]
pub struct GridMesh {
    nx: usize,
    ny: usize,
    subdomains: BTreeMap<ElementId, SubdomainId>,
    parents: BTreeMap<ElementId, ElementId>,
    side_sets: BTreeMap<BoundaryId, BTreeSet<(ElementId, Side)>>,
    node_sets: BTreeMap<BoundaryId, BTreeSet<NodeId>>,
    names: BTreeMap<BoundaryId, String>,
    revision: u64,
}

impl GridMesh {
    /// Build the grid with its four external boundaries.
    pub fn new(nx: usize, ny: usize) -> Self {
        let mut mesh = Self {
            nx,
            ny,
            subdomains: (0..(nx * ny) as u64)
                .map(|e| (ElementId(e), SubdomainId(0)))
                .collect(),
            parents: BTreeMap::new(),
            side_sets: BTreeMap::new(),
            node_sets: BTreeMap::new(),
            names: BTreeMap::new(),
            revision: 0,
        };
        for (bid, name) in [(0u16, "bottom"), (1, "right"), (2, "top"), (3, "left")] {
            mesh.names.insert(BoundaryId(bid), name.to_string());
        }
        for j in 0..ny {
            for i in 0..nx {
                let e = mesh.element(i, j);
                if j == 0 {
                    mesh.insert_side(e, BOTTOM, BoundaryId(0));
                }
                if i + 1 == nx {
                    mesh.insert_side(e, RIGHT, BoundaryId(1));
                }
                if j + 1 == ny {
                    mesh.insert_side(e, TOP, BoundaryId(2));
                }
                if i == 0 {
                    mesh.insert_side(e, LEFT, BoundaryId(3));
                }
            }
        }
        for bid in 0..4 {
            mesh.rebuild_node_set(BoundaryId(bid));
        }
        mesh
    }

    /// A single row of `n` elements.
    pub fn line(n: usize) -> Self {
        Self::new(n, 1)
    }

    /// Id of element `(i, j)`.
    pub fn element(&self, i: usize, j: usize) -> ElementId {
        ElementId((j * self.nx + i) as u64)
    }

    fn node(&self, i: usize, j: usize) -> NodeId {
        NodeId((j * (self.nx + 1) + i) as u64)
    }

    fn coords(&self, elem: ElementId) -> Option<(usize, usize)> {
        let e = elem.0 as usize;
        (e < self.nx * self.ny).then(|| (e % self.nx, e / self.nx))
    }

    fn is_active(&self, elem: ElementId) -> bool {
        self.coords(elem).is_some()
    }

    /// Set the subdomain of every active element from its grid
    /// coordinates.
    pub fn assign_blocks(&mut self, f: impl Fn(usize, usize) -> SubdomainId) {
        for j in 0..self.ny {
            for i in 0..self.nx {
                let e = self.element(i, j);
                self.subdomains.insert(e, f(i, j));
            }
        }
        self.revision += 1;
    }

    /// Attach an inactive parent element to `child`.
    pub fn add_parent(&mut self, child: ElementId, parent: ElementId, subdomain: SubdomainId) {
        self.parents.insert(child, parent);
        self.subdomains.entry(parent).or_insert(subdomain);
        self.revision += 1;
    }

    /// Name of a boundary, if set.
    pub fn boundary_name(&self, boundary: BoundaryId) -> Option<&str> {
        self.names.get(&boundary).map(String::as_str)
    }

    fn insert_side(&mut self, elem: ElementId, side: Side, boundary: BoundaryId) {
        self.side_sets
            .entry(boundary)
            .or_default()
            .insert((elem, side));
    }

    fn side_nodes(&self, elem: ElementId, side: Side) -> Vec<NodeId> {
        let Some((i, j)) = self.coords(elem) else {
            return Vec::new();
        };
        match side {
            BOTTOM => vec![self.node(i, j), self.node(i + 1, j)],
            RIGHT => vec![self.node(i + 1, j), self.node(i + 1, j + 1)],
            TOP => vec![self.node(i, j + 1), self.node(i + 1, j + 1)],
            LEFT => vec![self.node(i, j), self.node(i, j + 1)],
            _ => Vec::new(),
        }
    }

    fn rebuild_node_set(&mut self, boundary: BoundaryId) {
        let nodes: BTreeSet<NodeId> = self
            .side_sets
            .get(&boundary)
            .into_iter()
            .flatten()
            .flat_map(|&(e, s)| self.side_nodes(e, s))
            .collect();
        if nodes.is_empty() {
            self.node_sets.remove(&boundary);
        } else {
            self.node_sets.insert(boundary, nodes);
        }
    }

    fn require_element(&self, elem: ElementId) -> Result<(), CollaboratorError> {
        if self.subdomains.contains_key(&elem) {
            Ok(())
        } else {
            Err(CollaboratorError::UnknownElement { element: elem })
        }
    }
}

impl Mesh for GridMesh {
    fn active_elements(&self) -> Vec<ElementId> {
        (0..(self.nx * self.ny) as u64).map(ElementId).collect()
    }

    fn subdomain_of(&self, elem: ElementId) -> Option<SubdomainId> {
        self.subdomains.get(&elem).copied()
    }

    fn subdomains(&self) -> BTreeSet<SubdomainId> {
        self.subdomains
            .iter()
            .filter(|(e, _)| self.is_active(**e))
            .map(|(_, s)| *s)
            .collect()
    }

    fn change_element_subdomain(
        &mut self,
        elem: ElementId,
        subdomain: SubdomainId,
    ) -> Result<(), CollaboratorError> {
        self.require_element(elem)?;
        if !subdomain.is_valid() {
            return Err(CollaboratorError::Mesh {
                reason: format!("cannot move element {elem} to sentinel subdomain {subdomain}"),
            });
        }
        self.subdomains.insert(elem, subdomain);
        self.revision += 1;
        Ok(())
    }

    fn ancestors_of(&self, elem: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut current = elem;
        while let Some(&parent) = self.parents.get(&current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    fn neighbors_of(&self, elem: ElementId) -> Vec<SideNeighbor> {
        let Some((i, j)) = self.coords(elem) else {
            return Vec::new();
        };
        let across = |side: Side, ni: Option<usize>, nj: Option<usize>, back: Side| {
            let neighbor = match (ni, nj) {
                (Some(ni), Some(nj)) if ni < self.nx && nj < self.ny => {
                    Some((self.element(ni, nj), back))
                }
                _ => None,
            };
            SideNeighbor { side, neighbor }
        };
        vec![
            across(BOTTOM, Some(i), j.checked_sub(1), TOP),
            across(RIGHT, Some(i + 1), Some(j), LEFT),
            across(TOP, Some(i), Some(j + 1), BOTTOM),
            across(LEFT, i.checked_sub(1), Some(j), RIGHT),
        ]
    }

    fn boundary_sides_of(&self, elem: ElementId) -> Vec<(Side, BoundaryId)> {
        let mut out: Vec<(Side, BoundaryId)> = self
            .side_sets
            .iter()
            .flat_map(|(bid, sides)| {
                sides
                    .iter()
                    .filter(move |(e, _)| *e == elem)
                    .map(move |(_, s)| (*s, *bid))
            })
            .collect();
        out.sort();
        out
    }

    fn sides_on_boundary(&self, boundary: BoundaryId) -> Vec<(ElementId, Side)> {
        self.side_sets
            .get(&boundary)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn boundary_ids(&self) -> BTreeSet<BoundaryId> {
        self.side_sets
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(b, _)| *b)
            .chain(self.node_sets.keys().copied())
            .collect()
    }

    fn add_boundary_side(
        &mut self,
        elem: ElementId,
        side: Side,
        boundary: BoundaryId,
    ) -> Result<(), CollaboratorError> {
        if !self.is_active(elem) {
            return Err(CollaboratorError::UnknownElement { element: elem });
        }
        if side > LEFT {
            return Err(CollaboratorError::Mesh {
                reason: format!("element {elem} has no side {side}"),
            });
        }
        self.insert_side(elem, side, boundary);
        self.revision += 1;
        Ok(())
    }

    fn remove_boundary_side(
        &mut self,
        elem: ElementId,
        side: Side,
        boundary: BoundaryId,
    ) -> Result<(), CollaboratorError> {
        if let Some(sides) = self.side_sets.get_mut(&boundary) {
            if sides.remove(&(elem, side)) {
                self.revision += 1;
            }
        }
        Ok(())
    }

    fn nodes_of(&self, elem: ElementId) -> Vec<NodeId> {
        match self.coords(elem) {
            Some((i, j)) => vec![
                self.node(i, j),
                self.node(i + 1, j),
                self.node(i + 1, j + 1),
                self.node(i, j + 1),
            ],
            None => Vec::new(),
        }
    }

    fn elements_of_node(&self, node: NodeId) -> Vec<ElementId> {
        let n = node.0 as usize;
        let (ni, nj) = (n % (self.nx + 1), n / (self.nx + 1));
        let mut out = Vec::new();
        for j in nj.saturating_sub(1)..=nj {
            for i in ni.saturating_sub(1)..=ni {
                if i < self.nx && j < self.ny {
                    let e = self.element(i, j);
                    if !out.contains(&e) {
                        out.push(e);
                    }
                }
            }
        }
        out.sort();
        out
    }

    fn is_boundary_node(&self, node: NodeId, boundary: BoundaryId) -> bool {
        self.node_sets
            .get(&boundary)
            .is_some_and(|s| s.contains(&node))
    }

    fn boundary_nodes(&self, boundary: BoundaryId) -> Vec<NodeId> {
        self.node_sets
            .get(&boundary)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn active_nodes(&self) -> Vec<NodeId> {
        (0..((self.nx + 1) * (self.ny + 1)) as u64)
            .map(NodeId)
            .collect()
    }

    fn sync_boundary_nodes(&mut self, boundary: BoundaryId) -> Result<(), CollaboratorError> {
        self.rebuild_node_set(boundary);
        self.revision += 1;
        Ok(())
    }

    fn set_boundary_name(&mut self, boundary: BoundaryId, name: &str) {
        self.names.insert(boundary, name.to_string());
    }

    fn centroid(&self, elem: ElementId) -> Option<[f64; 3]> {
        let (i, j) = self.coords(elem)?;
        Some([i as f64 + 0.5, j as f64 + 0.5, 0.0])
    }

    fn next_free_boundary_id(&self) -> BoundaryId {
        let used: BTreeSet<u16> = self
            .side_sets
            .keys()
            .chain(self.node_sets.keys())
            .chain(self.names.keys())
            .map(|b| b.0)
            .collect();
        BoundaryId((0..u16::MAX).find(|id| !used.contains(id)).unwrap_or(BoundaryId::INVALID.0))
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_topology() {
        let mesh = GridMesh::new(3, 2);
        assert_eq!(mesh.active_elements().len(), 6);
        assert_eq!(mesh.active_nodes().len(), 12);
        let e = mesh.element(1, 0);
        let n = mesh.neighbors_of(e);
        assert_eq!(n[0].neighbor, None);
        assert_eq!(n[1].neighbor, Some((mesh.element(2, 0), LEFT)));
        assert_eq!(n[2].neighbor, Some((mesh.element(1, 1), BOTTOM)));
        assert_eq!(n[3].neighbor, Some((mesh.element(0, 0), RIGHT)));
        assert_eq!(mesh.boundary_sides_of(e), vec![(BOTTOM, BoundaryId(0))]);
        assert_eq!(mesh.next_free_boundary_id(), BoundaryId(4));
        assert_eq!(mesh.centroid(e), Some([1.5, 0.5, 0.0]));
        assert_eq!(mesh.centroid(ElementId(6)), None);
    }

    #[test]
    fn next_free_id_fills_gaps() {
        let mut mesh = GridMesh::new(2, 1);
        mesh.add_boundary_side(ElementId(0), BOTTOM, BoundaryId(6))
            .unwrap();
        assert_eq!(mesh.next_free_boundary_id(), BoundaryId(4));
        mesh.set_boundary_name(BoundaryId(4), "named");
        assert_eq!(mesh.next_free_boundary_id(), BoundaryId(5));
    }

    #[test]
    fn node_sets_follow_side_sets() {
        let mut mesh = GridMesh::line(3);
        assert_eq!(mesh.boundary_nodes(BoundaryId(3)), vec![NodeId(0), NodeId(4)]);
        mesh.add_boundary_side(ElementId(1), LEFT, BoundaryId(7)).unwrap();
        mesh.sync_boundary_nodes(BoundaryId(7)).unwrap();
        assert!(mesh.is_boundary_node(NodeId(1), BoundaryId(7)));
        assert!(mesh.is_boundary_node(NodeId(5), BoundaryId(7)));
        mesh.remove_boundary_side(ElementId(1), LEFT, BoundaryId(7)).unwrap();
        mesh.sync_boundary_nodes(BoundaryId(7)).unwrap();
        assert!(mesh.boundary_nodes(BoundaryId(7)).is_empty());
    }

    #[test]
    fn ancestors_are_parent_first() {
        let mut mesh = GridMesh::line(2);
        mesh.add_parent(ElementId(0), ElementId(100), SubdomainId(0));
        mesh.add_parent(ElementId(100), ElementId(200), SubdomainId(0));
        assert_eq!(mesh.ancestors_of(ElementId(0)), vec![ElementId(100), ElementId(200)]);
        assert!(!mesh.active_elements().contains(&ElementId(100)));
        mesh.change_element_subdomain(ElementId(200), SubdomainId(4)).unwrap();
        assert_eq!(mesh.subdomain_of(ElementId(200)), Some(SubdomainId(4)));
    }

    #[test]
    fn mutations_bump_revision() {
        let mut mesh = GridMesh::line(2);
        let r0 = mesh.revision();
        mesh.change_element_subdomain(ElementId(0), SubdomainId(1)).unwrap();
        assert!(mesh.revision() > r0);
        assert!(mesh
            .change_element_subdomain(ElementId(9), SubdomainId(1))
            .is_err());
        assert_eq!(mesh.subdomains(), [SubdomainId(0), SubdomainId(1)].into());
        assert_eq!(mesh.elements_in_block(SubdomainId(1)), vec![ElementId(0)]);
    }

    #[test]
    fn elements_of_corner_and_interior_nodes() {
        let mesh = GridMesh::new(2, 2);
        assert_eq!(mesh.elements_of_node(NodeId(0)), vec![ElementId(0)]);
        assert_eq!(
            mesh.elements_of_node(NodeId(4)),
            vec![ElementId(0), ElementId(1), ElementId(2), ElementId(3)]
        );
    }
}
