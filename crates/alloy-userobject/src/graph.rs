//! Dependency graph among UserObjects.
//!
//! [`UserObjectGraph`] collects objects and their declared dependencies,
//! sorts them topologically and partitions the sorted order into the
//! groups the engine runs around initial conditions and auxiliary
//! variable computation:
//!
//! - **PRE_IC**: objects initial conditions depend on,
//! - **PRE_AUX**: objects auxiliary kernels depend on,
//! - **POST_AUX**: everything else.
//!
//! Each group keeps the relative sorted order, and a group never contains
//! an object whose dependency sits in a later group.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use indexmap::IndexMap;
use log::{debug, info};

use alloy_core::ExecFlags;

use crate::error::GraphError;
use crate::userobject::{EntityCategory, Restriction, UserObject};

/// Lifecycle of a [`UserObjectGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphState {
    /// No node registered yet.
    Unbuilt,
    /// Nodes and dependencies are being added.
    DependenciesDeclared,
    /// A topological order exists.
    Sorted,
    /// Groups are assigned; the graph is read-only.
    Frozen,
}

/// Execution group of a UserObject relative to initial conditions and
/// auxiliary computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuxGroup {
    /// Before initial conditions are applied.
    PreIc,
    /// Before auxiliary variables are computed.
    PreAux,
    /// After auxiliary variables are computed.
    PostAux,
    /// Every object, in sorted order.
    All,
}

/// Graph-side description of a UserObject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserObjectNode {
    /// Unique name.
    pub name: String,
    /// Names of the objects this one depends on.
    pub depends_on: Vec<String>,
    /// Entity category.
    pub category: EntityCategory,
    /// Block and boundary restriction.
    pub restriction: Restriction,
    /// Solve-loop points at which the object runs.
    pub execute_on: ExecFlags,
}

impl UserObjectNode {
    /// A general node with no dependencies.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            depends_on: Vec::new(),
            category: EntityCategory::General,
            restriction: Restriction::default(),
            execute_on: ExecFlags::empty(),
        }
    }

    /// Builder: add dependencies.
    pub fn depending_on<S: AsRef<str>>(mut self, deps: &[S]) -> Self {
        self.depends_on
            .extend(deps.iter().map(|d| d.as_ref().to_string()));
        self
    }

    /// Describe an existing object.
    pub fn from_object(object: &dyn UserObject) -> Self {
        Self {
            name: object.name().to_string(),
            depends_on: object.depends_on(),
            category: object.category(),
            restriction: object.restriction(),
            execute_on: object.execute_on(),
        }
    }
}

struct NodeData {
    node: UserObjectNode,
    group: Option<AuxGroup>,
}

/// Dependency DAG among UserObjects with deterministic ordering.
///
/// Node indices are declaration indices: the n-th registered node has
/// index n. Among nodes whose dependencies are satisfied, the one declared
/// first is always emitted first, so the order is stable across runs and
/// thread counts.
pub struct UserObjectGraph {
    nodes: IndexMap<String, NodeData>,
    sorted: Vec<usize>,
    groups: [Vec<usize>; 3],
    state: GraphState,
}

impl Default for UserObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl UserObjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            sorted: Vec::new(),
            groups: [Vec::new(), Vec::new(), Vec::new()],
            state: GraphState::Unbuilt,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Name of the node at a declaration index.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.nodes.get_index(index).map(|(name, _)| name.as_str())
    }

    /// Declaration index of a node.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.get_index_of(name)
    }

    /// Node description at a declaration index.
    pub fn node(&self, index: usize) -> Option<&UserObjectNode> {
        self.nodes.get_index(index).map(|(_, d)| &d.node)
    }

    /// Group assigned by the last partition, once frozen.
    pub fn group_of(&self, index: usize) -> Option<AuxGroup> {
        self.nodes.get_index(index).and_then(|(_, d)| d.group)
    }

    fn require_open(&self, operation: &'static str) -> Result<(), GraphError> {
        match self.state {
            GraphState::Unbuilt | GraphState::DependenciesDeclared => Ok(()),
            state => Err(GraphError::InvalidState { operation, state }),
        }
    }

    /// Register a node. Dependencies may name nodes registered later.
    pub fn register(&mut self, mut node: UserObjectNode) -> Result<usize, GraphError> {
        self.require_open("register a user object")?;
        if self.nodes.contains_key(&node.name) {
            return Err(GraphError::DuplicateNode { name: node.name });
        }
        let mut seen = BTreeSet::new();
        node.depends_on.retain(|d| seen.insert(d.clone()));
        let index = self.nodes.len();
        self.nodes
            .insert(node.name.clone(), NodeData { node, group: None });
        self.state = GraphState::DependenciesDeclared;
        Ok(index)
    }

    /// Add a dependency of `node` on `depends_on`.
    pub fn declare_dependency(&mut self, node: &str, depends_on: &str) -> Result<(), GraphError> {
        self.require_open("declare a dependency")?;
        let data = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| GraphError::UnknownNode {
                name: node.to_string(),
            })?;
        if !data.node.depends_on.iter().any(|d| d == depends_on) {
            data.node.depends_on.push(depends_on.to_string());
        }
        self.state = GraphState::DependenciesDeclared;
        Ok(())
    }

    /// Return a sorted or frozen graph to the open state so dependencies
    /// can change. Groups are discarded.
    pub fn thaw(&mut self) {
        if matches!(self.state, GraphState::Sorted | GraphState::Frozen) {
            self.sorted.clear();
            for group in &mut self.groups {
                group.clear();
            }
            for data in self.nodes.values_mut() {
                data.group = None;
            }
            self.state = GraphState::DependenciesDeclared;
        }
    }

    fn resolve_dependencies(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        self.nodes
            .iter()
            .map(|(name, data)| {
                data.node
                    .depends_on
                    .iter()
                    .map(|dep| {
                        self.nodes
                            .get_index_of(dep)
                            .ok_or_else(|| GraphError::UnknownDependency {
                                node: name.clone(),
                                dependency: dep.clone(),
                            })
                    })
                    .collect()
            })
            .collect()
    }

    /// Topologically sort the nodes (Kahn's algorithm, ties broken by
    /// declaration index). Never returns a partial order.
    pub fn sort(&mut self) -> Result<&[usize], GraphError> {
        if self.state == GraphState::Frozen {
            return Err(GraphError::InvalidState {
                operation: "sort",
                state: self.state,
            });
        }
        let deps = self.resolve_dependencies()?;
        let n = deps.len();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for (i, node_deps) in deps.iter().enumerate() {
            for &j in node_deps {
                dependents[j].push(i);
                indegree[i] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &k in &dependents[i] {
                indegree[k] -= 1;
                if indegree[k] == 0 {
                    ready.push(Reverse(k));
                }
            }
        }

        if order.len() < n {
            let cycle = self.find_cycle(&deps, &indegree);
            return Err(GraphError::CyclicDependency { cycle });
        }

        debug!(
            "sorted {n} user objects: {:?}",
            order
                .iter()
                .filter_map(|&i| self.name(i))
                .collect::<Vec<_>>()
        );
        self.sorted = order;
        self.state = GraphState::Sorted;
        Ok(&self.sorted)
    }

    /// Extract one cycle among the nodes Kahn's algorithm could not emit.
    ///
    /// Every leftover node has a leftover dependency, so walking
    /// dependencies from any leftover node must revisit a node. The cycle
    /// is rotated to start at its lowest declaration index.
    fn find_cycle(&self, deps: &[Vec<usize>], indegree: &[usize]) -> Vec<String> {
        let stuck = |j: &usize| indegree[*j] > 0;
        let mut path: Vec<usize> = Vec::new();
        let mut position: Vec<Option<usize>> = vec![None; deps.len()];
        let mut current = (0..deps.len()).find(stuck);

        let mut cycle: Vec<usize> = Vec::new();
        while let Some(node) = current {
            if let Some(start) = position[node] {
                cycle = path[start..].to_vec();
                break;
            }
            position[node] = Some(path.len());
            path.push(node);
            current = deps[node].iter().copied().filter(stuck).min();
        }

        if let Some(min_pos) = cycle
            .iter()
            .enumerate()
            .min_by_key(|&(_, &i)| i)
            .map(|(p, _)| p)
        {
            cycle.rotate_left(min_pos);
        }
        if let Some(&first) = cycle.first() {
            cycle.push(first);
        }
        cycle
            .into_iter()
            .filter_map(|i| self.name(i).map(str::to_string))
            .collect()
    }

    /// The full topological order. Legal once sorted.
    pub fn sorted_order(&self) -> Result<&[usize], GraphError> {
        match self.state {
            GraphState::Sorted | GraphState::Frozen => Ok(&self.sorted),
            state => Err(GraphError::InvalidState {
                operation: "read the sorted order",
                state,
            }),
        }
    }

    /// Split the sorted order into PRE_AUX and POST_AUX.
    pub fn partition<S: AsRef<str>>(&mut self, pre_aux: &[S]) -> Result<(), GraphError> {
        self.partition_groups::<S>(&[], pre_aux)
    }

    /// Split the sorted order into PRE_IC, PRE_AUX and POST_AUX.
    ///
    /// A node joins a group when its name is listed for that group, when
    /// any listed name is among its transitive dependencies, or when a
    /// member of the group transitively depends on it. PRE_IC is assigned
    /// first; PRE_AUX is assigned among the remaining nodes.
    pub fn partition_groups<S: AsRef<str>>(
        &mut self,
        pre_ic: &[S],
        pre_aux: &[S],
    ) -> Result<(), GraphError> {
        if self.state != GraphState::Sorted {
            return Err(GraphError::InvalidState {
                operation: "partition",
                state: self.state,
            });
        }
        let n = self.nodes.len();
        let ic_seeds = self.seed_mask(pre_ic)?;
        let aux_seeds = self.seed_mask(pre_aux)?;
        let closures = self.dependency_closures()?;

        let mut assigned: Vec<Option<AuxGroup>> = vec![None; n];
        assign_group(&closures, &ic_seeds, AuxGroup::PreIc, &mut assigned);
        assign_group(&closures, &aux_seeds, AuxGroup::PreAux, &mut assigned);

        for group in &mut self.groups {
            group.clear();
        }
        for &i in &self.sorted {
            let group = assigned[i].unwrap_or(AuxGroup::PostAux);
            let slot = match group {
                AuxGroup::PreIc => 0,
                AuxGroup::PreAux => 1,
                _ => 2,
            };
            self.groups[slot].push(i);
            if let Some((_, data)) = self.nodes.get_index_mut(i) {
                data.group = Some(group);
            }
        }
        self.state = GraphState::Frozen;
        info!(
            "user object groups: {} pre-ic, {} pre-aux, {} post-aux",
            self.groups[0].len(),
            self.groups[1].len(),
            self.groups[2].len()
        );
        Ok(())
    }

    fn seed_mask<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<bool>, GraphError> {
        let mut mask = vec![false; self.nodes.len()];
        for name in names {
            let i = self
                .nodes
                .get_index_of(name.as_ref())
                .ok_or_else(|| GraphError::UnknownNode {
                    name: name.as_ref().to_string(),
                })?;
            mask[i] = true;
        }
        Ok(mask)
    }

    /// Transitive dependencies of every node, built in sorted order so
    /// each dependency's closure is complete before it is used.
    fn dependency_closures(&self) -> Result<Vec<BTreeSet<usize>>, GraphError> {
        let deps = self.resolve_dependencies()?;
        let mut closures: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); deps.len()];
        for &i in &self.sorted {
            let mut closure = BTreeSet::new();
            for &j in &deps[i] {
                closure.insert(j);
                closure.extend(closures[j].iter().copied());
            }
            closures[i] = closure;
        }
        Ok(closures)
    }

    /// Declaration indices of a group, in sorted order. Legal once frozen.
    pub fn order(&self, group: AuxGroup) -> Result<&[usize], GraphError> {
        if self.state != GraphState::Frozen {
            return Err(GraphError::InvalidState {
                operation: "read a group order",
                state: self.state,
            });
        }
        Ok(match group {
            AuxGroup::PreIc => &self.groups[0],
            AuxGroup::PreAux => &self.groups[1],
            AuxGroup::PostAux => &self.groups[2],
            AuxGroup::All => &self.sorted,
        })
    }
}

fn assign_group(
    closures: &[BTreeSet<usize>],
    seeds: &[bool],
    group: AuxGroup,
    assigned: &mut [Option<AuxGroup>],
) {
    let members: Vec<usize> = (0..closures.len())
        .filter(|&i| assigned[i].is_none())
        .filter(|&i| seeds[i] || closures[i].iter().any(|&j| seeds[j]))
        .collect();
    for &i in &members {
        assigned[i] = Some(group);
    }
    for &i in &members {
        for &j in &closures[i] {
            if assigned[j].is_none() {
                assigned[j] = Some(group);
            }
        }
    }
}
