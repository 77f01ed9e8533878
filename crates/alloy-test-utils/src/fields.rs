//! Field system that records every call made to it.

use indexmap::IndexMap;

use alloy_core::{CollaboratorError, ElementId, ExecFlag, FieldSystem, Mesh, NodeId};

/// One `apply_initial_condition` call.
#[derive(Clone, Debug, PartialEq)]
pub struct InitialConditionCall {
    /// Variables the initial condition was applied to.
    pub variables: Vec<String>,
    /// Element range.
    pub elements: Vec<ElementId>,
    /// Node range.
    pub nodes: Vec<NodeId>,
}

/// One `extrapolate_polynomial` call.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtrapolationCall {
    /// The extrapolated variable.
    pub variable: String,
    /// Elements the polynomial was fitted on.
    pub patch: Vec<ElementId>,
    /// Elements the polynomial was evaluated on.
    pub elements: Vec<ElementId>,
}

/// Element-constant variables with nodal values, plus a log of
/// collaborator calls.
///
/// Each variable has an initial value; `apply_initial_condition` writes
/// it onto the listed elements and nodes. With
/// [`RecordingFieldSystem::with_connectivity`] it also overwrites every
/// node of the listed elements, the way an FE projection does.
/// Polynomial extrapolation fits a constant: the mean over the patch.
/// `compute_aux` can be made to fail with
/// [`RecordingFieldSystem::fail_aux_on`].
#[derive(Clone, Debug, Default)]
pub struct RecordingFieldSystem {
    values: IndexMap<String, IndexMap<ElementId, f64>>,
    nodal: IndexMap<String, IndexMap<NodeId, f64>>,
    initial: IndexMap<String, f64>,
    connectivity: IndexMap<ElementId, Vec<NodeId>>,
    /// Every `apply_initial_condition` call, in order.
    pub ic_calls: Vec<InitialConditionCall>,
    /// Every `extrapolate_polynomial` call, in order.
    pub extrapolations: Vec<ExtrapolationCall>,
    /// Every `set_nodal_values` call as `(variable, nodes, values)`.
    pub nodal_writes: Vec<(String, Vec<NodeId>, Vec<f64>)>,
    /// Every `set_old_solutions` range.
    pub old_solution_calls: Vec<(Vec<ElementId>, Vec<NodeId>)>,
    /// Number of `reinitialize_equation_systems` calls.
    pub reinit_count: usize,
    /// Flags passed to `compute_aux`, in order.
    pub aux_calls: Vec<ExecFlag>,
    fail_aux: Option<ExecFlag>,
}

impl RecordingFieldSystem {
    /// Field system with no variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable with the value used by its initial condition.
    pub fn with_variable(mut self, name: &str, initial: f64) -> Self {
        self.values.entry(name.to_string()).or_default();
        self.nodal.entry(name.to_string()).or_default();
        self.initial.insert(name.to_string(), initial);
        self
    }

    /// Record the nodes of every active element of `mesh`.
    pub fn with_connectivity(mut self, mesh: &dyn Mesh) -> Self {
        self.connectivity = mesh
            .active_elements()
            .into_iter()
            .map(|e| (e, mesh.nodes_of(e)))
            .collect();
        self
    }

    /// Set `var` to `value` on every listed element.
    pub fn fill(&mut self, var: &str, elems: &[ElementId], value: f64) {
        let column = self.values.entry(var.to_string()).or_default();
        for e in elems {
            column.insert(*e, value);
        }
    }

    /// Set `var` to `value` on every listed node.
    pub fn fill_nodes(&mut self, var: &str, nodes: &[NodeId], value: f64) {
        let column = self.nodal.entry(var.to_string()).or_default();
        for n in nodes {
            column.insert(*n, value);
        }
    }

    /// Set a single element value.
    pub fn set(&mut self, var: &str, elem: ElementId, value: f64) {
        self.values
            .entry(var.to_string())
            .or_default()
            .insert(elem, value);
    }

    /// Value of `var` at a node, if set.
    pub fn nodal_value(&self, var: &str, node: NodeId) -> Option<f64> {
        self.nodal.get(var)?.get(&node).copied()
    }

    /// Make `compute_aux` fail for `flag`.
    pub fn fail_aux_on(&mut self, flag: ExecFlag) {
        self.fail_aux = Some(flag);
    }

    /// Every element ever passed to `apply_initial_condition`.
    pub fn ic_elements(&self) -> Vec<ElementId> {
        self.ic_calls
            .iter()
            .flat_map(|c| c.elements.iter().copied())
            .collect()
    }

    fn touched_nodes(&self, elems: &[ElementId], nodes: &[NodeId]) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = elems
            .iter()
            .filter_map(|e| self.connectivity.get(e))
            .flatten()
            .chain(nodes)
            .copied()
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn initial_of(&self, var: &str) -> Result<f64, CollaboratorError> {
        self.initial
            .get(var)
            .copied()
            .ok_or_else(|| CollaboratorError::UnknownVariable {
                name: var.to_string(),
            })
    }
}

impl FieldSystem for RecordingFieldSystem {
    fn variable_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn element_value(&self, var: &str, elem: ElementId) -> Option<f64> {
        self.values.get(var)?.get(&elem).copied()
    }

    fn apply_initial_condition(
        &mut self,
        vars: &[String],
        elems: &[ElementId],
        nodes: &[NodeId],
    ) -> Result<(), CollaboratorError> {
        let touched = self.touched_nodes(elems, nodes);
        for var in vars {
            let initial = self.initial_of(var)?;
            self.fill(var, elems, initial);
            self.fill_nodes(var, &touched, initial);
        }
        self.ic_calls.push(InitialConditionCall {
            variables: vars.to_vec(),
            elements: elems.to_vec(),
            nodes: nodes.to_vec(),
        });
        Ok(())
    }

    fn nodal_values(&self, var: &str, nodes: &[NodeId]) -> Result<Vec<f64>, CollaboratorError> {
        let initial = self.initial_of(var)?;
        Ok(nodes
            .iter()
            .map(|n| self.nodal_value(var, *n).unwrap_or(initial))
            .collect())
    }

    fn set_nodal_values(
        &mut self,
        var: &str,
        nodes: &[NodeId],
        values: &[f64],
    ) -> Result<(), CollaboratorError> {
        self.initial_of(var)?;
        if nodes.len() != values.len() {
            return Err(CollaboratorError::Field {
                reason: format!("{} nodes but {} values for '{var}'", nodes.len(), values.len()),
            });
        }
        let column = self.nodal.entry(var.to_string()).or_default();
        for (n, v) in nodes.iter().zip(values) {
            column.insert(*n, *v);
        }
        self.nodal_writes
            .push((var.to_string(), nodes.to_vec(), values.to_vec()));
        Ok(())
    }

    fn extrapolate_polynomial(
        &mut self,
        var: &str,
        patch: &[ElementId],
        elems: &[ElementId],
        nodes: &[NodeId],
    ) -> Result<(), CollaboratorError> {
        self.initial_of(var)?;
        let samples: Vec<f64> = patch
            .iter()
            .filter_map(|e| self.element_value(var, *e))
            .collect();
        if samples.is_empty() {
            return Err(CollaboratorError::Field {
                reason: format!("no patch values to fit '{var}' on"),
            });
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let touched = self.touched_nodes(elems, nodes);
        self.fill(var, elems, mean);
        self.fill_nodes(var, &touched, mean);
        self.extrapolations.push(ExtrapolationCall {
            variable: var.to_string(),
            patch: patch.to_vec(),
            elements: elems.to_vec(),
        });
        Ok(())
    }

    fn set_old_solutions(
        &mut self,
        elems: &[ElementId],
        nodes: &[NodeId],
    ) -> Result<(), CollaboratorError> {
        self.old_solution_calls.push((elems.to_vec(), nodes.to_vec()));
        Ok(())
    }

    fn reinitialize_equation_systems(&mut self) -> Result<(), CollaboratorError> {
        self.reinit_count += 1;
        Ok(())
    }

    fn compute_aux(&mut self, flag: ExecFlag) -> Result<(), CollaboratorError> {
        self.aux_calls.push(flag);
        if self.fail_aux == Some(flag) {
            return Err(CollaboratorError::Field {
                reason: format!("aux kernels failed on {flag}"),
            });
        }
        Ok(())
    }
}
