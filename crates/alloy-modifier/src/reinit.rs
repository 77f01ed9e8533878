//! How reinitialized elements get their field values back.
//!
//! Each reinitialized variable follows a [`ReinitStrategy`]: reapply its
//! initial condition, or extrapolate a polynomial fitted on a patch of
//! elements that kept their values. Polynomial strategies differ only in
//! the patch. The fit itself belongs to the field system
//! ([`FieldSystem::extrapolate_polynomial`]).
//!
//! Reinitializing an element also overwrites nodal values it shares with
//! elements that were not reinitialized. Variables flagged with
//! `restore_overridden` get those shared values back afterwards.

use std::collections::BTreeSet;

use alloy_core::{ElementId, FieldSystem, Mesh, NodeId};

use crate::error::MutationError;

/// Source of the new values of a reinitialized variable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReinitStrategy {
    /// Reapply the variable's initial condition.
    Ic,
    /// Fit on the elements sharing a node with a reinitialized element.
    PolynomialNeighbor,
    /// Fit on every element that kept its values.
    PolynomialWhole,
    /// Fit on the elements whose centroid lies within `radius` of the
    /// centroid of a reinitialized element.
    PolynomialNearby {
        /// Search radius, in mesh units.
        radius: f64,
    },
}

impl ReinitStrategy {
    /// Whether the strategy extrapolates instead of applying the IC.
    pub fn is_polynomial(&self) -> bool {
        !matches!(self, Self::Ic)
    }
}

/// Resolved reinitialization of one variable.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableReinit {
    /// The variable.
    pub variable: String,
    /// How it is reinitialized.
    pub strategy: ReinitStrategy,
    /// Restore nodal values shared with elements that were not
    /// reinitialized.
    pub restore_overridden: bool,
}

/// Pair every variable with its strategy and restore flag.
///
/// A single strategy or flag applies to every variable. Otherwise there
/// must be exactly one per variable. No restore flags means nothing is
/// restored.
pub fn resolve(
    mutator: &str,
    variables: &[String],
    strategies: &[ReinitStrategy],
    restore: &[bool],
) -> Result<Vec<VariableReinit>, MutationError> {
    let strategy_at = |i: usize| match strategies {
        [one] => Ok(*one),
        many if many.len() == variables.len() => Ok(many[i]),
        _ => Err(MutationError::config(
            mutator,
            format!(
                "{} reinitialization strategies for {} variables; give one or one per variable",
                strategies.len(),
                variables.len()
            ),
        )),
    };
    let restore_at = |i: usize| match restore {
        [] => Ok(false),
        [one] => Ok(*one),
        many if many.len() == variables.len() => Ok(many[i]),
        _ => Err(MutationError::config(
            mutator,
            format!(
                "{} restore_overridden_dofs flags for {} variables; give none, one or one per variable",
                restore.len(),
                variables.len()
            ),
        )),
    };
    for strategy in strategies {
        if let ReinitStrategy::PolynomialNearby { radius } = strategy {
            if !(radius.is_finite() && *radius > 0.0) {
                return Err(MutationError::config(
                    mutator,
                    format!("nearby reinitialization needs a positive radius, got {radius}"),
                ));
            }
        }
    }
    if strategies.is_empty() {
        return Err(MutationError::config(
            mutator,
            "at least one reinitialization strategy is needed",
        ));
    }
    variables
        .iter()
        .enumerate()
        .map(|(i, variable)| {
            Ok(VariableReinit {
                variable: variable.clone(),
                strategy: strategy_at(i)?,
                restore_overridden: restore_at(i)?,
            })
        })
        .collect()
}

/// Active elements outside `reinit` on which `var` is defined.
fn candidates(
    var: &str,
    reinit: &BTreeSet<ElementId>,
    mesh: &dyn Mesh,
    fields: &dyn FieldSystem,
) -> Vec<ElementId> {
    mesh.active_elements()
        .into_iter()
        .filter(|e| !reinit.contains(e) && fields.element_value(var, *e).is_some())
        .collect()
}

/// Elements a polynomial for `var` is fitted on, ascending.
pub fn patch_elements(
    mutator: &str,
    var: &str,
    strategy: ReinitStrategy,
    reinit: &[ElementId],
    mesh: &dyn Mesh,
    fields: &dyn FieldSystem,
) -> Result<Vec<ElementId>, MutationError> {
    let reinit_set: BTreeSet<_> = reinit.iter().copied().collect();
    let pool = candidates(var, &reinit_set, mesh, fields);
    let patch = match strategy {
        ReinitStrategy::Ic => Vec::new(),
        ReinitStrategy::PolynomialWhole => pool,
        ReinitStrategy::PolynomialNeighbor => {
            let touched: BTreeSet<NodeId> =
                reinit.iter().flat_map(|e| mesh.nodes_of(*e)).collect();
            pool.into_iter()
                .filter(|e| mesh.nodes_of(*e).iter().any(|n| touched.contains(n)))
                .collect()
        }
        ReinitStrategy::PolynomialNearby { radius } => {
            let centroid = |e: ElementId| {
                mesh.centroid(e).ok_or_else(|| {
                    MutationError::reinit(mutator, format!("element {e} has no centroid"))
                })
            };
            let centers = reinit
                .iter()
                .map(|e| centroid(*e))
                .collect::<Result<Vec<_>, _>>()?;
            let mut patch = Vec::new();
            for e in pool {
                let c = centroid(e)?;
                if centers.iter().any(|r| distance(r, &c) <= radius) {
                    patch.push(e);
                }
            }
            patch
        }
    };
    Ok(patch)
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Nodes of reinitialized elements that `var` also has on an element
/// that keeps its values, ascending.
pub fn overridden_nodes(
    var: &str,
    reinit: &[ElementId],
    mesh: &dyn Mesh,
    fields: &dyn FieldSystem,
) -> Vec<NodeId> {
    let reinit_set: BTreeSet<_> = reinit.iter().copied().collect();
    let reinit_nodes: BTreeSet<NodeId> = reinit.iter().flat_map(|e| mesh.nodes_of(*e)).collect();
    let kept_nodes: BTreeSet<NodeId> = candidates(var, &reinit_set, mesh, fields)
        .into_iter()
        .flat_map(|e| mesh.nodes_of(e))
        .collect();
    reinit_nodes.intersection(&kept_nodes).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_test_utils::{GridMesh, RecordingFieldSystem};

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(n: usize) -> (GridMesh, RecordingFieldSystem) {
        let mesh = GridMesh::line(n);
        let mut fields = RecordingFieldSystem::new().with_variable("u", 0.0);
        let elems: Vec<_> = (0..n as u64).map(ElementId).collect();
        fields.fill("u", &elems, 1.0);
        (mesh, fields)
    }

    #[test]
    fn single_strategy_applies_to_every_variable() {
        let plan = resolve(
            "m",
            &vars(&["u", "v"]),
            &[ReinitStrategy::PolynomialWhole],
            &[true],
        )
        .unwrap();
        assert!(plan.iter().all(|p| p.strategy == ReinitStrategy::PolynomialWhole));
        assert!(plan.iter().all(|p| p.restore_overridden));
    }

    #[test]
    fn per_variable_lists_must_match() {
        let plan = resolve(
            "m",
            &vars(&["u", "v"]),
            &[ReinitStrategy::Ic, ReinitStrategy::PolynomialNeighbor],
            &[],
        )
        .unwrap();
        assert_eq!(plan[1].strategy, ReinitStrategy::PolynomialNeighbor);
        assert!(!plan[0].restore_overridden);

        let three = [ReinitStrategy::Ic; 3];
        match resolve("m", &vars(&["u", "v"]), &three, &[]) {
            Err(MutationError::InvalidConfig { reason, .. }) => {
                assert!(reason.contains("3 reinitialization strategies"), "{reason}")
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
        assert!(resolve("m", &vars(&["u", "v"]), &[ReinitStrategy::Ic], &[true; 3]).is_err());
        assert!(resolve("m", &vars(&["u"]), &[], &[]).is_err());
    }

    #[test]
    fn nearby_radius_must_be_positive() {
        for radius in [0.0, -1.0, f64::NAN] {
            let r = resolve(
                "m",
                &vars(&["u"]),
                &[ReinitStrategy::PolynomialNearby { radius }],
                &[],
            );
            assert!(r.is_err(), "radius {radius} accepted");
        }
    }

    #[test]
    fn patches_grow_with_the_strategy() {
        let (mesh, fields) = row(6);
        let reinit = [ElementId(2)];
        let patch = |s| patch_elements("m", "u", s, &reinit, &mesh, &fields).unwrap();
        assert_eq!(
            patch(ReinitStrategy::PolynomialNeighbor),
            vec![ElementId(1), ElementId(3)]
        );
        assert_eq!(
            patch(ReinitStrategy::PolynomialNearby { radius: 2.0 }),
            vec![ElementId(0), ElementId(1), ElementId(3), ElementId(4)]
        );
        assert_eq!(patch(ReinitStrategy::PolynomialWhole).len(), 5);
        assert!(patch(ReinitStrategy::Ic).is_empty());
    }

    #[test]
    fn patch_skips_elements_without_the_variable() {
        let mesh = GridMesh::line(3);
        let mut fields = RecordingFieldSystem::new().with_variable("u", 0.0);
        fields.set("u", ElementId(0), 1.0);
        let patch = patch_elements(
            "m",
            "u",
            ReinitStrategy::PolynomialWhole,
            &[ElementId(1)],
            &mesh,
            &fields,
        )
        .unwrap();
        assert_eq!(patch, vec![ElementId(0)]);
    }

    #[test]
    fn overridden_nodes_are_shared_with_kept_elements() {
        let (mesh, fields) = row(4);
        // element 1 has nodes 1, 2, 6, 7; element 2 is reinitialized too
        let nodes = overridden_nodes("u", &[ElementId(1), ElementId(2)], &mesh, &fields);
        assert_eq!(nodes, vec![NodeId(1), NodeId(3), NodeId(6), NodeId(8)]);
    }
}
