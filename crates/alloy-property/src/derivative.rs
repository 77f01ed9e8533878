//! Derivative bookkeeping for materials that publish a property together
//! with its partial derivatives.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::PropertyError;
use crate::registry::{PropertyHandle, PropertyRegistry, PropertyValue};

/// Highest derivative order a table can hold.
pub const MAX_DERIVATIVE_ORDER: usize = 3;

type Combo = SmallVec<[usize; MAX_DERIVATIVE_ORDER]>;

/// Handles of a base property and all of its symmetric derivatives up to
/// some order.
///
/// Mixed derivatives are stored once: `d^2F/dadb` and `d^2F/dbda` share a
/// slot, named with the variables in the order they appear in `vars`.
#[derive(Debug)]
pub struct DerivativeTable<T> {
    base: PropertyHandle<T>,
    vars: Vec<String>,
    max_order: usize,
    handles: IndexMap<Combo, PropertyHandle<T>>,
}

impl<T: PropertyValue> DerivativeTable<T> {
    /// Declare `base` and every derivative with respect to `vars` up to
    /// `max_order` (clamped to [`MAX_DERIVATIVE_ORDER`]).
    pub fn build<S: AsRef<str>>(
        registry: &mut PropertyRegistry,
        owner: &str,
        base: &str,
        vars: &[S],
        max_order: usize,
    ) -> Result<Self, PropertyError> {
        let vars: Vec<String> = vars.iter().map(|v| v.as_ref().to_string()).collect();
        let max_order = max_order.min(MAX_DERIVATIVE_ORDER);
        let base_handle = registry.declare::<T>(owner, base)?;

        let mut handles = IndexMap::new();
        let mut combos: Vec<Combo> = Vec::new();
        for order in 1..=max_order {
            non_decreasing(vars.len(), order, &mut Combo::new(), &mut combos);
        }
        for combo in combos {
            let chain: Vec<&str> = combo.iter().map(|&i| vars[i].as_str()).collect();
            let handle = registry.declare_derivative::<T, _>(owner, base, &chain)?;
            handles.insert(combo, handle);
        }

        Ok(Self {
            base: base_handle,
            vars,
            max_order,
            handles,
        })
    }

    /// Handle of the base property.
    pub fn base(&self) -> PropertyHandle<T> {
        self.base
    }

    /// Coupled variables, in declaration order.
    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Highest order held by the table.
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Handle of the derivative with respect to the variables at
    /// `indices` (any order). An empty slice yields the base property.
    pub fn derivative(&self, indices: &[usize]) -> Option<PropertyHandle<T>> {
        if indices.is_empty() {
            return Some(self.base);
        }
        let mut key: Combo = indices.iter().copied().collect();
        key.sort_unstable();
        self.handles.get(&key).copied()
    }

    /// `dF/dv_i`.
    pub fn first(&self, i: usize) -> Option<PropertyHandle<T>> {
        self.derivative(&[i])
    }

    /// `d^2F/dv_i dv_j`.
    pub fn second(&self, i: usize, j: usize) -> Option<PropertyHandle<T>> {
        self.derivative(&[i, j])
    }

    /// `d^3F/dv_i dv_j dv_k`.
    pub fn third(&self, i: usize, j: usize, k: usize) -> Option<PropertyHandle<T>> {
        self.derivative(&[i, j, k])
    }

    /// Number of derivative slots (excluding the base property).
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the table holds no derivatives.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Push every non-decreasing index sequence of length `order` over
/// `0..n_vars` onto `out`, lexicographically.
fn non_decreasing(n_vars: usize, order: usize, prefix: &mut Combo, out: &mut Vec<Combo>) {
    if prefix.len() == order {
        out.push(prefix.clone());
        return;
    }
    let start = prefix.last().copied().unwrap_or(0);
    for i in start..n_vars {
        prefix.push(i);
        non_decreasing(n_vars, order, prefix, out);
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_count_matches_symmetric_combinations() {
        let mut reg = PropertyRegistry::new();
        let table =
            DerivativeTable::<f64>::build(&mut reg, "free_energy", "F", &["c", "eta"], 3).unwrap();
        // 2 first + 3 second + 4 third
        assert_eq!(table.len(), 9);
        assert_eq!(reg.len(), 10);
        assert_eq!(table.max_order(), 3);
    }

    #[test]
    fn mixed_derivatives_share_a_slot() {
        let mut reg = PropertyRegistry::new();
        let table =
            DerivativeTable::<f64>::build(&mut reg, "free_energy", "F", &["c", "eta"], 2).unwrap();
        assert_eq!(table.second(0, 1), table.second(1, 0));
        let mixed = table.second(1, 0).unwrap();
        assert_eq!(reg.name_of(mixed.id()), Some("d^2F/dcdeta"));
        assert_eq!(
            reg.lookup_derivative::<f64, _>("F", &["c", "eta"]).unwrap(),
            mixed
        );
        assert!(table.third(0, 0, 0).is_none());
    }

    #[test]
    fn order_is_clamped_and_base_is_reachable() {
        let mut reg = PropertyRegistry::new();
        let table = DerivativeTable::<f64>::build(&mut reg, "mat", "F", &["c"], 7).unwrap();
        assert_eq!(table.max_order(), MAX_DERIVATIVE_ORDER);
        assert_eq!(table.derivative(&[]), Some(table.base()));
        assert_eq!(reg.name_of(table.third(0, 0, 0).unwrap().id()), Some("d^3F/dcdcdc"));
        assert_eq!(reg.name_of(table.first(0).unwrap().id()), Some("dF/dc"));
    }

    #[test]
    fn conflicting_owner_is_rejected() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>("other", "dF/dc").unwrap();
        assert!(matches!(
            DerivativeTable::<f64>::build(&mut reg, "mat", "F", &["c"], 1),
            Err(PropertyError::DuplicateDeclaration { .. })
        ));
    }
}
