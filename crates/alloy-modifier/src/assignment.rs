//! Per-pass element → `(old, new)` subdomain assignments.

use indexmap::IndexMap;

use alloy_core::{ElementId, SubdomainId};

use crate::error::MutationError;

/// A pending subdomain change of one element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubdomainChange {
    /// Subdomain before the change.
    pub from: SubdomainId,
    /// Subdomain after the change.
    pub to: SubdomainId,
}

/// Elements to move in the current pass.
///
/// Never holds no-op entries: [`record`](Self::record) drops changes whose
/// target equals the current subdomain or is [`SubdomainId::INVALID`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementSubdomainAssignment {
    changes: IndexMap<ElementId, SubdomainChange>,
}

impl ElementSubdomainAssignment {
    /// Empty assignment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change. Returns `Ok(false)` for a no-op change.
    ///
    /// Recording the same target twice is accepted; a different target
    /// for an already recorded element is a
    /// [`MutationError::ConflictingAssignment`].
    pub fn record(
        &mut self,
        elem: ElementId,
        from: SubdomainId,
        to: SubdomainId,
    ) -> Result<bool, MutationError> {
        if to == from || to == SubdomainId::INVALID {
            return Ok(false);
        }
        match self.changes.get(&elem) {
            Some(existing) if existing.to != to => Err(MutationError::ConflictingAssignment {
                element: elem,
                first: existing.to,
                second: to,
            }),
            Some(_) => Ok(false),
            None => {
                self.changes.insert(elem, SubdomainChange { from, to });
                Ok(true)
            }
        }
    }

    /// Fold another thread's assignment into this one.
    pub fn merge(&mut self, other: &Self) -> Result<(), MutationError> {
        for (elem, change) in &other.changes {
            self.record(*elem, change.from, change.to)?;
        }
        Ok(())
    }

    /// Order entries by element id.
    pub fn sort(&mut self) {
        self.changes.sort_keys();
    }

    /// The same moves in the opposite direction.
    pub fn reversed(&self) -> Self {
        let changes = self
            .changes
            .iter()
            .map(|(elem, c)| {
                (
                    *elem,
                    SubdomainChange {
                        from: c.to,
                        to: c.from,
                    },
                )
            })
            .collect();
        Self { changes }
    }

    /// The recorded change of one element.
    pub fn get(&self, elem: ElementId) -> Option<&SubdomainChange> {
        self.changes.get(&elem)
    }

    /// Recorded changes in insertion (or sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementId, SubdomainChange)> + '_ {
        self.changes.iter().map(|(e, c)| (*e, *c))
    }

    /// Moved elements.
    pub fn elements(&self) -> Vec<ElementId> {
        self.changes.keys().copied().collect()
    }

    /// Number of moved elements.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing moves.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.changes.clear();
    }
}
