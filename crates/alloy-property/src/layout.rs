//! Quadrature-point counts per element.

use indexmap::IndexMap;

use alloy_core::ElementId;

/// Number of quadrature points each element carries.
///
/// Property storage for an element is sized from this layout the first
/// time the element is touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QpLayout {
    /// Every element has the same number of qps.
    Uniform(usize),
    /// Per-element counts with a fallback for unlisted elements.
    PerElement {
        /// Count used for elements not in `counts`.
        default: usize,
        /// Explicit counts.
        counts: IndexMap<ElementId, usize>,
    },
}

impl QpLayout {
    /// Number of qps on `elem`.
    pub fn qp_count(&self, elem: ElementId) -> usize {
        match self {
            Self::Uniform(n) => *n,
            Self::PerElement { default, counts } => counts.get(&elem).copied().unwrap_or(*default),
        }
    }
}

impl Default for QpLayout {
    fn default() -> Self {
        Self::Uniform(1)
    }
}
