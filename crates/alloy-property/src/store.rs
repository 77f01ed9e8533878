//! Per-element, per-qp storage of material property values with
//! current/old/older history.
//!
//! Storage is organized as one column per declared property, indexed by
//! [`PropertyId`](alloy_core::PropertyId). Each column maps live elements
//! to their qp buffers. A stateful column keeps two extra buffers per
//! element; [`StatefulPropertyStore::shift`] rotates them at the end of a
//! time step, reusing the oldest allocation instead of reallocating.

use std::any::Any;

use indexmap::IndexMap;
use log::debug;

use alloy_core::ElementId;

use crate::error::PropertyError;
use crate::layout::QpLayout;
use crate::registry::{PropertyHandle, PropertyRegistry, PropertyValue};

/// Function computing the initial value of a stateful property at
/// `(element, qp)`.
pub type StatefulInitializer<T> = Box<dyn Fn(ElementId, usize) -> T + Send + Sync>;

// ── Columns ────────────────────────────────────────────────────────

/// Type-erased operations every column supports.
pub(crate) trait ColumnOps: Send + Sync {
    fn name(&self) -> &str;
    fn is_stateful(&self) -> bool;
    fn shift(&mut self) -> usize;
    fn reinit(&mut self, elems: &[ElementId], layout: &QpLayout) -> Result<(), PropertyError>;
    fn remove(&mut self, elems: &[ElementId]) -> usize;
    fn element_count(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Slot<T> {
    current: Vec<T>,
    old: Option<Vec<T>>,
    older: Option<Vec<T>>,
}

impl<T: PropertyValue> Slot<T> {
    fn new(n_qp: usize) -> Self {
        Self {
            current: vec![T::default(); n_qp],
            old: None,
            older: None,
        }
    }
}

struct TypedColumn<T: PropertyValue> {
    name: String,
    stateful: bool,
    slots: IndexMap<ElementId, Slot<T>>,
    initializer: Option<StatefulInitializer<T>>,
}

pub(crate) fn new_column<T: PropertyValue>(name: String, stateful: bool) -> Box<dyn ColumnOps> {
    Box::new(TypedColumn::<T> {
        name,
        stateful,
        slots: IndexMap::new(),
        initializer: None,
    })
}

impl<T: PropertyValue> TypedColumn<T> {
    fn check_qp(&self, elem: ElementId, qp: usize, n_qp: usize) -> Result<(), PropertyError> {
        if qp >= n_qp {
            return Err(PropertyError::QpOutOfRange {
                name: self.name.clone(),
                element: elem,
                qp,
                n_qp,
            });
        }
        Ok(())
    }

    fn history(
        &self,
        elem: ElementId,
        qp: usize,
        pick: fn(&Slot<T>) -> Option<&Vec<T>>,
    ) -> Result<&T, PropertyError> {
        if !self.stateful {
            return Err(PropertyError::NotStateful {
                name: self.name.clone(),
            });
        }
        let buf = self
            .slots
            .get(&elem)
            .and_then(pick)
            .ok_or_else(|| PropertyError::UninitializedState {
                name: self.name.clone(),
                element: elem,
            })?;
        self.check_qp(elem, qp, buf.len())?;
        Ok(&buf[qp])
    }
}

impl<T: PropertyValue> ColumnOps for TypedColumn<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_stateful(&self) -> bool {
        self.stateful
    }

    fn shift(&mut self) -> usize {
        if !self.stateful {
            return 0;
        }
        for slot in self.slots.values_mut() {
            let mut recycled = slot.older.take().unwrap_or_default();
            recycled.clone_from(&slot.current);
            slot.older = slot.old.take();
            slot.old = Some(recycled);
        }
        self.slots.len()
    }

    fn reinit(&mut self, elems: &[ElementId], layout: &QpLayout) -> Result<(), PropertyError> {
        let init = self
            .initializer
            .as_ref()
            .ok_or_else(|| PropertyError::NoInitializer {
                name: self.name.clone(),
            })?;
        for &elem in elems {
            let n_qp = self
                .slots
                .get(&elem)
                .map_or_else(|| layout.qp_count(elem), |s| s.current.len());
            let values: Vec<T> = (0..n_qp).map(|qp| init(elem, qp)).collect();
            let slot = self.slots.entry(elem).or_insert_with(|| Slot::new(n_qp));
            if self.stateful {
                slot.old = Some(values.clone());
                slot.older = Some(values.clone());
            }
            slot.current = values;
        }
        Ok(())
    }

    fn remove(&mut self, elems: &[ElementId]) -> usize {
        elems
            .iter()
            .filter(|e| self.slots.swap_remove(*e).is_some())
            .count()
    }

    fn element_count(&self) -> usize {
        self.slots.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Store ──────────────────────────────────────────────────────────

/// Material property values of a problem.
///
/// Built from a [`PropertyRegistry`]; one column per property, in id
/// order. Reads through `&self` are safe from many threads at once; all
/// writes happen through `&mut self` in serial phases.
pub struct StatefulPropertyStore {
    columns: Vec<Box<dyn ColumnOps>>,
    layout: QpLayout,
}

impl StatefulPropertyStore {
    /// Create empty storage for every property in `registry`.
    pub fn new(registry: &PropertyRegistry, layout: QpLayout) -> Self {
        Self {
            columns: registry.build_columns(),
            layout,
        }
    }

    /// The qp layout used to size new element buffers.
    pub fn layout(&self) -> &QpLayout {
        &self.layout
    }

    /// Number of property columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the store has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn column<T: PropertyValue>(
        &self,
        handle: PropertyHandle<T>,
    ) -> Result<&TypedColumn<T>, PropertyError> {
        self.columns
            .get(handle.id().index())
            .and_then(|c| c.as_any().downcast_ref::<TypedColumn<T>>())
            .ok_or(PropertyError::InvalidHandle { id: handle.id() })
    }

    fn column_mut<T: PropertyValue>(
        &mut self,
        handle: PropertyHandle<T>,
    ) -> Result<&mut TypedColumn<T>, PropertyError> {
        self.columns
            .get_mut(handle.id().index())
            .and_then(|c| c.as_any_mut().downcast_mut::<TypedColumn<T>>())
            .ok_or(PropertyError::InvalidHandle { id: handle.id() })
    }

    /// Mutable access to the current value, allocating the element's
    /// buffers on first touch.
    pub fn value_at<T: PropertyValue>(
        &mut self,
        handle: PropertyHandle<T>,
        elem: ElementId,
        qp: usize,
    ) -> Result<&mut T, PropertyError> {
        let n_default = self.layout.qp_count(elem);
        let column = self.column_mut(handle)?;
        let n_qp = column
            .slots
            .get(&elem)
            .map_or(n_default, |s| s.current.len());
        column.check_qp(elem, qp, n_qp)?;
        let slot = column
            .slots
            .entry(elem)
            .or_insert_with(|| Slot::new(n_qp));
        Ok(&mut slot.current[qp])
    }

    /// Read-only view of the current value.
    pub fn current_value<T: PropertyValue>(
        &self,
        handle: PropertyHandle<T>,
        elem: ElementId,
        qp: usize,
    ) -> Result<&T, PropertyError> {
        let column = self.column(handle)?;
        let slot = column
            .slots
            .get(&elem)
            .ok_or_else(|| PropertyError::UninitializedState {
                name: column.name.clone(),
                element: elem,
            })?;
        column.check_qp(elem, qp, slot.current.len())?;
        Ok(&slot.current[qp])
    }

    /// Value at the end of the previous time step.
    pub fn old_value_at<T: PropertyValue>(
        &self,
        handle: PropertyHandle<T>,
        elem: ElementId,
        qp: usize,
    ) -> Result<&T, PropertyError> {
        self.column(handle)?.history(elem, qp, |s| s.old.as_ref())
    }

    /// Value at the end of the time step before the previous one.
    pub fn older_value_at<T: PropertyValue>(
        &self,
        handle: PropertyHandle<T>,
        elem: ElementId,
        qp: usize,
    ) -> Result<&T, PropertyError> {
        self.column(handle)?.history(elem, qp, |s| s.older.as_ref())
    }

    /// Set current, old and older at one qp to `value`.
    pub fn init_stateful<T: PropertyValue>(
        &mut self,
        handle: PropertyHandle<T>,
        elem: ElementId,
        qp: usize,
        value: T,
    ) -> Result<(), PropertyError> {
        let n_default = self.layout.qp_count(elem);
        let column = self.column_mut(handle)?;
        if !column.stateful {
            return Err(PropertyError::NotStateful {
                name: column.name.clone(),
            });
        }
        let n_qp = column
            .slots
            .get(&elem)
            .map_or(n_default, |s| s.current.len());
        column.check_qp(elem, qp, n_qp)?;
        let slot = column
            .slots
            .entry(elem)
            .or_insert_with(|| Slot::new(n_qp));
        let current = &slot.current;
        let old = slot.old.get_or_insert_with(|| current.clone());
        old[qp] = value.clone();
        let older = slot.older.get_or_insert_with(|| current.clone());
        older[qp] = value.clone();
        slot.current[qp] = value;
        Ok(())
    }

    /// Register the function used by [`reinit_range`](Self::reinit_range)
    /// and [`reinit_all_stateful`](Self::reinit_all_stateful).
    pub fn set_initializer<T: PropertyValue>(
        &mut self,
        handle: PropertyHandle<T>,
        init: impl Fn(ElementId, usize) -> T + Send + Sync + 'static,
    ) -> Result<(), PropertyError> {
        self.column_mut(handle)?.initializer = Some(Box::new(init));
        Ok(())
    }

    /// Re-seed one property on exactly `elems` from its initializer.
    ///
    /// Stateful properties get all three buffers set; other properties
    /// only their current buffer.
    pub fn reinit_range<T: PropertyValue>(
        &mut self,
        elems: &[ElementId],
        handle: PropertyHandle<T>,
    ) -> Result<(), PropertyError> {
        let column = self
            .columns
            .get_mut(handle.id().index())
            .ok_or(PropertyError::InvalidHandle { id: handle.id() })?;
        column.reinit(elems, &self.layout)
    }

    /// Re-seed every stateful property on exactly `elems`.
    pub fn reinit_all_stateful(&mut self, elems: &[ElementId]) -> Result<(), PropertyError> {
        if elems.is_empty() {
            return Ok(());
        }
        let mut count = 0;
        for column in self.columns.iter_mut().filter(|c| c.is_stateful()) {
            column.reinit(elems, &self.layout)?;
            count += 1;
        }
        debug!(
            "reinitialized {count} stateful properties on {} elements",
            elems.len()
        );
        Ok(())
    }

    /// Rotate history: older takes old, old takes current, for every
    /// stateful property on every live element. Current is unchanged.
    pub fn shift(&mut self) {
        let slots: usize = self.columns.iter_mut().map(|c| c.shift()).sum();
        debug!("shifted stateful property history ({slots} element slots)");
    }

    /// Drop all storage of removed elements.
    pub fn remove_elements(&mut self, elems: &[ElementId]) {
        let mut dropped = 0;
        for column in &mut self.columns {
            let n = column.remove(elems);
            if n > 0 {
                debug!("dropped {n} element slots of '{}'", column.name());
            }
            dropped += n;
        }
        if dropped > 0 {
            debug!("removed {} elements from property storage", elems.len());
        }
    }

    /// Number of elements holding storage for a property.
    pub fn element_count<T: PropertyValue>(
        &self,
        handle: PropertyHandle<T>,
    ) -> Result<usize, PropertyError> {
        Ok(self.column(handle)?.element_count())
    }
}

impl std::fmt::Debug for StatefulPropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulPropertyStore")
            .field(
                "columns",
                &self.columns.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("layout", &self.layout)
            .finish()
    }
}
