//! Published UserObject values.
//!
//! Every object has one entry. An entry is `Pending` from the start of
//! the object's pass until it finalizes, `Aborted` when the pass fails,
//! and `Ready` once a value is published. Only `Ready` entries can be
//! read.

use indexmap::IndexMap;

use alloy_core::ExecutionError;
use alloy_userobject::{UserObjectValue, ValueLookup};

/// Publication state of one object's value.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueStatus {
    /// Registered, never executed.
    Unset,
    /// Executing; the previous value is no longer valid.
    Pending,
    /// Finalized and published.
    Ready(UserObjectValue),
    /// Finalized without producing a value.
    Empty,
    /// The last pass failed.
    Aborted,
}

/// Values of all objects, keyed by name in registration order.
#[derive(Clone, Debug, Default)]
pub struct ValueStore {
    entries: IndexMap<String, ValueStatus>,
}

impl ValueStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry for `object`.
    pub fn register(&mut self, object: &str) {
        self.entries
            .entry(object.to_string())
            .or_insert(ValueStatus::Unset);
    }

    /// Invalidate the value of `object` for the duration of its pass.
    pub fn mark_pending(&mut self, object: &str) {
        self.set(object, ValueStatus::Pending);
    }

    /// Record a failed pass.
    pub fn mark_aborted(&mut self, object: &str) {
        self.set(object, ValueStatus::Aborted);
    }

    /// Publish the result of a finalized pass.
    pub fn publish(&mut self, object: &str, value: Option<UserObjectValue>) {
        let status = match value {
            Some(v) => ValueStatus::Ready(v),
            None => ValueStatus::Empty,
        };
        self.set(object, status);
    }

    fn set(&mut self, object: &str, status: ValueStatus) {
        if let Some(entry) = self.entries.get_mut(object) {
            *entry = status;
        }
    }

    /// Current status of an object's value.
    pub fn status(&self, object: &str) -> Option<&ValueStatus> {
        self.entries.get(object)
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no object is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ValueLookup for ValueStore {
    fn value(&self, object: &str) -> Result<&UserObjectValue, ExecutionError> {
        match self.entries.get(object) {
            Some(ValueStatus::Ready(v)) => Ok(v),
            Some(_) => Err(ExecutionError::NotFinalized {
                object: object.to_string(),
            }),
            None => Err(ExecutionError::UnknownUserObject {
                name: object.to_string(),
            }),
        }
    }
}

/// A [`ValueLookup`] that only admits an object's declared dependencies.
pub struct DeclaredLookup<'a> {
    store: &'a ValueStore,
    reader: &'a str,
    declared: &'a [String],
}

impl<'a> DeclaredLookup<'a> {
    /// Restrict `store` to the values `reader` declared.
    pub fn new(store: &'a ValueStore, reader: &'a str, declared: &'a [String]) -> Self {
        Self {
            store,
            reader,
            declared,
        }
    }
}

impl ValueLookup for DeclaredLookup<'_> {
    fn value(&self, object: &str) -> Result<&UserObjectValue, ExecutionError> {
        if !self.declared.iter().any(|d| d == object) {
            return Err(ExecutionError::UndeclaredDependency {
                object: self.reader.to_string(),
                dependency: object.to_string(),
            });
        }
        self.store.value(object)
    }
}
