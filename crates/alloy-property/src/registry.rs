//! Per-problem table of declared material properties.
//!
//! A property is identified by its canonical name: the base name for the
//! property itself, `dF/dc` for a first derivative and `d^nF/dc1dc2…` for
//! higher orders. Each name maps to exactly one typed slot, numbered by a
//! dense [`PropertyId`] that the [`StatefulPropertyStore`] uses as its
//! column index.
//!
//! [`StatefulPropertyStore`]: crate::StatefulPropertyStore

use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use log::{debug, info};
use smallvec::SmallVec;

use alloy_core::PropertyId;

use crate::error::PropertyError;
use crate::store::{new_column, ColumnOps};

/// Bound for values stored in material properties.
pub trait PropertyValue: Clone + Default + Send + Sync + fmt::Debug + 'static {}

impl<T: Clone + Default + Send + Sync + fmt::Debug + 'static> PropertyValue for T {}

// ── Keys ───────────────────────────────────────────────────────────

/// A property name plus an ordered derivative chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    base: String,
    chain: SmallVec<[String; 3]>,
}

impl PropertyKey {
    /// The key of a base (non-derivative) property.
    pub fn base(name: &str) -> Self {
        Self {
            base: name.to_string(),
            chain: SmallVec::new(),
        }
    }

    /// The key of the derivative of `base` with respect to `vars`, in order.
    pub fn derivative<S: AsRef<str>>(base: &str, vars: &[S]) -> Self {
        Self {
            base: base.to_string(),
            chain: vars.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    /// Base property name.
    pub fn base_name(&self) -> &str {
        &self.base
    }

    /// Derivative order (0 for the base property).
    pub fn order(&self) -> usize {
        self.chain.len()
    }

    /// Canonical storage name.
    pub fn canonical_name(&self) -> String {
        match self.chain.len() {
            0 => self.base.clone(),
            1 => format!("d{}/d{}", self.base, self.chain[0]),
            n => {
                let mut name = format!("d^{n}{}/", self.base);
                for var in &self.chain {
                    name.push('d');
                    name.push_str(var);
                }
                name
            }
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

// ── Handles ────────────────────────────────────────────────────────

/// Typed reference to a declared property.
///
/// Handles are cheap to copy and carry the value type, so store accesses
/// through them need no runtime type lookup on the caller's side.
#[must_use]
pub struct PropertyHandle<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PropertyHandle<T> {
    pub(crate) fn new(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Dense id of the property.
    pub fn id(&self) -> PropertyId {
        self.id
    }
}

impl<T> Clone for PropertyHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PropertyHandle<T> {}

impl<T> PartialEq for PropertyHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for PropertyHandle<T> {}

impl<T> fmt::Debug for PropertyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyHandle<{}>({})", type_name::<T>(), self.id)
    }
}

// ── Registry ───────────────────────────────────────────────────────

struct Entry {
    id: PropertyId,
    key: PropertyKey,
    type_id: TypeId,
    type_name: &'static str,
    /// `None` while the property has only been requested.
    owner: Option<String>,
    requested_by: Vec<String>,
    stateful: bool,
    make_column: fn(String, bool) -> Box<dyn ColumnOps>,
}

/// Registry of every material property of a problem.
///
/// Open during construction; [`seal`](Self::seal) checks that every
/// requested property was declared and freezes the table.
#[derive(Default)]
pub struct PropertyRegistry {
    entries: IndexMap<String, Entry>,
    sealed: bool,
}

impl PropertyRegistry {
    /// Create an empty, open registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a base property owned by `owner`.
    ///
    /// Re-declaring with the same value type and owner returns the same
    /// handle; any other re-declaration fails with
    /// [`PropertyError::DuplicateDeclaration`].
    pub fn declare<T: PropertyValue>(
        &mut self,
        owner: &str,
        name: &str,
    ) -> Result<PropertyHandle<T>, PropertyError> {
        self.declare_key(owner, PropertyKey::base(name))
    }

    /// Declare the derivative of `base` with respect to `vars`, in order.
    /// An empty `vars` declares `base` itself.
    pub fn declare_derivative<T: PropertyValue, S: AsRef<str>>(
        &mut self,
        owner: &str,
        base: &str,
        vars: &[S],
    ) -> Result<PropertyHandle<T>, PropertyError> {
        self.declare_key(owner, PropertyKey::derivative(base, vars))
    }

    fn declare_key<T: PropertyValue>(
        &mut self,
        owner: &str,
        key: PropertyKey,
    ) -> Result<PropertyHandle<T>, PropertyError> {
        let name = key.canonical_name();
        if self.sealed {
            return Err(PropertyError::RegistrySealed { name });
        }
        let requested_type = type_name::<T>();

        if let Some(entry) = self.entries.get_mut(&name) {
            let same_type = entry.type_id == TypeId::of::<T>();
            match entry.owner.clone() {
                Some(existing) if existing == owner && same_type => {
                    return Ok(PropertyHandle::new(entry.id));
                }
                Some(existing) => {
                    return Err(PropertyError::DuplicateDeclaration {
                        name,
                        existing_owner: existing,
                        existing_type: entry.type_name,
                        owner: owner.to_string(),
                        requested_type,
                    });
                }
                // A request fixed the type before the declaration arrived.
                None if !same_type => {
                    return Err(PropertyError::TypeMismatch {
                        name,
                        declared: requested_type,
                        requested: entry.type_name,
                    });
                }
                None => {
                    entry.owner = Some(owner.to_string());
                    entry.key = key;
                    debug!("property '{name}' declared by '{owner}' (previously requested)");
                    return Ok(PropertyHandle::new(entry.id));
                }
            }
        }

        let id = self.push_entry::<T>(key, Some(owner.to_string()));
        debug!("property '{name}' declared by '{owner}' as {requested_type} (id {id})");
        Ok(PropertyHandle::new(id))
    }

    fn push_entry<T: PropertyValue>(
        &mut self,
        key: PropertyKey,
        owner: Option<String>,
    ) -> PropertyId {
        let id = PropertyId(self.entries.len() as u32);
        let name = key.canonical_name();
        self.entries.insert(
            name,
            Entry {
                id,
                key,
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                owner,
                requested_by: Vec::new(),
                stateful: false,
                make_column: new_column::<T>,
            },
        );
        id
    }

    /// Strict lookup of a declared property by canonical name.
    pub fn lookup<T: PropertyValue>(&self, name: &str) -> Result<PropertyHandle<T>, PropertyError> {
        let entry = match self.entries.get(name) {
            Some(entry) if entry.owner.is_some() => entry,
            _ => {
                return Err(PropertyError::UnknownProperty {
                    name: name.to_string(),
                    requested_by: None,
                })
            }
        };
        if entry.type_id != TypeId::of::<T>() {
            return Err(PropertyError::TypeMismatch {
                name: name.to_string(),
                declared: entry.type_name,
                requested: type_name::<T>(),
            });
        }
        Ok(PropertyHandle::new(entry.id))
    }

    /// Strict lookup of a derivative property.
    pub fn lookup_derivative<T: PropertyValue, S: AsRef<str>>(
        &self,
        base: &str,
        vars: &[S],
    ) -> Result<PropertyHandle<T>, PropertyError> {
        self.lookup(&PropertyKey::derivative(base, vars).canonical_name())
    }

    /// Reserve a property that may be declared later by another object.
    ///
    /// The returned handle is valid once the registry is sealed; sealing
    /// fails if no object ever declared the property.
    pub fn request<T: PropertyValue>(
        &mut self,
        requester: &str,
        name: &str,
    ) -> Result<PropertyHandle<T>, PropertyError> {
        if let Some(entry) = self.entries.get_mut(name) {
            if entry.type_id != TypeId::of::<T>() {
                return Err(PropertyError::TypeMismatch {
                    name: name.to_string(),
                    declared: entry.type_name,
                    requested: type_name::<T>(),
                });
            }
            if entry.owner.is_none() {
                entry.requested_by.push(requester.to_string());
            }
            return Ok(PropertyHandle::new(entry.id));
        }
        if self.sealed {
            return Err(PropertyError::UnknownProperty {
                name: name.to_string(),
                requested_by: Some(requester.to_string()),
            });
        }
        let id = self.push_entry::<T>(PropertyKey::base(name), None);
        if let Some(entry) = self.entries.get_mut(name) {
            entry.requested_by.push(requester.to_string());
        }
        debug!("property '{name}' requested by '{requester}' before declaration");
        Ok(PropertyHandle::new(id))
    }

    /// Flag a property as needing old and older history.
    pub fn mark_stateful<T>(&mut self, handle: PropertyHandle<T>) -> Result<(), PropertyError> {
        let sealed = self.sealed;
        let entry = self
            .entries
            .get_index_mut(handle.id().index())
            .map(|(_, e)| e)
            .ok_or(PropertyError::InvalidHandle { id: handle.id() })?;
        if sealed {
            return Err(PropertyError::RegistrySealed {
                name: entry.key.canonical_name(),
            });
        }
        entry.stateful = true;
        Ok(())
    }

    /// Check that every request was satisfied and freeze the registry.
    ///
    /// Sealing twice is a no-op.
    pub fn seal(&mut self) -> Result<(), PropertyError> {
        if self.sealed {
            return Ok(());
        }
        if let Some((name, entry)) = self.entries.iter().find(|(_, e)| e.owner.is_none()) {
            return Err(PropertyError::UnknownProperty {
                name: name.clone(),
                requested_by: entry.requested_by.first().cloned(),
            });
        }
        self.sealed = true;
        info!(
            "property registry sealed: {} properties, {} stateful",
            self.entries.len(),
            self.entries.values().filter(|e| e.stateful).count()
        );
        Ok(())
    }

    /// Whether [`seal`](Self::seal) succeeded.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of property slots (declared or requested).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical name of a property.
    pub fn name_of(&self, id: PropertyId) -> Option<&str> {
        self.entries.get_index(id.index()).map(|(name, _)| name.as_str())
    }

    /// Key (base name and derivative chain) of a property.
    pub fn key_of(&self, id: PropertyId) -> Option<&PropertyKey> {
        self.entries.get_index(id.index()).map(|(_, e)| &e.key)
    }

    /// Owner of a declared property.
    pub fn owner_of(&self, id: PropertyId) -> Option<&str> {
        self.entries
            .get_index(id.index())
            .and_then(|(_, e)| e.owner.as_deref())
    }

    /// Whether a property was marked stateful.
    pub fn is_stateful(&self, id: PropertyId) -> bool {
        self.entries
            .get_index(id.index())
            .is_some_and(|(_, e)| e.stateful)
    }

    /// Ids of every stateful property, ascending.
    pub fn stateful_ids(&self) -> Vec<PropertyId> {
        self.entries
            .values()
            .filter(|e| e.stateful)
            .map(|e| e.id)
            .collect()
    }

    /// Build one empty storage column per property, indexed by id.
    pub(crate) fn build_columns(&self) -> Vec<Box<dyn ColumnOps>> {
        self.entries
            .iter()
            .map(|(name, e)| (e.make_column)(name.clone(), e.stateful))
            .collect()
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("properties", &self.entries.keys().collect::<Vec<_>>())
            .field("sealed", &self.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        assert_eq!(PropertyKey::base("F").canonical_name(), "F");
        assert_eq!(PropertyKey::derivative("F", &["c"]).canonical_name(), "dF/dc");
        assert_eq!(
            PropertyKey::derivative("F", &["c", "eta"]).canonical_name(),
            "d^2F/dcdeta"
        );
        assert_eq!(
            PropertyKey::derivative("F", &["eta", "c"]).canonical_name(),
            "d^2F/detadc"
        );
    }

    #[test]
    fn ids_are_dense_in_declaration_order() {
        let mut reg = PropertyRegistry::new();
        let a = reg.declare::<f64>("mat", "a").unwrap();
        let b = reg.declare::<Vec<f64>>("mat", "b").unwrap();
        let da = reg.declare_derivative::<f64, _>("mat", "a", &["c"]).unwrap();
        assert_eq!(a.id(), PropertyId(0));
        assert_eq!(b.id(), PropertyId(1));
        assert_eq!(da.id(), PropertyId(2));
        assert_eq!(reg.name_of(PropertyId(2)), Some("da/dc"));
        assert_eq!(reg.key_of(PropertyId(2)).map(|k| k.order()), Some(1));
    }

    #[test]
    fn redeclaration_same_owner_and_type_is_idempotent() {
        let mut reg = PropertyRegistry::new();
        let first = reg.declare::<f64>("mat", "k").unwrap();
        let second = reg.declare::<f64>("mat", "k").unwrap();
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn redeclaration_with_other_type_fails() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>("mat", "k").unwrap();
        match reg.declare::<i32>("mat", "k") {
            Err(PropertyError::DuplicateDeclaration { name, .. }) => assert_eq!(name, "k"),
            other => panic!("expected DuplicateDeclaration, got {other:?}"),
        }
    }

    #[test]
    fn redeclaration_by_other_owner_fails() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>("mat_a", "k").unwrap();
        match reg.declare::<f64>("mat_b", "k") {
            Err(PropertyError::DuplicateDeclaration {
                existing_owner,
                owner,
                ..
            }) => {
                assert_eq!(existing_owner, "mat_a");
                assert_eq!(owner, "mat_b");
            }
            other => panic!("expected DuplicateDeclaration, got {other:?}"),
        }
    }

    #[test]
    fn empty_derivative_chain_is_the_base_property() {
        let mut reg = PropertyRegistry::new();
        let base = reg.declare::<f64>("mat", "F").unwrap();
        let none: [&str; 0] = [];
        let same = reg.declare_derivative::<f64, _>("mat", "F", &none).unwrap();
        assert_eq!(base, same);
    }

    #[test]
    fn lookup_errors() {
        let mut reg = PropertyRegistry::new();
        reg.declare::<f64>("mat", "k").unwrap();
        assert!(reg.lookup::<f64>("k").is_ok());
        match reg.lookup::<f64>("missing") {
            Err(PropertyError::UnknownProperty { name, .. }) => assert_eq!(name, "missing"),
            other => panic!("expected UnknownProperty, got {other:?}"),
        }
        match reg.lookup::<u8>("k") {
            Err(PropertyError::TypeMismatch { name, .. }) => assert_eq!(name, "k"),
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn forward_request_resolves_at_seal() {
        let mut reg = PropertyRegistry::new();
        let requested = reg.request::<f64>("kernel", "diffusivity").unwrap();
        assert!(reg.lookup::<f64>("diffusivity").is_err());
        let declared = reg.declare::<f64>("mat", "diffusivity").unwrap();
        assert_eq!(requested, declared);
        reg.seal().unwrap();
        assert!(reg.is_sealed());
        assert_eq!(reg.owner_of(declared.id()), Some("mat"));
    }

    #[test]
    fn unsatisfied_request_fails_seal_naming_requester() {
        let mut reg = PropertyRegistry::new();
        reg.request::<f64>("kernel", "diffusivity").unwrap();
        match reg.seal() {
            Err(PropertyError::UnknownProperty { name, requested_by }) => {
                assert_eq!(name, "diffusivity");
                assert_eq!(requested_by.as_deref(), Some("kernel"));
            }
            other => panic!("expected UnknownProperty, got {other:?}"),
        }
        assert!(!reg.is_sealed());
    }

    #[test]
    fn sealed_registry_rejects_declarations() {
        let mut reg = PropertyRegistry::new();
        let k = reg.declare::<f64>("mat", "k").unwrap();
        reg.seal().unwrap();
        assert!(matches!(
            reg.declare::<f64>("mat", "k"),
            Err(PropertyError::RegistrySealed { .. })
        ));
        assert!(matches!(
            reg.mark_stateful(k),
            Err(PropertyError::RegistrySealed { .. })
        ));
        assert!(reg.lookup::<f64>("k").is_ok());
    }

    #[test]
    fn stateful_marking() {
        let mut reg = PropertyRegistry::new();
        let a = reg.declare::<f64>("mat", "a").unwrap();
        let b = reg.declare::<f64>("mat", "b").unwrap();
        reg.mark_stateful(b).unwrap();
        assert!(!reg.is_stateful(a.id()));
        assert!(reg.is_stateful(b.id()));
        assert_eq!(reg.stateful_ids(), vec![b.id()]);
    }
}
