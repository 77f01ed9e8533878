//! Strongly-typed identifiers and sentinel values.

use std::fmt;

/// Identifies a mesh element.
///
/// Ids are global and stable across subdomain changes; they are only
/// retired when adaptivity coarsens the element away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ElementId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a mesh node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a subdomain (block) of the mesh.
///
/// Two values are reserved: [`SubdomainId::INVALID`] means "no subdomain"
/// (a policy returning it requests no change, and it stands for the
/// outside of the mesh in moving-boundary pairs) and [`SubdomainId::ANY`]
/// matches every subdomain in restriction lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubdomainId(pub u16);

impl SubdomainId {
    /// Sentinel for "no subdomain".
    pub const INVALID: SubdomainId = SubdomainId(u16::MAX);

    /// Wildcard matching every subdomain.
    pub const ANY: SubdomainId = SubdomainId(u16::MAX - 1);

    /// Whether this id names a real subdomain (neither sentinel).
    pub fn is_valid(self) -> bool {
        self != Self::INVALID && self != Self::ANY
    }
}

impl fmt::Display for SubdomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INVALID => write!(f, "INVALID"),
            Self::ANY => write!(f, "ANY"),
            Self(v) => write!(f, "{v}"),
        }
    }
}

impl From<u16> for SubdomainId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Identifies a boundary (side set and node set share the id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(pub u16);

impl BoundaryId {
    /// Sentinel for "no boundary".
    pub const INVALID: BoundaryId = BoundaryId(u16::MAX);
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for BoundaryId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Dense per-problem index of a declared material property.
///
/// Assigned sequentially at declaration; `PropertyId(n)` is the n-th
/// property of the registry and doubles as the column index of the
/// property store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl PropertyId {
    /// The id as a dense array index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PropertyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Local side index of an element face.
pub type Side = u16;

/// Index of a worker thread inside an execution pass. Thread 0 owns the
/// combined accumulator after the join phase.
pub type ThreadIndex = usize;
