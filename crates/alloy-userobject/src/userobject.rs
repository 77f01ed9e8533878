//! The [`UserObject`] trait and the entity types it executes on.
//!
//! A UserObject accumulates a result over a set of mesh entities. The
//! engine drives every object through the same lifecycle on each pass:
//!
//! 1. `initialize()` on every thread copy,
//! 2. `execute()` once per entity of that copy's chunk,
//! 3. `thread_join()` folding copies 1..N into copy 0 in thread order,
//! 4. `finalize()` once on copy 0, then `value()` is published.

use std::any::Any;
use std::fmt;

use alloy_core::{
    BoundaryId, ElementId, ExecFlag, ExecFlags, NodeId, Side, SubdomainId, UserObjectError,
};

use crate::context::{ExecuteContext, FinalizeContext};

/// The kind of entity a UserObject iterates over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    /// Active elements.
    Element,
    /// Element sides on boundaries.
    Side,
    /// Mesh nodes.
    Nodal,
    /// A single execution with no entity, on thread 0.
    General,
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Element => "element",
            Self::Side => "side",
            Self::Nodal => "nodal",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// One unit of work handed to [`UserObject::execute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    /// An active element.
    Element(ElementId),
    /// A side of an element on a boundary.
    Side {
        /// The element owning the side.
        element: ElementId,
        /// Local side index.
        side: Side,
        /// Boundary the side belongs to.
        boundary: BoundaryId,
    },
    /// A mesh node.
    Node(NodeId),
    /// The single execution of a general object.
    General,
}

/// Blocks and boundaries an object is limited to. Empty lists mean
/// unrestricted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Restriction {
    /// Subdomains the object runs on.
    pub blocks: Vec<SubdomainId>,
    /// Boundaries the object runs on.
    pub boundaries: Vec<BoundaryId>,
}

impl Restriction {
    /// Restrict to the given blocks.
    pub fn blocks(blocks: impl IntoIterator<Item = SubdomainId>) -> Self {
        Self {
            blocks: blocks.into_iter().collect(),
            boundaries: Vec::new(),
        }
    }

    /// Restrict to the given boundaries.
    pub fn boundaries(boundaries: impl IntoIterator<Item = BoundaryId>) -> Self {
        Self {
            blocks: Vec::new(),
            boundaries: boundaries.into_iter().collect(),
        }
    }

    /// Whether a subdomain passes the block restriction.
    pub fn has_block(&self, block: SubdomainId) -> bool {
        self.blocks.is_empty()
            || self
                .blocks
                .iter()
                .any(|b| *b == block || *b == SubdomainId::ANY)
    }
}

/// Result a UserObject publishes after finalizing.
#[derive(Clone, Debug, PartialEq)]
pub enum UserObjectValue {
    /// A single number.
    Scalar(f64),
    /// A list of numbers.
    Vector(Vec<f64>),
}

impl UserObjectValue {
    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Vector(_) => None,
        }
    }

    /// The vector, if this is one.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Self::Scalar(_) => None,
            Self::Vector(v) => Some(v),
        }
    }
}

/// A pluggable computation executed over mesh entities with thread-local
/// accumulation.
///
/// # Contract
///
/// - `execute()` only touches the copy's own state; the mesh, fields and
///   properties are read-only through [`ExecuteContext`].
/// - `thread_join()` must be associative so the result depends only on
///   the chunk order, which the engine keeps fixed.
/// - `finalize()` runs exactly once per pass, on copy 0, and is the only
///   place allowed to mutate collaborators.
///
/// # Examples
///
/// ```
/// use std::any::Any;
/// use alloy_core::UserObjectError;
/// use alloy_userobject::{
///     join_as, Entity, EntityCategory, ExecuteContext, FinalizeContext, UserObject,
///     UserObjectValue,
/// };
///
/// #[derive(Clone)]
/// struct ElementCount {
///     n: usize,
/// }
///
/// impl UserObject for ElementCount {
///     fn name(&self) -> &str { "ElementCount" }
///     fn category(&self) -> EntityCategory { EntityCategory::Element }
///     fn clone_for_thread(&self) -> Box<dyn UserObject> { Box::new(self.clone()) }
///     fn initialize(&mut self) { self.n = 0; }
///     fn execute(&mut self, _: &Entity, _: &ExecuteContext<'_>) -> Result<(), UserObjectError> {
///         self.n += 1;
///         Ok(())
///     }
///     fn thread_join(&mut self, other: &dyn UserObject) -> Result<(), UserObjectError> {
///         self.n += join_as::<Self>(self.name(), other)?.n;
///         Ok(())
///     }
///     fn finalize(&mut self, _: &mut FinalizeContext<'_>) -> Result<(), UserObjectError> {
///         Ok(())
///     }
///     fn value(&self) -> Option<UserObjectValue> {
///         Some(UserObjectValue::Scalar(self.n as f64))
///     }
///     fn as_any(&self) -> &dyn Any { self }
/// }
///
/// let uo = ElementCount { n: 0 };
/// assert_eq!(uo.category(), EntityCategory::Element);
/// ```
pub trait UserObject: Send + 'static {
    /// Unique name, used for dependency resolution and error reporting.
    fn name(&self) -> &str;

    /// Entity category the object iterates over.
    fn category(&self) -> EntityCategory;

    /// Names of the objects whose values this object reads.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Blocks and boundaries the object is limited to.
    fn restriction(&self) -> Restriction {
        Restriction::default()
    }

    /// Solve-loop points at which the object runs.
    fn execute_on(&self) -> ExecFlags {
        ExecFlags::only(ExecFlag::TimestepEnd)
    }

    /// A fresh copy for another worker thread. Shared configuration may
    /// be cloned; accumulators are reset by `initialize()`.
    fn clone_for_thread(&self) -> Box<dyn UserObject>;

    /// Reset per-pass accumulators.
    fn initialize(&mut self);

    /// Accumulate the contribution of one entity.
    fn execute(&mut self, entity: &Entity, ctx: &ExecuteContext<'_>)
        -> Result<(), UserObjectError>;

    /// Fold another thread's copy into this one.
    fn thread_join(&mut self, other: &dyn UserObject) -> Result<(), UserObjectError>;

    /// Complete the pass: cross-process reduction and collaborator
    /// updates.
    fn finalize(&mut self, ctx: &mut FinalizeContext<'_>) -> Result<(), UserObjectError>;

    /// Published result, if the object produces one.
    fn value(&self) -> Option<UserObjectValue> {
        None
    }

    /// Hook run on copy 0 at the start of each time step.
    fn timestep_setup(
        &mut self,
        _time_step: u64,
        _ctx: &mut FinalizeContext<'_>,
    ) -> Result<(), UserObjectError> {
        Ok(())
    }

    /// Upcast for [`join_as`].
    fn as_any(&self) -> &dyn Any;
}

/// Downcast a thread copy handed to [`UserObject::thread_join`].
///
/// Fails with [`UserObjectError::JoinTypeMismatch`] naming `object` when
/// `other` is not a `T`.
pub fn join_as<'o, T: UserObject>(
    object: &str,
    other: &'o dyn UserObject,
) -> Result<&'o T, UserObjectError> {
    other
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| UserObjectError::JoinTypeMismatch {
            object: object.to_string(),
        })
}
