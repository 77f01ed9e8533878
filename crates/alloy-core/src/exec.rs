//! Execute-on flags: the solve-loop points at which a UserObject runs.

use std::fmt;

/// A single point in the solve loop at which objects can be executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecFlag {
    /// Once, before the first time step.
    Initial,
    /// Every residual evaluation.
    Linear,
    /// Every Jacobian evaluation.
    Nonlinear,
    /// Start of every time step.
    TimestepBegin,
    /// End of every time step.
    TimestepEnd,
    /// Once, after the last time step.
    Final,
    /// Only when requested explicitly.
    Custom,
}

impl ExecFlag {
    /// Every flag, in solve-loop order.
    pub const ALL: [ExecFlag; 7] = [
        ExecFlag::Initial,
        ExecFlag::Linear,
        ExecFlag::Nonlinear,
        ExecFlag::TimestepBegin,
        ExecFlag::TimestepEnd,
        ExecFlag::Final,
        ExecFlag::Custom,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for ExecFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "INITIAL",
            Self::Linear => "LINEAR",
            Self::Nonlinear => "NONLINEAR",
            Self::TimestepBegin => "TIMESTEP_BEGIN",
            Self::TimestepEnd => "TIMESTEP_END",
            Self::Final => "FINAL",
            Self::Custom => "CUSTOM",
        };
        f.write_str(s)
    }
}

/// A set of [`ExecFlag`]s stored as a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExecFlags(u8);

impl ExecFlags {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set containing a single flag.
    pub fn only(flag: ExecFlag) -> Self {
        Self(flag.bit())
    }

    /// Add a flag (builder style).
    pub fn with(mut self, flag: ExecFlag) -> Self {
        self.0 |= flag.bit();
        self
    }

    /// Insert a flag in place.
    pub fn insert(&mut self, flag: ExecFlag) {
        self.0 |= flag.bit();
    }

    /// Whether the set contains `flag`.
    pub fn contains(&self, flag: ExecFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over the contained flags in solve-loop order.
    pub fn iter(&self) -> impl Iterator<Item = ExecFlag> + '_ {
        ExecFlag::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

impl FromIterator<ExecFlag> for ExecFlags {
    fn from_iter<I: IntoIterator<Item = ExecFlag>>(iter: I) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

impl fmt::Debug for ExecFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
