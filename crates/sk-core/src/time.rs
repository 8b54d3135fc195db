//! Simulation time.
//!
//! Time is a monotonically non-decreasing integer `Tick` counter — the
//! sequencer's `timeNow`. There is no wall-clock mapping and no
//! floating-point arithmetic anywhere in the kernel (spec.md Non-goals):
//! schedule arithmetic over `Tick` is always exact.

use std::fmt;

/// An absolute simulation time index (the sequencer's `timeNow`).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Return the tick `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> Tick {
        Tick(self.0 + n)
    }

    /// Ticks elapsed from `earlier` to `self`.
    ///
    /// # Panics
    /// Panics in debug builds if `earlier > self`.
    #[inline]
    pub fn since(self, earlier: Tick) -> u64 {
        debug_assert!(earlier <= self, "since: {earlier:?} is after {self:?}");
        self.0 - earlier.0
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}
