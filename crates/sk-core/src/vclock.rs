//! Vector clocks.
//!
//! Each rank owns one [`VectorClock`] sized to the number of ranks in the
//! simulation. `merge` is pointwise max; `before`/`after` establish
//! happens-before across ranks; `incr` advances only the owning rank's own
//! component.

use std::fmt;

/// A per-rank vector clock.
///
/// `vec[r]` is this rank's best-known count of events on rank `r`;
/// `vec[rank]` is this rank's own event count, incremented by [`incr`]
/// exactly once per communication cycle.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VectorClock {
    rank: u32,
    vec: Vec<u32>,
}

impl VectorClock {
    /// A zeroed clock for `rank` among `comm_size` total ranks.
    pub fn new(comm_size: usize, rank: u32) -> Self {
        Self { rank, vec: vec![0; comm_size] }
    }

    /// Reconstruct a clock from its raw component vector (e.g. after
    /// deserializing a wire chunk's leading vector-clock field).
    pub fn from_vec(rank: u32, vec: Vec<u32>) -> Self {
        Self { rank, vec }
    }

    #[inline]
    pub fn rank(&self) -> u32 {
        self.rank
    }

    #[inline]
    pub fn components(&self) -> &[u32] {
        &self.vec
    }

    /// This rank's own component — the "cycle" number used by the done
    /// signal.
    #[inline]
    pub fn own(&self) -> u32 {
        self.vec[self.rank as usize]
    }

    /// Advance this rank's own component by one.
    #[inline]
    pub fn incr(&mut self) {
        self.vec[self.rank as usize] += 1;
    }

    /// Pointwise max merge with a foreign clock. Does not increment the
    /// local component.
    pub fn merge(&mut self, foreign: &[u32]) {
        debug_assert_eq!(self.vec.len(), foreign.len());
        for (mine, other) in self.vec.iter_mut().zip(foreign) {
            *mine = (*mine).max(*other);
        }
    }

    /// Largest component.
    pub fn max(&self) -> u32 {
        self.vec.iter().copied().max().unwrap_or(0)
    }

    /// Smallest component.
    pub fn min(&self) -> u32 {
        self.vec.iter().copied().min().unwrap_or(0)
    }

    /// `true` iff `self <= other` componentwise and `self != other`.
    pub fn before(&self, other: &VectorClock) -> bool {
        le_componentwise(&self.vec, &other.vec) && self.vec != other.vec
    }

    /// `true` iff `other` happens-before `self`.
    pub fn after(&self, other: &VectorClock) -> bool {
        other.before(self)
    }

    /// `true` iff neither clock happens-before the other (concurrent).
    pub fn simultaneous(&self, other: &VectorClock) -> bool {
        !self.before(other) && !self.after(other)
    }

    pub fn copy(&self) -> VectorClock {
        self.clone()
    }
}

fn le_componentwise(a: &[u32], b: &[u32]) -> bool {
    a.iter().zip(b).all(|(x, y)| x <= y)
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VClock({:?})", self.vec)
    }
}
