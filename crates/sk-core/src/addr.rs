//! Global addressing.
//!
//! A [`GblAddr`] is the `(rank, localId)` identity of every addressable
//! kernel object — an agent, an interactant, a gate — across the whole
//! simulation. It is totally ordered and hashable so it can be used as a map
//! key and sorted for the deterministic-mode wire ordering in `sk-net`.

use std::fmt;

/// The local half of a [`GblAddr`].
///
/// Most objects are identified by a single local id within their rank. A
/// patch's child slots (gates, request queues) additionally carry the
/// parent patch's id so [`GblAddr::patch_addr`] can project back to it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LclId {
    Plain(u32),
    Child(u32, u32),
}

impl LclId {
    /// The id of the owning patch, stripping any child component.
    #[inline]
    pub fn patch_id(self) -> u32 {
        match self {
            LclId::Plain(id) => id,
            LclId::Child(parent, _) => parent,
        }
    }
}

impl fmt::Display for LclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LclId::Plain(id) => write!(f, "{id}"),
            LclId::Child(parent, child) => write!(f, "{parent}_{child}"),
        }
    }
}

impl From<u32> for LclId {
    #[inline]
    fn from(id: u32) -> Self {
        LclId::Plain(id)
    }
}

/// A globally unique `(rank, localId)` address.
///
/// Equality, ordering, and hashing are all consistent and defined
/// lexicographically on `(rank, localId)`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GblAddr {
    pub rank: u32,
    pub lcl_id: LclId,
}

impl GblAddr {
    #[inline]
    pub fn new(rank: u32, lcl_id: impl Into<LclId>) -> Self {
        Self { rank, lcl_id: lcl_id.into() }
    }

    /// The local id, without projecting away a child component.
    #[inline]
    pub fn lcl_addr(self) -> LclId {
        self.lcl_id
    }

    /// Project this address to its owning patch's address.
    ///
    /// For a plain address this is a no-op; for a child slot (e.g. a gate)
    /// this strips the child component.
    #[inline]
    pub fn patch_addr(self) -> GblAddr {
        GblAddr { rank: self.rank, lcl_id: LclId::Plain(self.lcl_id.patch_id()) }
    }

    /// `true` if this address names an object owned by `rank`.
    #[inline]
    pub fn is_local_to(self, rank: u32) -> bool {
        self.rank == rank
    }
}

impl fmt::Display for GblAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.rank, self.lcl_id)
    }
}
