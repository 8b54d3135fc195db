//! Typed identifier wrappers for kernel-local handles.
//!
//! Unlike [`sk_core::GblAddr`], which is addressable across ranks, the ids
//! here only mean something within the [`MainLoop`][crate::MainLoop] that
//! issued them — they index into that loop's agent table and interactant
//! registry.

use std::fmt;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid id".
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            /// The `INVALID` sentinel, so an uninitialized id is visibly invalid.
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<usize> for $name {
            #[inline(always)]
            fn from(n: usize) -> $name {
                $name(n as $inner)
            }
        }
    };
}

typed_id! {
    /// Handle to an agent registered with a `MainLoop`.
    pub struct AgentId(u32);
}

typed_id! {
    /// Handle to an `Interactant` or `MultiInteractant` registered with a
    /// `MainLoop`.
    pub struct InteractantId(u32);
}
