//! Shared error type.
//!
//! Sub-crates define their own error enums and convert into `KernelError`
//! via `From` impls, or wrap it as one variant — see `sk-net::NetError` and
//! `sk-patch::PatchError`. Every variant here corresponds to one of the
//! "fatal" rows in spec.md §7: a contract violation is a programming bug,
//! not a recoverable condition, so callers are expected to propagate and
//! abort rather than retry.

use thiserror::Error;

/// The top-level error type shared by every `sk-*` crate.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A kernel invariant was violated: negative sleep, non-integer
    /// schedule time, locking on behalf of another agent, unlocking an
    /// interactant you don't hold, an `unenqueue` mismatch, or an `awaken`
    /// of an agent that isn't waiting. Always a programming bug.
    #[error("contract violation in {0}: {1}")]
    Contract(&'static str, String),

    /// A message was addressed to a `GblAddr` whose rank isn't the local
    /// rank on the receiving side.
    #[error("addressing error: {0} is not local")]
    ForeignAddress(String),
}

/// Shorthand result type for all `sk-*` crates.
pub type KernelResult<T> = Result<T, KernelError>;
