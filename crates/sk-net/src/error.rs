//! `sk-net`'s error type.

use sk_core::KernelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    /// A kernel-level contract violation or addressing error bubbled up from
    /// a call into `sk-core` (e.g. `expect` called with a foreign `dstAddr`).
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// The underlying transport's send/receive primitive gave up. There are
    /// no retries inside the kernel — spec.md §7 treats a transport giving
    /// up as fatal, not recoverable.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A chunk arrived addressed to a `(src, dst)` pair nothing ever called
    /// `expect` for.
    #[error("no handler registered for messages from {src} to {dst}")]
    Unexpected { src: String, dst: String },
}

pub type NetResult<T> = Result<T, NetError>;
