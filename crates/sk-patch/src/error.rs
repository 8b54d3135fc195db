//! `sk-patch`'s error type: wraps the two layers underneath it, following
//! `sk-core::error`'s documented chaining ("`PatchError` wraps `NetError`
//! and `KernelError`"), the way `dt-sim::SimError` wraps `dt-mobility`'s.

use sk_core::KernelError;
use sk_net::NetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Net(#[from] NetError),

    /// A gate, service name, or destination address referenced something
    /// this patch (or patch group) never registered.
    #[error("unknown {what}: {name}")]
    Unknown { what: &'static str, name: String },

    /// `addGateTo`/`addGateFrom` called twice for the same neighbor, or a
    /// service registered under a name already claimed by this patch.
    #[error("patch configuration error: {0}")]
    Config(String),
}

pub type PatchResult<T> = Result<T, PatchError>;
