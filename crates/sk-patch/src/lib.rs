//! `sk-patch` — patches, patch groups, gates, the service directory, and the
//! agent-as-message pattern built on top of `sk-kernel` and `sk-net`.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                         |
//! |----------------|-------------------------------------------------------------------|
//! | [`patch`]      | `Patch`, `Gate`, `Routing`, the outbound-gate drain                |
//! | [`patch_group`]| `PatchGroup` — the 5-step recv/run/send/finish/done-signal cycle   |
//! | [`messages`]   | `MessageBody` (agent-as-message), `MsgKindRegistry`, `WireMsgState` |
//! | [`queues`]     | `HoldQueue`, `RequestQueue`, `ManagerBody`                         |
//! | [`checkpoint`] | `Checkpointable`                                                  |
//! | [`error`]      | `PatchError`, `PatchResult<T>`                                     |
//!
//! # Design notes
//!
//! A `Patch` owns one `sk_kernel::MainLoop` plus its gate table and service
//! directory; a `PatchGroup` owns every patch resident on one rank plus the
//! one rank-wide `sk_net::NetworkInterface`. Cross-rank delivery never hands
//! a live agent or a borrowed reference across the network: every message
//! agent that needs to leave this rank checkpoints itself into bytes first
//! (`Checkpointable`/`WireMsgState`), and `PatchGroup` reconstructs a fresh
//! agent from those bytes on the receiving side.

pub mod checkpoint;
pub mod error;
pub mod messages;
pub mod patch;
pub mod patch_group;
pub mod queues;

#[cfg(test)]
mod tests;

pub use checkpoint::Checkpointable;
pub use error::{PatchError, PatchResult};
pub use messages::{MessageBody, MsgKindRegistry, WireMsgState, KIND_ARRIVAL, KIND_DEPARTURE, KIND_FUTURE, KIND_SIMPLE};
pub use patch::{Gate, Patch, Routing};
pub use patch_group::PatchGroup;
pub use queues::{HoldQueue, ManagerBody, RequestHandler, RequestQueue};
