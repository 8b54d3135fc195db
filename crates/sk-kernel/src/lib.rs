//! `sk-kernel` — the cooperative-scheduling kernel: agents, interactants, the
//! time-indexed sequencer, and the per-rank main loop that drives them.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                          |
//! |----------------|--------------------------------------------------------------------|
//! | [`ids`]        | `AgentId`, `InteractantId` — handles local to one `MainLoop`       |
//! | [`sequencer`]  | `Sequencer` — the time-indexed FIFO of ready agents                |
//! | [`interactant`]| `InteractantRegistry` — lockable rendezvous objects                |
//! | [`agent`]      | `AgentBody`, `AgentContext` — suspendable per-agent computations   |
//! | [`clock_agent`]| `ClockAgent`, the always-`timeless` day-advancing agent            |
//! | [`state`]      | `KernelState` — the one mutex shared by every live agent thread    |
//! | [`main_loop`]  | `MainLoop`, `MainLoopBuilder` — the drain loop                     |
//!
//! # Concurrency model
//!
//! Each agent is its own OS thread, parked on a single-permit rendezvous
//! channel. Only the [`MainLoop`] driver thread ever sends a `Resume`; an
//! agent thread sends `Yielded`/`Finished`/`Failed`/`Killed` back and then
//! either returns or blocks on its own inbox again. The shared
//! `Arc<Mutex<KernelState>>` is therefore never really contended — at any
//! instant at most one thread holds it for longer than a few field reads.
//! See the module doc on [`state`] and the design note in `spec.md` §9
//! ("suspendable computation") for the alternatives this rejected.
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|----------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on `AgentId`/`InteractantId` |

pub mod agent;
pub mod clock_agent;
pub mod ids;
pub mod interactant;
pub mod main_loop;
pub mod sequencer;
pub(crate) mod state;

#[cfg(test)]
mod tests;

pub use agent::{install_kill_panic_hook, AgentBody, AgentContext};
pub use clock_agent::BreakHook;
pub use ids::{AgentId, InteractantId};
pub use interactant::{InteractantRegistry, LockOutcome, UnlockOutcome};
pub use main_loop::{MainLoop, MainLoopBuilder};
pub use sequencer::Sequencer;
