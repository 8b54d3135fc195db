//! `sk-core` — addressing, vector clocks, and the shared error type for the
//! `sk` simulation kernel.
//!
//! This crate is a dependency of every other `sk-*` crate. It intentionally
//! has no `sk-*` dependencies and no external ones beyond `thiserror` (plus
//! optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                    |
//! |-------------|----------------------------------------------|
//! | [`addr`]    | `GblAddr`, the `(rank, localId)` identity     |
//! | [`vclock`]  | `VectorClock`                                 |
//! | [`time`]    | `Tick`, the integer simulation-time counter   |
//! | [`error`]   | `KernelError`, `KernelResult`                 |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                               |
//! |---------|-------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.   |

pub mod addr;
pub mod error;
pub mod time;
pub mod vclock;


pub use addr::{GblAddr, LclId};
pub use error::{KernelError, KernelResult};
pub use time::Tick;
pub use vclock::VectorClock;
