//! `sk-net` — wire protocol, transport abstraction, and the per-rank
//! network interface that closes out each round of distributed-termination
//! voting.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                      |
//! |---------------|-----------------------------------------------------------------|
//! | [`wire`]      | `WireEntry`/`Chunk`/`DoneMarker`, `chunk_outbox`                  |
//! | [`transport`] | `Transport`, `DummyTransport`, `ChannelTransport`                |
//! | [`interface`] | `NetworkInterface`, `DummyNetworkInterface`, `ChannelNetworkInterface` |
//! | [`error`]     | `NetError`, `NetResult`                                           |
//!
//! # Picking an implementor
//!
//! A single-rank run never touches the wire: use [`DummyNetworkInterface`]
//! over [`DummyTransport`]. A multi-rank run pairs
//! [`ChannelNetworkInterface`] with a real [`Transport`] — today that's
//! [`ChannelTransport`], an in-process emulation of a fixed-size cluster;
//! a production deployment would supply its own `Transport` binding (an
//! MPI wrapper, gRPC, whatever the deployment uses) without touching
//! anything above this crate.
//!
//! # Cargo features
//!
//! Serde support is not optional here: the wire format has to serialize by
//! construction, so `serde` and `bincode` are hard dependencies rather than
//! feature-gated.

pub mod error;
pub mod interface;
pub mod transport;
pub mod wire;

#[cfg(test)]
mod tests;

pub use error::{NetError, NetResult};
pub use interface::{ChannelNetworkInterface, DummyNetworkInterface, IncomingHandler, NetworkInterface};
pub use transport::{ChannelTransport, DummyTransport, RecvTicket, SendTicket, Transport};
pub use wire::{chunk_outbox, Chunk, DoneMarker, WireEntry, MAX_CHUNKS_PER_MSG, RECV_BUFFER_BYTES, TAG_END, TAG_MORE};
