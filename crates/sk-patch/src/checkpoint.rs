//! The optional checkpoint hook from `spec.md` §6: "implementations define
//! their own checkpoint encoding; the kernel guarantees the hook fires at a
//! quiescent point." `sk-kernel`'s `MainLoop::add_per_day_callback` already
//! *is* that quiescent-point hook (no agent runs between a day bump and the
//! next resume) — `Checkpointable` just standardizes what a per-day callback
//! would actually encode, generalizing the source's `Agent.__getstate__`/
//! `__setstate__` pickle hooks.
//!
//! Nothing in `sk-kernel` or `sk-patch` requires an `AgentBody` to implement
//! this; it exists for domain code built on top of this crate.

/// Encodes enough of an agent's FSM state to reconstruct it later. The
/// kernel never calls this itself — a caller's per-day callback does,
/// against whatever agents it cares about checkpointing.
pub trait Checkpointable {
    fn checkpoint(&self) -> Vec<u8>;
}
