//! Shared state behind the kernel's one mutex.
//!
//! [`KernelState`] bundles the sequencer, the interactant registry, and the
//! per-agent bookkeeping (name, `timeless` flag, current location). Every
//! live agent thread and the `MainLoop` driver thread hold an
//! `Arc<Mutex<KernelState>>` to it, but the rendezvous protocol in
//! [`crate::agent`] guarantees only one thread is ever unblocked at a time —
//! see the concurrency note on [`crate::MainLoop`]. The mutex exists to
//! satisfy the borrow checker, not to arbitrate real contention.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use sk_core::Tick;

use crate::ids::{AgentId, InteractantId};
use crate::interactant::InteractantRegistry;
use crate::sequencer::Sequencer;

/// Messages the driver (or a killing agent) sends into an agent's inbox.
pub(crate) enum ToAgent {
    /// Resume execution; the new `timeNow` that the blocked call should
    /// return.
    Resume(Tick),
    /// Tear down at the next resumption point instead of continuing.
    Kill,
}

/// Messages an agent thread sends back to whoever is waiting on it.
pub(crate) enum FromAgent {
    /// The agent suspended itself (via `sleep`, a contended `lock`, or an
    /// `unlock` that woke a successor) and is parked in `inbox.recv()`.
    Yielded,
    /// `run` returned normally; the agent is terminated.
    Finished,
    /// `run` panicked with something other than the kill marker; the agent
    /// is terminated and the payload is a display of the panic value.
    Failed(String),
    /// The agent was killed (possibly mid-resumption) and is terminated.
    Killed,
}

/// Where one agent currently sits, per invariant #1 in `spec.md` §8: an
/// agent is in at most one of running / one time-queue / one interactant
/// wait-queue / terminated, at any instant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum AgentLocation {
    Running,
    TimeQueue,
    Interactant(InteractantId),
    Terminated,
}

pub(crate) struct AgentRecord {
    pub name: String,
    pub timeless: bool,
    /// Clone of the sender half of this agent's `ToAgent` inbox, so any
    /// thread holding the shared state (not just the driver) can resume or
    /// kill it.
    pub to_agent: Sender<ToAgent>,
    /// Taken by whichever side — the driver on normal reap, or a killer on
    /// `kill()` — first observes this agent terminate.
    pub join: Option<JoinHandle<()>>,
}

pub(crate) struct KernelState {
    pub sequencer: Sequencer,
    pub interactants: InteractantRegistry,
    pub agents: Vec<AgentRecord>,
    pub location: Vec<AgentLocation>,
}

impl KernelState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            sequencer: Sequencer::new(name),
            interactants: InteractantRegistry::new(),
            agents: Vec::new(),
            location: Vec::new(),
        }
    }

    pub fn register_agent(&mut self, name: impl Into<String>, timeless: bool, to_agent: Sender<ToAgent>) -> AgentId {
        let id = AgentId::from(self.agents.len());
        self.agents.push(AgentRecord { name: name.into(), timeless, to_agent, join: None });
        self.location.push(AgentLocation::Running);
        id
    }

    pub fn is_timeless(&self, id: AgentId) -> bool {
        self.agents[id.index()].timeless
    }

    pub fn name_of(&self, id: AgentId) -> &str {
        &self.agents[id.index()].name
    }

    /// `spec.md` §4.1's `doneWithToday`: every agent left in today's queue is
    /// timeless, and no non-timeless agent is waiting inside any interactant.
    pub fn done_with_today(&self) -> bool {
        let agents = &self.agents;
        self.sequencer.today_all_timeless(|a| agents[a.index()].timeless)
            && !self.interactants.has_any_non_timeless_waiters(|a| agents[a.index()].timeless)
    }
}

pub(crate) type SharedState = Arc<Mutex<KernelState>>;

/// Hooks consulted by the [`ClockAgent`][crate::ClockAgent]'s own thread and
/// mutated from the driver thread (`MainLoop::freezeDate`,
/// `addPerTickCallback`, `addPerDayCallback`). Kept separate from
/// [`KernelState`] because it has nothing to do with scheduling primitives —
/// it's the main loop's own tick/day bookkeeping.
#[derive(Default)]
pub(crate) struct ClockControls {
    pub date_frozen: bool,
    pub per_tick: Vec<Box<dyn FnMut(Tick, Tick) + Send>>,
    pub per_day: Vec<Box<dyn FnMut(Tick) + Send>>,
}

pub(crate) type SharedClockControls = Arc<Mutex<ClockControls>>;
