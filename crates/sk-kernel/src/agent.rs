//! Agents: suspendable computations backed by one OS thread each.
//!
//! An agent's `run` body is ordinary straight-line Rust that calls
//! [`AgentContext::sleep`], [`AgentContext::lock`], and
//! [`AgentContext::unlock`] to yield control back to the [`MainLoop`]
//! driver — design option (b) from the suspendable-computation design note:
//! one OS thread per live agent, parked on a single-permit rendezvous
//! channel, selected one at a time by the sequencer. See the module doc on
//! [`crate::state`] for why the shared `Mutex` is uncontended by
//! construction.
//!
//! [`MainLoop`]: crate::MainLoop

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver};
use std::sync::Once;
use std::thread::{self, JoinHandle};

use log::{debug, error};
use sk_core::{KernelError, KernelResult, Tick};

use crate::ids::{AgentId, InteractantId};
use crate::interactant::{LockOutcome, UnlockOutcome};
use crate::state::{AgentLocation, FromAgent, SharedState, ToAgent};

/// A user-defined agent body.
///
/// `run` must be written as straight-line code that periodically calls
/// `ctx.sleep(..)`, `ctx.lock(..)`, or `ctx.unlock(..)` to yield. Returning
/// normally terminates the agent; it is never resumed again.
pub trait AgentBody: Send {
    fn run(&mut self, ctx: &mut AgentContext, start_time: Tick);
}

/// Private panic payload meaning "this thread is tearing down because it was
/// killed, not because anything went wrong". Mirrors the original greenlet
/// implementation's `GreenletExit`, a special exception that unwinds a
/// greenlet silently. Paired with [`install_kill_panic_hook`] so a killed
/// agent never prints a spurious backtrace.
struct AgentKilled;

/// Install a process-wide panic hook that drops [`AgentKilled`] panics
/// silently, leaving every other panic's default reporting untouched.
/// Idempotent; call it once before spawning any agents (`MainLoop::new`
/// does this for you).
pub fn install_kill_panic_hook() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<AgentKilled>().is_some() {
                return;
            }
            default_hook(info);
        }));
    });
}

/// The handle an agent's `run` body uses to talk to the kernel.
pub struct AgentContext {
    id: AgentId,
    name: String,
    state: SharedState,
    inbox: Receiver<ToAgent>,
    outbox: mpsc::Sender<FromAgent>,
}

impl AgentContext {
    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_timeless(&self) -> bool {
        self.state.lock().unwrap().is_timeless(self.id)
    }

    /// Flip this agent's `timeless` flag. Typically set once, right after
    /// construction (see [`crate::ClockAgent`]), not toggled mid-run.
    pub fn set_timeless(&self, timeless: bool) {
        self.state.lock().unwrap().agents[self.id.index()].timeless = timeless;
    }

    pub fn time_now(&self) -> Tick {
        self.state.lock().unwrap().sequencer.time_now()
    }

    /// `nDays >= 0`; enqueue self at `timeNow + nDays` and yield. `sleep(0)`
    /// is the canonical thread yield.
    pub fn sleep(&mut self, n_days: u64) -> KernelResult<Tick> {
        {
            let mut st = self.state.lock().unwrap();
            let now = st.sequencer.time_now();
            let wake_at = now.offset(n_days);
            st.sequencer.enqueue(self.id, wake_at)?;
            st.location[self.id.index()] = AgentLocation::TimeQueue;
            debug!("{}: sleep {n_days} days, wake at {wake_at}", self.name);
        }
        self.yield_to_driver()
    }

    /// Lock `iid`. Returns immediately if uncontended; otherwise suspends
    /// until `iid` unlocks in this agent's favor.
    pub fn lock(&mut self, iid: InteractantId) -> KernelResult<Tick> {
        let outcome = {
            let mut st = self.state.lock().unwrap();
            let outcome = st.interactants.lock(iid, self.id);
            if matches!(outcome, LockOutcome::Suspended) {
                st.location[self.id.index()] = AgentLocation::Interactant(iid);
            }
            outcome
        };
        match outcome {
            LockOutcome::Immediate => Ok(self.time_now()),
            LockOutcome::Suspended => self.yield_to_driver(),
        }
    }

    /// Unlock `iid`, which this agent must currently hold. If a successor
    /// was waiting, both it and this agent are re-enqueued and this call
    /// yields; otherwise it returns immediately.
    pub fn unlock(&mut self, iid: InteractantId) -> KernelResult<Tick> {
        let must_yield = {
            let mut st = self.state.lock().unwrap();
            match st.interactants.unlock(iid, self.id)? {
                UnlockOutcome::Promoted(new_agent) => {
                    let now = st.sequencer.time_now();
                    st.sequencer.enqueue(new_agent, now)?;
                    st.sequencer.enqueue(self.id, now)?;
                    st.location[new_agent.index()] = AgentLocation::TimeQueue;
                    st.location[self.id.index()] = AgentLocation::TimeQueue;
                    true
                }
                UnlockOutcome::Empty => {
                    st.location[self.id.index()] = AgentLocation::Running;
                    false
                }
            }
        };
        if must_yield { self.yield_to_driver() } else { Ok(self.time_now()) }
    }

    /// Remove `agent` from `iid`'s wait queue and schedule it to run. Does
    /// not yield this agent's own thread.
    pub fn awaken(&self, iid: InteractantId, agent: AgentId) -> KernelResult<()> {
        let mut st = self.state.lock().unwrap();
        st.interactants.awaken(iid, agent)?;
        let now = st.sequencer.time_now();
        st.sequencer.enqueue(agent, now)?;
        st.location[agent.index()] = AgentLocation::TimeQueue;
        Ok(())
    }

    /// Remove `agent` from the sequencer's today-queue and park it in
    /// `iid`'s wait queue instead. The inverse of `awaken`.
    pub fn suspend(&self, iid: InteractantId, agent: AgentId) -> KernelResult<()> {
        let mut st = self.state.lock().unwrap();
        let now = st.sequencer.time_now();
        st.sequencer.unenqueue(agent, now)?;
        st.interactants.suspend(iid, agent)?;
        st.location[agent.index()] = AgentLocation::Interactant(iid);
        Ok(())
    }

    pub fn is_locked(&self, iid: InteractantId, agent: AgentId) -> bool {
        self.state.lock().unwrap().interactants.is_locked(iid, agent)
    }

    /// Length of `iid`'s wait queue right now. Census helper, not part of the
    /// lock/unlock protocol itself.
    pub fn interactant_wait_len(&self, iid: InteractantId) -> usize {
        self.state.lock().unwrap().interactants.wait_len(iid)
    }

    /// A snapshot of `iid`'s wait queue, FIFO order. Lets an agent such as
    /// `sk-patch`'s `Manager` poll a request queue it shares visibility into,
    /// the same way the original's cooperative scheduler let `Manager.run`
    /// read `RequestQueue._lockQueue` directly.
    pub fn interactant_waiters(&self, iid: InteractantId) -> Vec<AgentId> {
        self.state.lock().unwrap().interactants.waiters(iid)
    }

    /// The sequencer entry time for `agent`, or `None` if it is currently
    /// suspended inside an interactant (or running).
    pub fn next_wake_time(&self, agent: AgentId) -> Option<Tick> {
        self.state.lock().unwrap().sequencer.agent_wake_time(agent)
    }

    /// `spec.md` §4.1's `doneWithToday`. Consulted by the clock agent, but
    /// exposed generally since any driving agent may want it.
    pub fn done_with_today(&self) -> bool {
        self.state.lock().unwrap().done_with_today()
    }

    /// Shift every agent remaining in today's queue into tomorrow's and
    /// return the new `timeNow`. Callers should have checked
    /// `done_with_today()` first — this does not itself verify the
    /// precondition, matching the sequencer's own `bump_time`.
    pub fn bump_time(&self) -> Tick {
        self.state.lock().unwrap().sequencer.bump_time()
    }

    /// Tear down this agent's own context. Control returns to the main loop.
    pub fn kill_self(&self) -> ! {
        panic::panic_any(AgentKilled)
    }

    /// Tear down `target`'s context at its next resumption point and block
    /// until that teardown completes, then return control to the caller —
    /// `target` must not be the currently running agent; use
    /// [`kill_self`](Self::kill_self) for that.
    pub fn kill(&self, target: AgentId) -> KernelResult<()> {
        let (sender, join) = {
            let mut st = self.state.lock().unwrap();
            match st.location[target.index()] {
                AgentLocation::TimeQueue => {
                    let wake_at = st.sequencer.agent_wake_time(target).unwrap_or(st.sequencer.time_now());
                    st.sequencer.unenqueue(target, wake_at)?
                }
                AgentLocation::Interactant(iid) => st.interactants.awaken(iid, target)?,
                AgentLocation::Running => {
                    return Err(KernelError::Contract(
                        "AgentContext::kill",
                        format!("{target} is currently running; it can only kill itself"),
                    ));
                }
                AgentLocation::Terminated => return Ok(()),
            }
            st.location[target.index()] = AgentLocation::Terminated;
            let sender = st.agents[target.index()].to_agent.clone();
            let join = st.agents[target.index()].join.take();
            (sender, join)
        };
        let _ = sender.send(ToAgent::Kill);
        if let Some(handle) = join {
            let _ = handle.join();
        }
        Ok(())
    }

    fn yield_to_driver(&self) -> KernelResult<Tick> {
        self.outbox.send(FromAgent::Yielded).map_err(|_| {
            KernelError::Contract("AgentContext::yield_to_driver", format!("{}: driver channel closed", self.name))
        })?;
        match self.inbox.recv() {
            Ok(ToAgent::Resume(t)) => Ok(t),
            Ok(ToAgent::Kill) | Err(_) => self.kill_self(),
        }
    }
}

/// Spawn `body` as its own OS thread, parked waiting for the first
/// `ToAgent::Resume` before it runs at all. Returns the thread's join handle
/// and the receiving half of its outbox.
pub(crate) fn spawn_agent(
    id: AgentId,
    name: String,
    state: SharedState,
    to_agent_rx: Receiver<ToAgent>,
    mut body: Box<dyn AgentBody>,
) -> (JoinHandle<()>, Receiver<FromAgent>) {
    let (from_agent_tx, from_agent_rx) = mpsc::channel::<FromAgent>();
    let thread_name = name.clone();
    let join = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let start_time = match to_agent_rx.recv() {
                Ok(ToAgent::Resume(t)) => t,
                Ok(ToAgent::Kill) | Err(_) => {
                    let _ = from_agent_tx.send(FromAgent::Killed);
                    return;
                }
            };
            let mut ctx = AgentContext {
                id,
                name: thread_name.clone(),
                state,
                inbox: to_agent_rx,
                outbox: from_agent_tx.clone(),
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body.run(&mut ctx, start_time)));
            let report = match outcome {
                Ok(()) => FromAgent::Finished,
                Err(payload) => {
                    if payload.downcast_ref::<AgentKilled>().is_some() {
                        FromAgent::Killed
                    } else {
                        let msg = panic_message(&payload);
                        error!("agent {thread_name} panicked: {msg}");
                        FromAgent::Failed(msg)
                    }
                }
            };
            let _ = from_agent_tx.send(report);
        })
        .expect("failed to spawn agent thread");
    (join, from_agent_rx)
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "agent panicked with a non-string payload".to_string()
    }
}
