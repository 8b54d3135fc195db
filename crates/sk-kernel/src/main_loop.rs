//! The per-rank driver: owns the sequencer, spawns agents, and runs the
//! drain loop described in `spec.md` §4.4.
//!
//! Only the thread that calls [`MainLoop::run`] ever sends a
//! [`ToAgent::Resume`][crate::state::ToAgent] — every agent-side operation in
//! [`crate::agent`] either returns synchronously (the uncontended fast path)
//! or blocks on its own inbox, so the shared [`KernelState`] mutex never sees
//! real contention: at most one thread is ever not blocked on `recv`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use sk_core::Tick;

use crate::agent::{install_kill_panic_hook, spawn_agent, AgentBody};
use crate::clock_agent::{default_break_hook, BreakHook, ClockAgent};
use crate::ids::{AgentId, InteractantId};
use crate::state::{AgentLocation, ClockControls, FromAgent, KernelState, SharedClockControls, SharedState, ToAgent};

/// Result of one [`MainLoop::step`]: which agent was just resumed, or why the
/// drain loop ended instead.
enum StepOutcome {
    Resumed(AgentId),
    Stopped,
    Drained,
}

/// Builds a [`MainLoop`], letting the clock agent's break hook be swapped out
/// before it is spawned — a [`PatchGroup`](crate) driving a communication
/// cycle needs this, since the hook can't be reassigned once the clock
/// agent's thread is already parked on its own body.
pub struct MainLoopBuilder {
    name: String,
    safety: Option<u64>,
    break_hook: Option<BreakHook>,
}

impl MainLoopBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), safety: None, break_hook: None }
    }

    /// Abort `run()` after this many resumed events, logging an error,
    /// instead of looping forever. See `spec.md` §4.4's safety bound.
    pub fn safety(mut self, limit: u64) -> Self {
        self.safety = Some(limit);
        self
    }

    /// Override the clock agent's per-tick break hook (default: `sleep(0)`).
    pub fn break_hook(mut self, hook: BreakHook) -> Self {
        self.break_hook = Some(hook);
        self
    }

    pub fn build(self) -> MainLoop {
        install_kill_panic_hook();
        let state: SharedState = Arc::new(Mutex::new(KernelState::new(self.name.clone())));
        let clock_controls: SharedClockControls = Arc::new(Mutex::new(ClockControls::default()));

        let mut main_loop = MainLoop {
            name: self.name,
            state,
            from_agents: Vec::new(),
            clock_controls: clock_controls.clone(),
            clock_agent_id: AgentId::INVALID,
            per_event_callbacks: Vec::new(),
            safety: self.safety,
            event_counter: 0,
            stop_now: Arc::new(AtomicBool::new(false)),
        };

        let break_hook = self.break_hook.unwrap_or_else(default_break_hook);
        let clock_body: Box<dyn AgentBody> = Box::new(ClockAgent::new(clock_controls, break_hook));
        let clock_agent_id = main_loop.add_agent("clock", true, clock_body);
        main_loop.clock_agent_id = clock_agent_id;
        main_loop
    }
}

/// A single rank's driver loop: one sequencer, one interactant registry, one
/// clock agent, and however many user agents get added to it.
///
/// Cyclic-ownership note (`spec.md` §9): a [`crate::Patch`] owns a
/// `MainLoop`; the `MainLoop` owns its agents and the shared `KernelState`
/// arena. Nothing here holds a back-reference to the owning patch — patch
/// bodies reach back in by closing over whatever handle they need.
pub struct MainLoop {
    name: String,
    state: SharedState,
    /// Receiving half of each agent's outbox, indexed by `AgentId`. Only the
    /// driver thread ever reads these.
    from_agents: Vec<mpsc::Receiver<FromAgent>>,
    clock_controls: SharedClockControls,
    clock_agent_id: AgentId,
    per_event_callbacks: Vec<Box<dyn FnMut(AgentId, Tick) + Send>>,
    safety: Option<u64>,
    event_counter: u64,
    stop_now: Arc<AtomicBool>,
}

impl MainLoop {
    pub fn builder(name: impl Into<String>) -> MainLoopBuilder {
        MainLoopBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time_now(&self) -> Tick {
        self.state.lock().unwrap().sequencer.time_now()
    }

    pub fn clock_agent_id(&self) -> AgentId {
        self.clock_agent_id
    }

    /// Length of `iid`'s wait queue right now. Census helper mirroring
    /// [`crate::agent::AgentContext::interactant_wait_len`], for callers
    /// (tests, observers) that only hold a `MainLoop` and not a running
    /// agent's context.
    pub fn interactant_wait_len(&self, iid: InteractantId) -> usize {
        self.state.lock().unwrap().interactants.wait_len(iid)
    }

    /// A snapshot of `iid`'s wait queue. A [`crate::Patch`]'s outbound gate
    /// drain uses this to find agents parked on a capacity-zero gate
    /// interactant, since they'll never reach `holders`.
    pub fn interactant_waiters(&self, iid: InteractantId) -> Vec<AgentId> {
        self.state.lock().unwrap().interactants.waiters(iid)
    }

    /// A snapshot of `iid`'s current holder set. Census helper for callers
    /// (observers, domain code polling "who's at the clinic right now")
    /// that only hold a `MainLoop`.
    pub fn interactant_holders(&self, iid: InteractantId) -> Vec<AgentId> {
        self.state.lock().unwrap().interactants.holders(iid).to_vec()
    }

    /// Register a single-holder interactant.
    pub fn create_interactant(&mut self, name: impl Into<String>) -> InteractantId {
        self.state.lock().unwrap().interactants.create(name)
    }

    /// Register a `capacity`-holder `MultiInteractant`.
    pub fn create_multi_interactant(&mut self, name: impl Into<String>, capacity: usize) -> InteractantId {
        self.state.lock().unwrap().interactants.create_multi(name, capacity)
    }

    /// Spawn `body` on its own thread and enqueue it into the sequencer at
    /// the current `timeNow` — this is the one code path for both agents
    /// added before `run()` starts and ones added dynamically from inside a
    /// running agent, per `spec.md` §4.4 step 1: a thread parked on its first
    /// `recv` is harmless whether or not the drain loop has started yet.
    pub fn add_agent(&mut self, name: impl Into<String>, timeless: bool, body: Box<dyn AgentBody>) -> AgentId {
        let name = name.into();
        let (to_agent_tx, to_agent_rx) = mpsc::channel::<ToAgent>();

        let id = {
            let mut st = self.state.lock().unwrap();
            let id = st.register_agent(name.clone(), timeless, to_agent_tx);
            let now = st.sequencer.time_now();
            st.sequencer.enqueue(id, now).expect("a freshly registered agent always enqueues at timeNow");
            id
        };

        let (join, from_agent_rx) = spawn_agent(id, name, self.state.clone(), to_agent_rx, body);
        {
            let mut st = self.state.lock().unwrap();
            st.agents[id.index()].join = Some(join);
        }

        debug_assert_eq!(self.from_agents.len(), id.index(), "agents must be registered in id order");
        self.from_agents.push(from_agent_rx);
        id
    }

    pub fn add_per_event_callback(&mut self, cb: impl FnMut(AgentId, Tick) + Send + 'static) {
        self.per_event_callbacks.push(Box::new(cb));
    }

    pub fn add_per_tick_callback(&mut self, cb: impl FnMut(Tick, Tick) + Send + 'static) {
        self.clock_controls.lock().unwrap().per_tick.push(Box::new(cb));
    }

    pub fn add_per_day_callback(&mut self, cb: impl FnMut(Tick) + Send + 'static) {
        self.clock_controls.lock().unwrap().per_day.push(Box::new(cb));
    }

    pub fn freeze_date(&self) {
        self.clock_controls.lock().unwrap().date_frozen = true;
    }

    pub fn unfreeze_date(&self) {
        self.clock_controls.lock().unwrap().date_frozen = false;
    }

    /// Request that the next iteration of `run`'s drain loop exit cleanly.
    /// Safe to call from a per-event callback running on the driver thread,
    /// or from any other thread holding a clone of [`Self::stop_flag`].
    pub fn stop_running(&self) {
        self.stop_now.store(true, Ordering::SeqCst);
    }

    /// A cloneable handle to the stop flag, for callbacks that need to
    /// request a shutdown without a `&MainLoop` in scope.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_now.clone()
    }

    /// Drain the sequencer: pop the next ready `(agent, timeNow)`, fire
    /// per-event callbacks, resume it, and wait for it to yield or
    /// terminate. Returns once the sequencer is empty, `stopRunning()` has
    /// been called, or the safety bound is hit.
    pub fn run(&mut self) {
        loop {
            match self.step() {
                StepOutcome::Resumed(_) => {}
                StepOutcome::Stopped | StepOutcome::Drained => break,
            }
        }
        self.shutdown_remaining();
    }

    /// Drive the drain loop exactly like [`Self::run`], except it returns as
    /// soon as the clock agent itself has been resumed and yielded once,
    /// rather than running until the sequencer empties.
    ///
    /// This is how a [`crate::Patch`]'s `MainLoop` is stepped by a
    /// `PatchGroup` driver (`spec.md` §4.5 step 2): "resume each patch's main
    /// loop until its clock agent yields via the break hook" means exactly
    /// one clock-agent resume/yield round-trip, with however many other
    /// agents' events the sequencer happens to drain first. Returns `false`
    /// if the loop instead ended via `stopRunning()`, the safety bound, or
    /// the sequencer draining before the clock agent got a turn.
    pub fn run_until_clock_yield(&mut self) -> bool {
        loop {
            match self.step() {
                StepOutcome::Resumed(id) if id == self.clock_agent_id => return true,
                StepOutcome::Resumed(_) => {}
                StepOutcome::Stopped | StepOutcome::Drained => return false,
            }
        }
    }

    /// Pop and resume exactly one ready agent, blocking until it yields or
    /// terminates.
    fn step(&mut self) -> StepOutcome {
        if self.stop_now.load(Ordering::SeqCst) {
            info!("{}: stopRunning requested, exiting drain loop", self.name);
            return StepOutcome::Stopped;
        }
        if let Some(limit) = self.safety {
            if self.event_counter >= limit {
                error!("{}: safety bound of {limit} events reached, aborting drain loop", self.name);
                return StepOutcome::Stopped;
            }
        }

        let name = self.name.clone();
        let popped = {
            let mut st = self.state.lock().unwrap();
            st.sequencer.iterate_next(|t| debug!("{name}: advancing to {t} with nothing scheduled"))
        };
        let Some((agent_id, tick)) = popped else {
            debug!("{}: sequencer drained, exiting", self.name);
            return StepOutcome::Drained;
        };

        for cb in self.per_event_callbacks.iter_mut() {
            cb(agent_id, tick);
        }

        let sender = {
            let mut st = self.state.lock().unwrap();
            st.location[agent_id.index()] = AgentLocation::Running;
            st.agents[agent_id.index()].to_agent.clone()
        };
        let _ = sender.send(ToAgent::Resume(tick));
        self.event_counter += 1;

        match self.from_agents[agent_id.index()].recv() {
            Ok(FromAgent::Yielded) => {}
            Ok(FromAgent::Finished) | Ok(FromAgent::Killed) => self.reap(agent_id),
            Ok(FromAgent::Failed(msg)) => {
                error!("{}: agent {agent_id} failed: {msg}", self.name);
                self.reap(agent_id);
            }
            Err(_) => {
                error!("{}: agent {agent_id} outbox closed without a final report", self.name);
                self.reap(agent_id);
            }
        }
        StepOutcome::Resumed(agent_id)
    }

    /// Tear down `target` from the driver thread itself, wherever it
    /// currently sits (today's sequencer queue, an interactant's wait queue,
    /// or already terminated). Used by [`crate::Patch`]'s outbound-gate
    /// drain to remove an agent that has logically left this rank — the
    /// counterpart of [`crate::AgentContext::kill`] for callers that aren't
    /// themselves a running agent.
    pub fn kill_agent(&mut self, target: AgentId) -> sk_core::KernelResult<()> {
        let (sender, join) = {
            let mut st = self.state.lock().unwrap();
            match st.location[target.index()] {
                AgentLocation::TimeQueue => {
                    let wake_at = st.sequencer.agent_wake_time(target).unwrap_or(st.sequencer.time_now());
                    st.sequencer.unenqueue(target, wake_at)?
                }
                AgentLocation::Interactant(iid) => st.interactants.awaken(iid, target)?,
                AgentLocation::Running => {
                    return Err(sk_core::KernelError::Contract(
                        "MainLoop::kill_agent",
                        format!("{target} is currently running"),
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

    fn reap(&mut self, agent_id: AgentId) {
        let join = {
            let mut st = self.state.lock().unwrap();
            st.location[agent_id.index()] = AgentLocation::Terminated;
            st.agents[agent_id.index()].join.take()
        };
        if let Some(handle) = join {
            let _ = handle.join();
        }
    }

    /// Kill and join every agent still alive once the drain loop exits, so a
    /// `MainLoop` never leaks parked threads (the clock agent in particular
    /// loops forever and only a `Kill` can stop it).
    ///
    /// Public so a `PatchGroup` can tear a patch's `MainLoop` down once its
    /// own cooperative cycle decides to stop, after however many
    /// [`Self::run_until_clock_yield`] rounds it ran.
    pub fn shutdown(&mut self) {
        self.shutdown_remaining();
    }

    fn shutdown_remaining(&mut self) {
        let ids: Vec<AgentId> = {
            let st = self.state.lock().unwrap();
            (0..st.agents.len())
                .map(AgentId::from)
                .filter(|&id| st.location[id.index()] != AgentLocation::Terminated)
                .collect()
        };
        for id in ids {
            let to_kill = {
                let mut st = self.state.lock().unwrap();
                if st.location[id.index()] == AgentLocation::Terminated {
                    None
                } else {
                    st.location[id.index()] = AgentLocation::Terminated;
                    let sender = st.agents[id.index()].to_agent.clone();
                    let join = st.agents[id.index()].join.take();
                    Some((sender, join))
                }
            };
            if let Some((sender, join)) = to_kill {
                let _ = sender.send(ToAgent::Kill);
                if let Some(handle) = join {
                    let _ = handle.join();
                }
            }
        }
    }
}
