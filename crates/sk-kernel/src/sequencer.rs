//! The per-rank time-indexed FIFO of ready agents.

use std::collections::{BTreeMap, VecDeque};

use log::info;
use sk_core::{KernelError, KernelResult, Tick};

use crate::ids::AgentId;

/// Maps integer time to the FIFO queue of agents ready to run at that time,
/// and owns the monotonically non-decreasing `timeNow`.
///
/// No agent may ever be enqueued with `t < timeNow`, and at any instant an
/// agent appears in at most one queue across the whole sequencer.
pub struct Sequencer {
    name: String,
    time_queues: BTreeMap<Tick, VecDeque<AgentId>>,
    time_now: Tick,
}

impl Sequencer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), time_queues: BTreeMap::new(), time_now: Tick::ZERO }
    }

    pub fn time_now(&self) -> Tick {
        self.time_now
    }

    /// Append `agent` to the queue for `when`. Fails if `when` precedes
    /// `timeNow`.
    pub fn enqueue(&mut self, agent: AgentId, when: Tick) -> KernelResult<()> {
        if when < self.time_now {
            return Err(KernelError::Contract(
                "Sequencer::enqueue",
                format!(
                    "{}: cannot schedule {agent} at {when}, timeNow is already {}",
                    self.name, self.time_now
                ),
            ));
        }
        self.time_queues.entry(when).or_default().push_back(agent);
        Ok(())
    }

    /// Remove `agent` from the queue it was expected to be waiting in.
    ///
    /// If `agent` isn't there but is found enqueued at a different time, that
    /// is a contract violation (the caller's expectation was stale). If
    /// `agent` isn't enqueued anywhere (e.g. it is suspended in an
    /// interactant's wait queue instead) this is a silent no-op, matching the
    /// original's behavior of only complaining about a *mismatched* wake time.
    pub fn unenqueue(&mut self, agent: AgentId, expected: Tick) -> KernelResult<()> {
        if let Some(q) = self.time_queues.get_mut(&expected) {
            if let Some(pos) = q.iter().position(|&a| a == agent) {
                q.remove(pos);
                return Ok(());
            }
        }
        if let Some(actual) = self.agent_wake_time(agent) {
            return Err(KernelError::Contract(
                "Sequencer::unenqueue",
                format!(
                    "{}: cannot unenqueue {agent}: enqueued to wake at {actual}, not {expected}",
                    self.name
                ),
            ));
        }
        Ok(())
    }

    /// First queue (in ascending time order) containing `agent`, if any.
    pub fn agent_wake_time(&self, agent: AgentId) -> Option<Tick> {
        self.time_queues
            .iter()
            .find(|(_, q)| q.contains(&agent))
            .map(|(&t, _)| t)
    }

    /// Shift every agent remaining in today's queue into tomorrow's.
    ///
    /// Called by the clock agent once [`Sequencer::today_all_timeless`]
    /// reports `true`. Every carried-over agent is expected to be timeless —
    /// the caller is responsible for having checked that.
    pub fn bump_time(&mut self) -> Tick {
        info!("{}: bump time {} -> {}", self.name, self.time_now, self.time_now + 1);
        let carried = self.time_queues.remove(&self.time_now).unwrap_or_default();
        self.time_now = self.time_now + 1;
        self.time_queues.entry(self.time_now).or_default().extend(carried);
        self.time_now
    }

    /// `true` iff every agent still queued for today satisfies `is_timeless`.
    /// An empty (or absent) today-queue trivially satisfies this.
    pub fn today_all_timeless(&self, is_timeless: impl Fn(AgentId) -> bool) -> bool {
        match self.time_queues.get(&self.time_now) {
            Some(q) => q.iter().all(|&a| is_timeless(a)),
            None => true,
        }
    }

    /// Pop the next `(agent, timeNow)` ready to run. Skips over exhausted
    /// day-slots, advancing `timeNow` and invoking `on_day_change` once per
    /// day boundary crossed. Returns `None` once every queue has drained —
    /// the driver loop's termination condition.
    pub fn iterate_next(&mut self, mut on_day_change: impl FnMut(Tick)) -> Option<(AgentId, Tick)> {
        loop {
            if self.time_queues.is_empty() {
                return None;
            }
            match self.time_queues.get_mut(&self.time_now) {
                Some(q) if !q.is_empty() => {
                    let agent = q.pop_front().expect("checked non-empty above");
                    return Some((agent, self.time_now));
                }
                _ => {
                    self.time_queues.remove(&self.time_now);
                    self.time_now = self.time_now + 1;
                    on_day_change(self.time_now);
                }
            }
        }
    }

    /// Count of non-timeless agents queued for `time` (defaults to `timeNow`
    /// when `time` is `None`). Used for census/diagnostics, mirroring the
    /// original's `getNWaitingNow`/`getWaitingCensus`.
    pub fn waiting_count(&self, time: Option<Tick>, is_timeless: impl Fn(AgentId) -> bool) -> usize {
        let t = time.unwrap_or(self.time_now);
        self.time_queues
            .get(&t)
            .map(|q| q.iter().filter(|&&a| !is_timeless(a)).count())
            .unwrap_or(0)
    }
}
