//! Interactants — FIFO lockable rendezvous objects, and the capacity-`N`
//! `MultiInteractant` extension.
//!
//! A plain interactant is just a `MultiInteractant` with `capacity == 1`; the
//! two are not distinguished as separate Rust types, only as a constructor
//! choice, matching how `MultiInteractant` in the original is a thin subclass
//! that swaps a single `Option<AgentId>` holder for a small set.

use std::collections::VecDeque;

use log::debug;
use sk_core::{KernelError, KernelResult};

use crate::ids::{AgentId, InteractantId};

/// Result of a `lock` call.
#[derive(Debug)]
pub enum LockOutcome {
    /// The caller is now a holder; no suspension occurred.
    Immediate,
    /// The caller was appended to the wait queue and must suspend.
    Suspended,
}

/// Result of an `unlock` call.
#[derive(Debug)]
pub enum UnlockOutcome {
    /// The wait queue was empty; the interactant is now free (or, for a
    /// `MultiInteractant`, merely down one holder).
    Empty,
    /// The head of the wait queue was promoted to holder and must be
    /// (re-)enqueued into the sequencer alongside the unlocker.
    Promoted(AgentId),
}

struct Record {
    name: String,
    capacity: usize,
    holders: Vec<AgentId>,
    wait_queue: VecDeque<AgentId>,
}

/// Arena of every interactant owned by one `MainLoop`.
///
/// `InteractantId` is a stable index into this registry for the lifetime of
/// the owning loop. This plays the role the original's weak live-instance
/// list played — see the "weak registry of live interactants" design note —
/// as an explicit, owned arena instead.
#[derive(Default)]
pub struct InteractantRegistry {
    records: Vec<Record>,
}

impl InteractantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single-holder interactant.
    pub fn create(&mut self, name: impl Into<String>) -> InteractantId {
        self.create_with_capacity(name, 1)
    }

    /// Register a `capacity`-holder `MultiInteractant`.
    pub fn create_multi(&mut self, name: impl Into<String>, capacity: usize) -> InteractantId {
        self.create_with_capacity(name, capacity)
    }

    fn create_with_capacity(&mut self, name: impl Into<String>, capacity: usize) -> InteractantId {
        self.records.push(Record {
            name: name.into(),
            capacity,
            holders: Vec::new(),
            wait_queue: VecDeque::new(),
        });
        InteractantId::from(self.records.len() - 1)
    }

    fn rec(&self, id: InteractantId) -> &Record {
        &self.records[id.index()]
    }

    fn rec_mut(&mut self, id: InteractantId) -> &mut Record {
        &mut self.records[id.index()]
    }

    pub fn name(&self, id: InteractantId) -> &str {
        &self.rec(id).name
    }

    pub fn capacity(&self, id: InteractantId) -> usize {
        self.rec(id).capacity
    }

    /// Free holder slots (`capacity - |holders|`).
    pub fn n_free(&self, id: InteractantId) -> usize {
        let r = self.rec(id);
        r.capacity - r.holders.len()
    }

    pub fn holders(&self, id: InteractantId) -> &[AgentId] {
        &self.rec(id).holders
    }

    /// Length of `id`'s wait queue right now. Mirrors
    /// [`crate::sequencer::Sequencer::waiting_count`] for interactants.
    pub fn wait_len(&self, id: InteractantId) -> usize {
        self.rec(id).wait_queue.len()
    }

    /// A snapshot of `id`'s wait queue, FIFO order. Used by
    /// [`crate::MainLoop::interactant_waiters`] — a capacity-zero
    /// interactant (e.g. `sk-patch`'s outbound gates) never has holders, so
    /// census of who's "inside" it means the wait queue, not `holders`.
    pub fn waiters(&self, id: InteractantId) -> Vec<AgentId> {
        self.rec(id).wait_queue.iter().copied().collect()
    }

    /// `true` iff `agent` is a holder of `id`, or sitting in its wait queue.
    pub fn is_locked(&self, id: InteractantId, agent: AgentId) -> bool {
        let r = self.rec(id);
        r.holders.contains(&agent) || r.wait_queue.contains(&agent)
    }

    /// `true` iff, under `is_timeless`, any interactant in the registry has a
    /// non-timeless agent waiting in its queue — one half of
    /// `doneWithToday`'s condition. Scans every wait queue; cheap in
    /// practice since a rank's live interactant count is small.
    pub fn has_any_non_timeless_waiters(&self, is_timeless: impl Fn(AgentId) -> bool) -> bool {
        self.records
            .iter()
            .any(|r| r.wait_queue.iter().any(|&a| !is_timeless(a)))
    }

    /// `agent` attempts to lock `id`. `agent` must be the currently running
    /// agent unless it is a fast (uncontended) lock.
    pub fn lock(&mut self, id: InteractantId, agent: AgentId) -> LockOutcome {
        let r = self.rec_mut(id);
        if r.holders.contains(&agent) {
            debug!("{} already held by {agent}", r.name);
            return LockOutcome::Immediate;
        }
        if r.holders.len() < r.capacity {
            r.holders.push(agent);
            debug!("{} fast lock by {agent}", r.name);
            return LockOutcome::Immediate;
        }
        r.wait_queue.push_back(agent);
        debug!("{} slow lock by {agent} ({} in queue)", r.name, r.wait_queue.len());
        LockOutcome::Suspended
    }

    /// `agent` releases its hold on `id`. `agent` must currently be a holder.
    pub fn unlock(&mut self, id: InteractantId, agent: AgentId) -> KernelResult<UnlockOutcome> {
        let r = self.rec_mut(id);
        let pos = r
            .holders
            .iter()
            .position(|&a| a == agent)
            .ok_or_else(|| {
                KernelError::Contract("Interactant::unlock", format!("{} is not held by {agent}", r.name))
            })?;
        r.holders.remove(pos);
        match r.wait_queue.pop_front() {
            Some(new_agent) => {
                r.holders.push(new_agent);
                debug!("{} unlock by {agent} promotes {new_agent} ({} still in queue)", r.name, r.wait_queue.len());
                Ok(UnlockOutcome::Promoted(new_agent))
            }
            None => {
                debug!("{} fast unlock by {agent}", r.name);
                Ok(UnlockOutcome::Empty)
            }
        }
    }

    /// Remove `agent` from `id`'s wait queue and report it ready to run. Does
    /// not touch holders. Errors if `agent` isn't actually waiting.
    pub fn awaken(&mut self, id: InteractantId, agent: AgentId) -> KernelResult<()> {
        let r = self.rec_mut(id);
        let pos = r.wait_queue.iter().position(|&a| a == agent).ok_or_else(|| {
            KernelError::Contract(
                "Interactant::awaken",
                format!("{} does not hold {agent} in its wait queue", r.name),
            )
        })?;
        r.wait_queue.remove(pos);
        debug!("{} removes {agent} from wait queue ({} still in queue)", r.name, r.wait_queue.len());
        Ok(())
    }

    /// The inverse of `awaken`: park a currently-scheduled `agent` into
    /// `id`'s wait queue without it ever running. Errors if `agent` is
    /// already locked by `id`.
    pub fn suspend(&mut self, id: InteractantId, agent: AgentId) -> KernelResult<()> {
        let r = self.rec_mut(id);
        if r.holders.contains(&agent) || r.wait_queue.contains(&agent) {
            return Err(KernelError::Contract(
                "Interactant::suspend",
                format!("{} is already locked by {agent}", r.name),
            ));
        }
        r.wait_queue.push_back(agent);
        debug!("{} suspends {agent} into wait queue ({} in queue)", r.name, r.wait_queue.len());
        Ok(())
    }
}
