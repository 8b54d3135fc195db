//! `HoldQueue` / `Manager` / `RequestQueue` — the built-in convenience from
//! `SPEC_FULL.md` §4.3, grounded on
//! `examples/original_source/src/quilt/peopleplaces.py`'s
//! `HoldQueue`/`Manager`/`RequestQueue`/`ManagementBase` classes.
//!
//! The original's `Manager.run` reads a `RequestQueue`'s private lock queue
//! directly because its greenlet scheduler is fully cooperative within one
//! process. Here a `Manager` is an ordinary agent with its own OS thread, so
//! it polls the queue's wait list through [`sk_kernel::AgentContext::interactant_waiters`]
//! instead — same picture, reached through the kernel's public census API
//! rather than a private field.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use sk_core::Tick;
use sk_kernel::{AgentBody, AgentContext, AgentId, InteractantId, MainLoop};

use crate::error::{PatchError, PatchResult};

/// A keyed variant of a plain interactant: lets a caller `awaken` a specific
/// waiter by an opaque key instead of by [`AgentId`], for the common case
/// where the waker doesn't itself know which agent is blocked on which
/// request. Mirrors the original's `HoldQueue`.
pub struct HoldQueue {
    iid: InteractantId,
    held: Mutex<HashMap<u64, AgentId>>,
    next_key: AtomicU64,
}

impl HoldQueue {
    pub fn new(main_loop: &mut MainLoop, name: impl Into<String>) -> Self {
        Self { iid: main_loop.create_interactant(name), held: Mutex::new(HashMap::new()), next_key: AtomicU64::new(0) }
    }

    pub fn interactant(&self) -> InteractantId {
        self.iid
    }

    /// A fresh key, unique for the lifetime of this queue.
    pub fn next_key(&self) -> u64 {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }

    /// Record `agent`'s key. Call this from `agent`'s own thread right
    /// before `ctx.lock(queue.interactant())` — mirrors the original
    /// `HoldQueue.lock`, which stashes the key in the same call that enters
    /// the wait queue.
    pub fn register(&self, key: u64, agent: AgentId) {
        self.held.lock().unwrap().insert(key, agent);
    }

    /// Wake the agent registered under `key`. Must be called from another
    /// agent's own context (a `Manager`, typically), not from the driver.
    pub fn awaken_by_key(&self, ctx: &AgentContext, key: u64) -> PatchResult<()> {
        let agent = self
            .held
            .lock()
            .unwrap()
            .remove(&key)
            .ok_or_else(|| PatchError::Unknown { what: "HoldQueue key", name: key.to_string() })?;
        ctx.awaken(self.iid, agent)?;
        Ok(())
    }

    /// Wake `agent` directly, when the caller already knows which agent (not
    /// just which key) is waiting.
    pub fn awaken_agent(&self, ctx: &AgentContext, agent: AgentId) -> PatchResult<()> {
        ctx.awaken(self.iid, agent)?;
        Ok(())
    }
}

/// One pending request's payload, stashed by the submitting agent before it
/// parks itself in the queue — the request-queue counterpart of
/// `crate::patch::PendingSends`. Keyed by the submitter's own `AgentId` since
/// a request queue, unlike an outbound gate, is drained one waiter at a time
/// in FIFO order rather than all at once.
pub type RequestPayloads = Arc<Mutex<HashMap<AgentId, (u32, Vec<u8>)>>>;

/// A plain interactant used as a request mailbox: any number of agents may
/// queue up on it; a [`ManagerBody`] drains it one request at a time. Plain
/// subclass of `Interactant` in the original; here just a thin wrapper
/// pairing the interactant with its [`RequestPayloads`] side channel.
pub struct RequestQueue {
    iid: InteractantId,
    payloads: RequestPayloads,
}

impl RequestQueue {
    pub fn new(main_loop: &mut MainLoop, name: impl Into<String>) -> Self {
        Self { iid: main_loop.create_interactant(name), payloads: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn interactant(&self) -> InteractantId {
        self.iid
    }

    pub fn payloads(&self) -> RequestPayloads {
        self.payloads.clone()
    }

    /// Record `agent`'s request. Call from `agent`'s own thread right before
    /// `ctx.lock(queue.interactant())`.
    pub fn submit(&self, agent: AgentId, kind: u32, payload: Vec<u8>) {
        self.payloads.lock().unwrap().insert(agent, (kind, payload));
    }
}

/// Handles one drained request and reports the new `timeNow`, the way
/// `ManagementBase.handleIncomingMsg` does. Implemented by domain code built
/// on `sk-patch`.
pub trait RequestHandler: Send {
    fn handle_request(&mut self, kind: u32, payload: &[u8], time_now: Tick) -> Tick;

    /// Optional per-tick hook, run once per `Manager` cycle after the queues
    /// have been drained — `perTickActions` in the original.
    fn per_tick_actions(&mut self, _time_now: Tick) {}
}

/// The `timeless` agent that repeatedly drains a fixed set of
/// [`RequestQueue`]s, dispatching each request to a [`RequestHandler`] and
/// waking the requester. Mirrors the original's `Manager.run`.
pub struct ManagerBody {
    queues: Vec<RequestQueue>,
    handler: Box<dyn RequestHandler>,
}

impl ManagerBody {
    pub fn new(queues: Vec<RequestQueue>, handler: Box<dyn RequestHandler>) -> Self {
        Self { queues, handler }
    }
}

impl AgentBody for ManagerBody {
    fn run(&mut self, ctx: &mut AgentContext, start_time: Tick) {
        ctx.set_timeless(true);

        // Take permanent hold of every queue first, the way the original's
        // `ManagementBase.__init__` does (`rQ.lock(self.manager)`): each
        // queue has capacity 1, so once the manager holds it, every genuine
        // requester piles up in its wait queue instead of acquiring it —
        // that wait queue is exactly what `interactant_waiters` below polls.
        for q in &self.queues {
            if let Err(e) = ctx.lock(q.interactant()) {
                log::error!("Manager failed to claim queue {:?}: {e}", q.interactant());
                return;
            }
        }

        let mut time_now = start_time;
        loop {
            let mut found_any = true;
            while found_any {
                found_any = false;
                for q in &self.queues {
                    let Some(&req) = ctx.interactant_waiters(q.interactant()).first() else { continue };
                    found_any = true;
                    let payload = q.payloads.lock().unwrap().remove(&req);
                    if let Some((kind, bytes)) = payload {
                        time_now = self.handler.handle_request(kind, &bytes, time_now);
                    }
                    if let Err(e) = ctx.awaken(q.interactant(), req) {
                        log::error!("Manager failed to awaken {req}: {e}");
                    }
                }
            }
            self.handler.per_tick_actions(time_now);
            time_now = match ctx.sleep(0) {
                Ok(t) => t,
                Err(_) => return,
            };
        }
    }
}
