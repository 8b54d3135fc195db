//! A **Patch**: a rank-local container of interactants, gates, and agents
//! with its own `MainLoop` — `spec.md` §4.5, and the ownership-direction
//! note in §9 ("PatchGroup ⊃ Patch ⊃ {MainLoop, Interactants, Gates,
//! Service directory}").

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use sk_core::{GblAddr, LclId};
use sk_kernel::{AgentBody, InteractantId, MainLoop, MainLoopBuilder};
use sk_net::WireEntry;

use crate::error::{PatchError, PatchResult};
use crate::messages::MsgKindRegistry;

/// A gate pair connecting this patch to one neighbor patch — "an interactant
/// pair (outbound/inbound) connecting two patches across the network"
/// (GLOSSARY). Either side may be absent until both `addGateTo`/
/// `addGateFrom` have been called for that neighbor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gate {
    pub out: Option<InteractantId>,
    pub in_: Option<InteractantId>,
}

/// The capacity an outbound gate interactant is created with: zero, so
/// *every* lock attempt suspends into its wait queue rather than ever
/// completing immediately. `Patch::drain_outbound_gates` is the only thing
/// that ever removes a waiter from it, by killing the waiting agent outright
/// rather than resuming it — the agent has, conceptually, left this rank.
/// See `DESIGN.md` for why this replaces the source's "lock an outbound gate
/// pickles and forwards the message" behavior.
const OUT_GATE_CAPACITY: usize = 0;

/// The read-only routing snapshot handed to every message agent this patch
/// spawns, frozen once via [`Patch::freeze_routing`] (`spec.md` §4.5: the
/// service directory is "gossiped at patch-group start so every patch has
/// the same view" — gates and local addresses are equally fixed by then).
#[derive(Clone, Debug)]
pub struct Routing {
    pub addr: GblAddr,
    pub gates: HashMap<GblAddr, Gate>,
    pub local: HashMap<LclId, InteractantId>,
    pub services: HashMap<String, HashSet<GblAddr>>,
}

impl Routing {
    /// `spec.md` §4.5's `getPathTo`: local destinations return the terminal
    /// interactant with `final = true`; anything else resolves to the
    /// neighbor patch's outbound gate with `final = false`.
    pub fn get_path_to(&self, dest: GblAddr) -> PatchResult<(InteractantId, bool)> {
        if dest.patch_addr() == self.addr {
            let iid = self
                .local
                .get(&dest.lcl_id)
                .copied()
                .ok_or_else(|| PatchError::Unknown { what: "local address", name: dest.to_string() })?;
            Ok((iid, true))
        } else {
            let neighbor = dest.patch_addr();
            let gate = self
                .gates
                .get(&neighbor)
                .ok_or_else(|| PatchError::Unknown { what: "gate to neighbor patch", name: neighbor.to_string() })?;
            let out = gate
                .out
                .ok_or_else(|| PatchError::Config(format!("no outbound gate installed toward {neighbor}")))?;
            Ok((out, false))
        }
    }

    pub fn service_lookup(&self, name: &str) -> HashSet<GblAddr> {
        self.services.get(name).cloned().unwrap_or_default()
    }
}

/// Shared handle a spawned message agent uses to deposit its `(msgType,
/// cargo)` payload before blocking on an outbound gate. Keyed by the gate's
/// outbound `InteractantId`; `Patch::drain_outbound_gates` is the sole
/// reader.
///
/// Deliberately *not* a full `WireEntry`: the wire envelope's `src`/`dst`
/// must be this patch's and its neighbor's patch-level addresses (that's
/// what `NetworkInterface::expect` keys its registration on), which only
/// `drain_outbound_gates` knows — the message agent only knows its own
/// logical origin/destination, which travels inside `cargo` instead.
pub(crate) type PendingSends = Arc<Mutex<HashMap<InteractantId, Vec<(u32, Vec<u8>)>>>>;

/// One raw delivery waiting to be reconstructed into a fresh message agent
/// by `PatchGroup`'s dispatch step, after `finishRecv`. The wire-level
/// `msgType` tag is not retained here — `MsgKindRegistry::construct` reads
/// the kind back out of the decoded `WireMsgState` itself.
pub(crate) type InboxQueue = Arc<Mutex<Vec<Vec<u8>>>>;

pub struct Patch {
    addr: GblAddr,
    main_loop: MainLoop,
    gates: HashMap<GblAddr, Gate>,
    local: HashMap<LclId, InteractantId>,
    services: HashMap<String, HashSet<GblAddr>>,
    routing: Option<Arc<Routing>>,
    pending_sends: PendingSends,
    inbox: InboxQueue,
    msg_registry: Arc<MsgKindRegistry>,
    next_child_id: u32,
}

impl Patch {
    pub fn new(addr: GblAddr, msg_registry: Arc<MsgKindRegistry>) -> Self {
        Self::with_builder(addr, msg_registry, MainLoop::builder(addr.to_string()))
    }

    /// Same as [`Self::new`], but lets the caller tune the `MainLoop`
    /// (e.g. a `safety` bound) before it's built.
    pub fn with_builder(addr: GblAddr, msg_registry: Arc<MsgKindRegistry>, builder: MainLoopBuilder) -> Self {
        Self {
            addr,
            main_loop: builder.build(),
            gates: HashMap::new(),
            local: HashMap::new(),
            services: HashMap::new(),
            routing: None,
            pending_sends: Arc::new(Mutex::new(HashMap::new())),
            inbox: Arc::new(Mutex::new(Vec::new())),
            msg_registry,
            next_child_id: 0,
        }
    }

    pub fn addr(&self) -> GblAddr {
        self.addr
    }

    pub fn main_loop(&mut self) -> &mut MainLoop {
        &mut self.main_loop
    }

    pub fn main_loop_ref(&self) -> &MainLoop {
        &self.main_loop
    }

    fn next_addr(&mut self) -> GblAddr {
        let id = self.next_child_id;
        self.next_child_id += 1;
        GblAddr::new(self.addr.rank, LclId::Child(self.addr.lcl_id.patch_id(), id))
    }

    /// Register a single-holder interactant local to this patch and give it
    /// a globally addressable `GblAddr`, for use as a message destination.
    pub fn create_interactant(&mut self, name: impl Into<String>) -> (InteractantId, GblAddr) {
        let addr = self.next_addr();
        let iid = self.main_loop.create_interactant(name);
        self.local.insert(addr.lcl_id, iid);
        (iid, addr)
    }

    /// Register a capacity-`n` `MultiInteractant`, addressable the same way.
    pub fn create_multi_interactant(&mut self, name: impl Into<String>, capacity: usize) -> (InteractantId, GblAddr) {
        let addr = self.next_addr();
        let iid = self.main_loop.create_multi_interactant(name, capacity);
        self.local.insert(addr.lcl_id, iid);
        (iid, addr)
    }

    /// Install (or complete) the outbound half of the gate toward
    /// `neighbor_patch`. `spec.md` §4.5: "an outbound gate (an interactant
    /// agents lock to emit themselves outward)".
    pub fn add_gate_to(&mut self, neighbor_patch: GblAddr) -> InteractantId {
        debug_assert_eq!(neighbor_patch, neighbor_patch.patch_addr(), "gates key on patch-level addresses");
        let out = self.main_loop.create_multi_interactant(format!("outgate->{neighbor_patch}"), OUT_GATE_CAPACITY);
        self.gates.entry(neighbor_patch).or_default().out = Some(out);
        out
    }

    /// Install (or complete) the inbound half of the gate from
    /// `neighbor_patch`. Arriving agents are reconstructed and spawned
    /// directly into this patch's `MainLoop` by `PatchGroup`'s dispatch step
    /// (see `patch_group.rs`) rather than ever literally locking this
    /// interactant — but it is still registered, matching the gate table's
    /// symmetric shape from `spec.md`'s GLOSSARY entry.
    pub fn add_gate_from(&mut self, neighbor_patch: GblAddr) -> InteractantId {
        debug_assert_eq!(neighbor_patch, neighbor_patch.patch_addr(), "gates key on patch-level addresses");
        let in_ = self.main_loop.create_interactant(format!("ingate<-{neighbor_patch}"));
        self.gates.entry(neighbor_patch).or_default().in_ = Some(in_);
        in_
    }

    pub fn register_service(&mut self, name: impl Into<String>, addr: GblAddr) {
        self.services.entry(name.into()).or_default().insert(addr);
    }

    /// Merge a gossiped snapshot of every patch's service directory into
    /// this one's, per `spec.md` §4.5 ("gossiped at patch-group start so
    /// every patch has the same view").
    pub(crate) fn merge_services(&mut self, other: &HashMap<String, HashSet<GblAddr>>) {
        for (name, addrs) in other {
            self.services.entry(name.clone()).or_default().extend(addrs.iter().copied());
        }
    }

    pub fn service_lookup(&self, name: &str) -> HashSet<GblAddr> {
        self.services.get(name).cloned().unwrap_or_default()
    }

    pub fn services(&self) -> &HashMap<String, HashSet<GblAddr>> {
        &self.services
    }

    /// The gate table, keyed by neighbor patch address. Read by
    /// `PatchGroup::finalize` to register this rank's inbound `expect`
    /// handlers.
    pub(crate) fn gate_table(&self) -> &HashMap<GblAddr, Gate> {
        &self.gates
    }

    /// Snapshot the current gate table, local addresses, and service
    /// directory into the `Arc<Routing>` every subsequently spawned message
    /// agent will share. Called once by `PatchGroup::add_patch`; gates,
    /// locals, and services added afterward are not visible to agents
    /// spawned before the next `freeze_routing` call.
    pub(crate) fn freeze_routing(&mut self) {
        self.routing = Some(Arc::new(Routing {
            addr: self.addr,
            gates: self.gates.clone(),
            local: self.local.clone(),
            services: self.services.clone(),
        }));
    }

    pub fn routing(&self) -> PatchResult<Arc<Routing>> {
        self.routing.clone().ok_or_else(|| PatchError::Config("patch routing not frozen yet".into()))
    }

    pub(crate) fn pending_sends(&self) -> PendingSends {
        self.pending_sends.clone()
    }

    pub(crate) fn inbox(&self) -> InboxQueue {
        self.inbox.clone()
    }

    pub fn msg_registry(&self) -> Arc<MsgKindRegistry> {
        self.msg_registry.clone()
    }

    /// Spawn `body` as an ordinary (non-message) agent.
    pub fn add_agent(&mut self, name: impl Into<String>, timeless: bool, body: Box<dyn AgentBody>) -> sk_kernel::AgentId {
        self.main_loop.add_agent(name, timeless, body)
    }

    /// Drain every outbound gate's wait queue: for each waiting agent, its
    /// `(msgType, cargo)` payload (stashed in `pending_sends` right before it
    /// locked the gate) is wrapped into a [`WireEntry`] addressed from this
    /// patch to the neighbor the gate leads to and handed to `sink`, and the
    /// agent itself is killed — it has logically left this rank. Returns the
    /// total number of entries drained, across all gates. Called by
    /// `PatchGroup` during `startSend`.
    pub(crate) fn drain_outbound_gates(&mut self, mut sink: impl FnMut(WireEntry)) -> PatchResult<usize> {
        let mut drained = 0;
        for (&neighbor, gate) in self.gates.iter() {
            let Some(out) = gate.out else { continue };
            let waiting: Vec<sk_kernel::AgentId> = self.main_loop.interactant_waiters(out);
            if waiting.is_empty() {
                continue;
            }
            let payloads = {
                let mut pending = self.pending_sends.lock().unwrap();
                pending.remove(&out).unwrap_or_default()
            };
            for (msg_type, cargo) in payloads {
                sink(WireEntry { msg_type, src: self.addr, dst: neighbor, cargo });
                drained += 1;
            }
            for agent in waiting {
                self.main_loop.kill_agent(agent)?;
            }
        }
        Ok(drained)
    }
}
