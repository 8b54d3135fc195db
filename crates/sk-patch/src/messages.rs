//! The agent-as-message pattern (`spec.md` §4.7): a message is an agent
//! whose body is the small `MOVING -> ARRIVED` state machine. Grounded on
//! `examples/original_source/src/quilt/peopleplaces.py`'s `SimpleMsg` /
//! `ArrivalMsg` / `DepartureMsg` / `FutureMsg`.
//!
//! The original gives `ArrivalMsg`/`DepartureMsg` as bare subclasses of
//! `SimpleMsg`, distinguished only by Python type; here they're the same
//! [`MessageBody`] distinguished only by `kind`, matching the "tagged
//! variant... plus an extensibility hook" guidance in `spec.md` §9.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use sk_core::{GblAddr, Tick};
use sk_kernel::{AgentBody, AgentContext};

use crate::checkpoint::Checkpointable;
use crate::patch::{PendingSends, Routing};

/// A plain point-to-point message: arrives as soon as it reaches its
/// destination, no earlier-than constraint.
pub const KIND_SIMPLE: u32 = 0;
/// A `DepartureMsg`/`ArrivalMsg`-equivalent: same FSM as [`KIND_SIMPLE`], a
/// distinct tag only so a handler can dispatch on occupancy-change intent.
pub const KIND_DEPARTURE: u32 = 1;
pub const KIND_ARRIVAL: u32 = 2;
/// A `FutureMsg`: additionally carries `arrivalTime` and never delivers
/// before it.
pub const KIND_FUTURE: u32 = 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum FsmState {
    Moving,
    Arrived,
}

/// What crosses the wire for every message kind here: origin, destination,
/// opaque domain payload, and (for [`KIND_FUTURE`]) the earliest delivery
/// time. Generalizes the source's `__getstate__`/`__setstate__` pickle pair.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct WireMsgState {
    pub kind: u32,
    pub src: GblAddr,
    pub dest: GblAddr,
    pub payload: Vec<u8>,
    pub arrival_time: Option<u64>,
}

/// One in-flight message agent. `kind` only ever changes how it was tagged
/// on the wire and which [`MsgKindRegistry`] entry reconstructs it — the
/// FSM itself is identical for all four kinds.
pub struct MessageBody {
    kind: u32,
    src: GblAddr,
    dest: GblAddr,
    payload: Vec<u8>,
    arrival_time: Option<Tick>,
    routing: Arc<Routing>,
    pending_sends: PendingSends,
    fsm: FsmState,
}

impl MessageBody {
    pub fn new(
        kind: u32,
        src: GblAddr,
        dest: GblAddr,
        payload: Vec<u8>,
        arrival_time: Option<Tick>,
        routing: Arc<Routing>,
        pending_sends: PendingSends,
    ) -> Self {
        Self { kind, src, dest, payload, arrival_time, routing, pending_sends, fsm: FsmState::Moving }
    }

    fn from_wire(state: WireMsgState, routing: Arc<Routing>, pending_sends: PendingSends) -> Self {
        Self::new(
            state.kind,
            state.src,
            state.dest,
            state.payload,
            state.arrival_time.map(Tick),
            routing,
            pending_sends,
        )
    }
}

impl Checkpointable for MessageBody {
    fn checkpoint(&self) -> Vec<u8> {
        let state = WireMsgState {
            kind: self.kind,
            src: self.src,
            dest: self.dest,
            payload: self.payload.clone(),
            arrival_time: self.arrival_time.map(|t| t.0),
        };
        bincode::serialize(&state).expect("WireMsgState always serializes")
    }
}

impl AgentBody for MessageBody {
    fn run(&mut self, ctx: &mut AgentContext, start_time: Tick) {
        if let Some(arrival_time) = self.arrival_time {
            assert!(arrival_time >= start_time, "FutureMsg arrivalTime must not be in the past");
        }

        let mut time_now = start_time;
        loop {
            match self.fsm {
                FsmState::Moving => {
                    let (hop, final_hop) = match self.routing.get_path_to(self.dest) {
                        Ok(pair) => pair,
                        Err(e) => {
                            debug!("message {}->{} has no route: {e}", self.src, self.dest);
                            return;
                        }
                    };
                    if final_hop {
                        self.fsm = FsmState::Arrived;
                        continue;
                    }
                    // Non-final hop: this is an outbound gate. Stash the
                    // payload first — this agent is never resumed again, it
                    // is killed by `Patch::drain_outbound_gates` once its
                    // lock attempt has parked it in the gate's wait queue.
                    // The wire envelope's src/dst (patch-to-patch) is filled
                    // in by `drain_outbound_gates`, not here — this agent's
                    // own src/dest travel inside the checkpoint instead.
                    let cargo = self.checkpoint();
                    self.pending_sends.lock().unwrap().entry(hop).or_default().push((self.kind, cargo));
                    let _ = ctx.lock(hop);
                    // Reached only if something resumed us — shouldn't
                    // happen for an outbound gate; terminate defensively.
                    return;
                }
                FsmState::Arrived => {
                    if let Some(arrival_time) = self.arrival_time {
                        if time_now < arrival_time {
                            time_now = match ctx.sleep(arrival_time.since(time_now)) {
                                Ok(t) => t,
                                Err(_) => return,
                            };
                            continue;
                        }
                    }
                    let Ok((hop, _)) = self.routing.get_path_to(self.dest) else { return };
                    let _ = ctx.lock(hop);
                    return;
                }
            }
        }
    }
}

/// Maps a wire `kind` tag to the factory that reconstructs a [`MessageBody`]
/// from its decoded [`WireMsgState`] — "a registry mapping kind-id ->
/// handler for domain extensions" (`spec.md` §9).
pub struct MsgKindRegistry {
    factories: HashMap<u32, Box<dyn Fn(WireMsgState, Arc<Routing>, PendingSends) -> MessageBody + Send + Sync>>,
}

impl Default for MsgKindRegistry {
    fn default() -> Self {
        let mut reg = Self { factories: HashMap::new() };
        reg.register(KIND_SIMPLE, |s, r, p| MessageBody::from_wire(s, r, p));
        reg.register(KIND_DEPARTURE, |s, r, p| MessageBody::from_wire(s, r, p));
        reg.register(KIND_ARRIVAL, |s, r, p| MessageBody::from_wire(s, r, p));
        reg.register(KIND_FUTURE, |s, r, p| MessageBody::from_wire(s, r, p));
        reg
    }
}

impl MsgKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or override) the factory for `kind`. Domain code can add
    /// its own message kinds beyond the four built in here.
    pub fn register(
        &mut self,
        kind: u32,
        factory: impl Fn(WireMsgState, Arc<Routing>, PendingSends) -> MessageBody + Send + Sync + 'static,
    ) {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn construct(&self, cargo: &[u8], routing: Arc<Routing>, pending_sends: PendingSends) -> Option<MessageBody> {
        let state: WireMsgState = bincode::deserialize(cargo).ok()?;
        let factory = self.factories.get(&state.kind)?;
        Some(factory(state, routing, pending_sends))
    }
}
