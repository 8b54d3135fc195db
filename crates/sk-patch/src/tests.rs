//! Unit and scenario tests for sk-patch.

#[cfg(test)]
mod routing {
    use std::collections::{HashMap, HashSet};

    use sk_core::{GblAddr, LclId};
    use sk_kernel::InteractantId;

    use crate::patch::{Gate, Routing};

    fn routing(addr: GblAddr) -> Routing {
        Routing { addr, gates: HashMap::new(), local: HashMap::new(), services: HashMap::new() }
    }

    #[test]
    fn local_destination_resolves_final() {
        let addr = GblAddr::new(0, LclId::Plain(0));
        let mut r = routing(addr);
        let dest = GblAddr::new(0, LclId::Child(0, 3));
        let iid = InteractantId::from(5usize);
        r.local.insert(dest.lcl_id, iid);
        let (resolved, is_final) = r.get_path_to(dest).unwrap();
        assert_eq!(resolved, iid);
        assert!(is_final);
    }

    #[test]
    fn foreign_destination_resolves_to_outbound_gate() {
        let addr = GblAddr::new(0, LclId::Plain(0));
        let mut r = routing(addr);
        let neighbor = GblAddr::new(1, LclId::Plain(0));
        let out = InteractantId::from(7usize);
        r.gates.insert(neighbor, Gate { out: Some(out), in_: None });
        let dest = GblAddr::new(1, LclId::Child(0, 2));
        let (resolved, is_final) = r.get_path_to(dest).unwrap();
        assert_eq!(resolved, out);
        assert!(!is_final);
    }

    #[test]
    fn gate_without_outbound_half_is_a_config_error() {
        let addr = GblAddr::new(0, LclId::Plain(0));
        let mut r = routing(addr);
        let neighbor = GblAddr::new(1, LclId::Plain(0));
        r.gates.insert(neighbor, Gate { out: None, in_: Some(InteractantId::from(1usize)) });
        let dest = GblAddr::new(1, LclId::Child(0, 2));
        assert!(r.get_path_to(dest).is_err());
    }

    #[test]
    fn unknown_neighbor_is_an_unknown_error() {
        let addr = GblAddr::new(0, LclId::Plain(0));
        let r = routing(addr);
        let dest = GblAddr::new(9, LclId::Plain(0));
        assert!(r.get_path_to(dest).is_err());
    }

    #[test]
    fn service_lookup_merges_addresses_registered_under_the_same_name() {
        let mut services: HashMap<String, HashSet<GblAddr>> = HashMap::new();
        services.entry("clinic".into()).or_default().insert(GblAddr::new(0, LclId::Plain(1)));
        services.entry("clinic".into()).or_default().insert(GblAddr::new(1, LclId::Plain(4)));
        let r = Routing { addr: GblAddr::new(0, LclId::Plain(0)), gates: HashMap::new(), local: HashMap::new(), services };
        assert_eq!(r.service_lookup("clinic").len(), 2);
        assert!(r.service_lookup("pharmacy").is_empty());
    }
}

#[cfg(test)]
mod single_patch {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use sk_core::{GblAddr, LclId};

    use crate::messages::{MsgKindRegistry, WireMsgState, KIND_SIMPLE};
    use crate::patch::Patch;

    /// Scenario 3 (`spec.md` §8): a message agent addressed to a terminal
    /// interactant local to its own patch arrives without ever touching a
    /// gate, and permanently holds the destination interactant.
    ///
    /// The clock agent never terminates on its own (`sk_kernel::ClockAgent`
    /// loops forever by design), so a per-day callback stops the loop once
    /// the message has had a chance to run.
    #[test]
    fn local_message_delivers_without_a_gate() {
        let addr = GblAddr::new(0, LclId::Plain(0));
        let registry = Arc::new(MsgKindRegistry::new());
        let mut patch = Patch::new(addr, registry.clone());

        let (dest_iid, dest_addr) = patch.create_interactant("lobby");
        patch.freeze_routing();

        let state = WireMsgState { kind: KIND_SIMPLE, src: addr, dest: dest_addr, payload: vec![], arrival_time: None };
        let cargo = bincode::serialize(&state).unwrap();
        let body = registry
            .construct(&cargo, patch.routing().unwrap(), patch.pending_sends())
            .expect("simple kind is always constructible");
        patch.add_agent("msg", false, Box::new(body));

        let stop_flag = patch.main_loop().stop_flag();
        patch.main_loop().add_per_day_callback(move |_| stop_flag.store(true, Ordering::SeqCst));
        patch.main_loop().run();

        assert!(patch.main_loop_ref().interactant_waiters(dest_iid).is_empty());
    }
}

#[cfg(test)]
mod two_patch_group {
    use std::sync::Arc;

    use sk_core::{GblAddr, LclId};
    use sk_net::DummyNetworkInterface;

    use crate::messages::{MsgKindRegistry, WireMsgState, KIND_SIMPLE};
    use crate::patch::Patch;
    use crate::patch_group::PatchGroup;

    /// Scenario 4/6 (`spec.md` §8): two patches connected by a gate pair. A
    /// message addressed to the far patch's terminal interactant crosses the
    /// gate and is redelivered as a freshly spawned agent on the receiving
    /// patch. Both patches run on the same (dummy, single-rank) network, but
    /// the gate mechanics are identical to the cross-rank case.
    #[test]
    fn message_crosses_a_gate_between_two_patches_on_one_rank() {
        let registry = Arc::new(MsgKindRegistry::new());
        let net = Box::new(DummyNetworkInterface::new(true));
        let mut group = PatchGroup::new(net);

        let addr_a = GblAddr::new(0, LclId::Plain(0));
        let addr_b = GblAddr::new(0, LclId::Plain(1));

        let mut patch_a = Patch::new(addr_a, registry.clone());
        patch_a.add_gate_to(addr_b);

        let mut patch_b = Patch::new(addr_b, registry.clone());
        patch_b.add_gate_from(addr_a);
        let (dest_iid, dest_addr) = patch_b.create_interactant("clinic");

        group.add_patch(patch_a);
        group.add_patch(patch_b);
        group.finalize().unwrap();

        let routing_a = group.patches()[0].routing().unwrap();
        let pending_a = group.patches()[0].pending_sends();
        let state =
            WireMsgState { kind: KIND_SIMPLE, src: addr_a, dest: dest_addr, payload: vec![42], arrival_time: None };
        let cargo = bincode::serialize(&state).unwrap();
        let body = registry.construct(&cargo, routing_a, pending_a).unwrap();
        group.patches_mut()[0].add_agent("traveler", false, Box::new(body));

        group.barrier();
        // A handful of rounds is enough for the agent to lock the outbound
        // gate, cross via the dummy network, and be redelivered as a holder
        // of patch B's terminal interactant.
        for _ in 0..8 {
            if !group.switch().unwrap() {
                break;
            }
        }

        assert!(group.patches()[1].main_loop_ref().interactant_waiters(dest_iid).is_empty());
    }
}

#[cfg(test)]
mod queues {
    use std::sync::{Arc, Mutex};

    use sk_core::Tick;
    use sk_kernel::{AgentBody, AgentContext, MainLoop};

    use crate::queues::{HoldQueue, ManagerBody, RequestHandler, RequestQueue};

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<u32>>>,
    }

    impl RequestHandler for RecordingHandler {
        fn handle_request(&mut self, kind: u32, _payload: &[u8], time_now: Tick) -> Tick {
            self.seen.lock().unwrap().push(kind);
            time_now
        }
    }

    #[test]
    fn manager_drains_a_request_queue_and_wakes_the_requester() {
        use std::sync::atomic::Ordering;

        let mut main_loop = MainLoop::builder("queue-test").build();
        let rq = RequestQueue::new(&mut main_loop, "requests");
        let rq_iid = rq.interactant();
        let payloads = rq.payloads();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = Box::new(RecordingHandler { seen: seen.clone() });
        main_loop.add_agent("manager", true, Box::new(ManagerBody::new(vec![rq], handler)));

        struct Submitter {
            iid: sk_kernel::InteractantId,
            payloads: crate::queues::RequestPayloads,
        }
        impl AgentBody for Submitter {
            fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
                self.payloads.lock().unwrap().insert(ctx.id(), (7, vec![1, 2, 3]));
                ctx.lock(self.iid).unwrap();
            }
        }
        main_loop.add_agent("submitter", false, Box::new(Submitter { iid: rq_iid, payloads }));

        // The manager (like the clock agent) loops forever by design; stop
        // after the first day transition, which is well after the
        // submitter's single request has been drained.
        let stop_flag = main_loop.stop_flag();
        main_loop.add_per_day_callback(move |_| stop_flag.store(true, Ordering::SeqCst));
        main_loop.run();
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn hold_queue_hands_out_increasing_keys() {
        let mut main_loop = MainLoop::builder("hold-queue-test").safety(50).build();
        let hq = HoldQueue::new(&mut main_loop, "held");
        assert_eq!(hq.next_key(), 0);
        assert_eq!(hq.next_key(), 1);
    }

    #[test]
    fn hold_queue_awaken_by_unknown_key_is_an_error() {
        let mut main_loop = MainLoop::builder("hold-queue-test-2").safety(50).build();
        let hq = Arc::new(HoldQueue::new(&mut main_loop, "held"));
        let result = Arc::new(Mutex::new(None));

        struct Checker {
            hq: Arc<HoldQueue>,
            result: Arc<Mutex<Option<bool>>>,
        }
        impl AgentBody for Checker {
            fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
                let is_err = self.hq.awaken_by_key(ctx, 999).is_err();
                *self.result.lock().unwrap() = Some(is_err);
            }
        }
        main_loop.add_agent("checker", true, Box::new(Checker { hq: hq.clone(), result: result.clone() }));

        // `checker` terminates after one resume, but the clock agent loops
        // forever by design and was registered first, so it's resumed (and
        // yields) before `checker` gets a turn on the very first round.
        // A couple of rounds is enough for `checker` to run too.
        for _ in 0..3 {
            main_loop.run_until_clock_yield();
        }
        main_loop.shutdown();
        assert_eq!(*result.lock().unwrap(), Some(true));
    }
}
