//! Unit and scenario tests for sk-kernel.

#[cfg(test)]
mod sequencer {
    use crate::ids::AgentId;
    use crate::sequencer::Sequencer;
    use sk_core::Tick;

    #[test]
    fn fifo_within_a_time_slot() {
        let mut seq = Sequencer::new("s");
        seq.enqueue(AgentId(1), Tick::ZERO).unwrap();
        seq.enqueue(AgentId(2), Tick::ZERO).unwrap();
        seq.enqueue(AgentId(3), Tick::ZERO).unwrap();
        let mut popped = Vec::new();
        while let Some((a, _)) = seq.iterate_next(|_| {}) {
            popped.push(a);
        }
        assert_eq!(popped, vec![AgentId(1), AgentId(2), AgentId(3)]);
    }

    #[test]
    fn iterate_next_skips_empty_days_and_advances_time() {
        let mut seq = Sequencer::new("s");
        seq.enqueue(AgentId(0), Tick(3)).unwrap();
        let mut day_changes = Vec::new();
        let popped = seq.iterate_next(|t| day_changes.push(t));
        assert_eq!(popped, Some((AgentId(0), Tick(3))));
        assert_eq!(day_changes, vec![Tick(1), Tick(2), Tick(3)]);
        assert_eq!(seq.time_now(), Tick(3));
    }

    #[test]
    fn enqueue_before_time_now_is_a_contract_violation() {
        let mut seq = Sequencer::new("s");
        seq.enqueue(AgentId(0), Tick(5)).unwrap();
        seq.iterate_next(|_| {});
        assert!(seq.enqueue(AgentId(1), Tick::ZERO).is_err());
    }

    #[test]
    fn unenqueue_removes_from_the_queue_it_was_in() {
        let mut seq = Sequencer::new("s");
        seq.enqueue(AgentId(0), Tick::ZERO).unwrap();
        seq.enqueue(AgentId(1), Tick::ZERO).unwrap();
        seq.unenqueue(AgentId(0), Tick::ZERO).unwrap();
        let (remaining, _) = seq.iterate_next(|_| {}).unwrap();
        assert_eq!(remaining, AgentId(1));
    }

    #[test]
    fn unenqueue_mismatch_is_a_contract_violation() {
        let mut seq = Sequencer::new("s");
        seq.enqueue(AgentId(0), Tick(2)).unwrap();
        assert!(seq.unenqueue(AgentId(0), Tick::ZERO).is_err());
    }

    #[test]
    fn unenqueue_of_an_absent_agent_is_a_silent_no_op() {
        let mut seq = Sequencer::new("s");
        assert!(seq.unenqueue(AgentId(9), Tick::ZERO).is_ok());
    }

    #[test]
    fn bump_time_carries_over_remaining_agents() {
        let mut seq = Sequencer::new("s");
        seq.enqueue(AgentId(0), Tick::ZERO).unwrap();
        let new_time = seq.bump_time();
        assert_eq!(new_time, Tick(1));
        let (agent, t) = seq.iterate_next(|_| {}).unwrap();
        assert_eq!((agent, t), (AgentId(0), Tick(1)));
    }

    #[test]
    fn today_all_timeless_is_true_when_today_is_empty() {
        let seq = Sequencer::new("s");
        assert!(seq.today_all_timeless(|_| false));
    }

    #[test]
    fn waiting_count_excludes_timeless_agents() {
        let mut seq = Sequencer::new("s");
        seq.enqueue(AgentId(0), Tick::ZERO).unwrap();
        seq.enqueue(AgentId(1), Tick::ZERO).unwrap();
        let timeless = |a: AgentId| a == AgentId(0);
        assert_eq!(seq.waiting_count(None, timeless), 1);
    }
}

#[cfg(test)]
mod interactant {
    use crate::ids::AgentId;
    use crate::interactant::{InteractantRegistry, LockOutcome, UnlockOutcome};

    #[test]
    fn uncontended_lock_is_immediate() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create("room");
        assert!(matches!(reg.lock(id, AgentId(0)), LockOutcome::Immediate));
        assert_eq!(reg.holders(id), &[AgentId(0)]);
    }

    #[test]
    fn second_locker_suspends_and_unlock_promotes_it() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create("room");
        reg.lock(id, AgentId(0));
        assert!(matches!(reg.lock(id, AgentId(1)), LockOutcome::Suspended));
        assert_eq!(reg.wait_len(id), 1);

        let outcome = reg.unlock(id, AgentId(0)).unwrap();
        assert!(matches!(outcome, UnlockOutcome::Promoted(AgentId(1))));
        assert_eq!(reg.holders(id), &[AgentId(1)]);
        assert_eq!(reg.wait_len(id), 0);
    }

    #[test]
    fn unlock_with_empty_wait_queue_frees_the_interactant() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create("room");
        reg.lock(id, AgentId(0));
        assert!(matches!(reg.unlock(id, AgentId(0)).unwrap(), UnlockOutcome::Empty));
        assert!(reg.holders(id).is_empty());
    }

    #[test]
    fn unlock_by_a_non_holder_is_a_contract_violation() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create("room");
        assert!(reg.unlock(id, AgentId(0)).is_err());
    }

    #[test]
    fn wait_queue_is_strictly_fifo() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create("room");
        reg.lock(id, AgentId(0));
        reg.lock(id, AgentId(1));
        reg.lock(id, AgentId(2));
        let UnlockOutcome::Promoted(first) = reg.unlock(id, AgentId(0)).unwrap() else {
            panic!("expected a promotion");
        };
        assert_eq!(first, AgentId(1));
        let UnlockOutcome::Promoted(second) = reg.unlock(id, first).unwrap() else {
            panic!("expected a promotion");
        };
        assert_eq!(second, AgentId(2));
    }

    #[test]
    fn multi_interactant_admits_up_to_capacity() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create_multi("ward", 2);
        assert!(matches!(reg.lock(id, AgentId(0)), LockOutcome::Immediate));
        assert!(matches!(reg.lock(id, AgentId(1)), LockOutcome::Immediate));
        assert!(matches!(reg.lock(id, AgentId(2)), LockOutcome::Suspended));
        assert_eq!(reg.n_free(id), 0);
    }

    #[test]
    fn suspend_then_awaken_round_trips() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create("room");
        assert!(reg.suspend(id, AgentId(7)).is_ok());
        assert!(reg.is_locked(id, AgentId(7)));
        assert!(reg.awaken(id, AgentId(7)).is_ok());
        assert!(!reg.is_locked(id, AgentId(7)));
    }

    #[test]
    fn has_any_non_timeless_waiters_respects_the_predicate() {
        let mut reg = InteractantRegistry::new();
        let id = reg.create("room");
        reg.lock(id, AgentId(0));
        reg.lock(id, AgentId(1)); // suspended
        assert!(!reg.has_any_non_timeless_waiters(|_| true));
        assert!(reg.has_any_non_timeless_waiters(|_| false));
    }
}

#[cfg(test)]
mod scenarios {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use sk_core::Tick;

    use crate::agent::{AgentBody, AgentContext};
    use crate::ids::InteractantId;
    use crate::main_loop::MainLoop;

    /// Loops `lock(iid) / sleep(1) / unlock(iid)` for `days` iterations,
    /// recording the interactant's wait-queue length observed right after
    /// each successful lock.
    struct LockLoopAgent {
        iid: InteractantId,
        days: u64,
        current_holders: Arc<AtomicUsize>,
        max_holders: Arc<AtomicUsize>,
        wait_samples: Arc<Mutex<Vec<usize>>>,
    }

    impl AgentBody for LockLoopAgent {
        fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
            for _ in 0..self.days {
                ctx.lock(self.iid).unwrap();
                let holders_now = self.current_holders.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_holders.fetch_max(holders_now, Ordering::SeqCst);
                self.wait_samples.lock().unwrap().push(ctx.interactant_wait_len(self.iid));

                ctx.sleep(1).unwrap();

                self.current_holders.fetch_sub(1, Ordering::SeqCst);
                ctx.unlock(self.iid).unwrap();
            }
        }
    }

    /// Registers a per-day callback that stops the loop once `target_days`
    /// day transitions have fired. The clock agent never terminates on its
    /// own (it loops forever by design), so something external must call
    /// `stopRunning`.
    fn stop_after_n_days(main_loop: &mut MainLoop, target_days: usize) -> Arc<Mutex<Vec<Tick>>> {
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let recorded = transitions.clone();
        let stop_flag = main_loop.stop_flag();
        main_loop.add_per_day_callback(move |new_time| {
            recorded.lock().unwrap().push(new_time);
            if recorded.lock().unwrap().len() >= target_days {
                stop_flag.store(true, Ordering::SeqCst);
            }
        });
        transitions
    }

    /// Scenario 1: one interactant, three agents each looping
    /// `lock/sleep(1)/unlock` for 5 days. At most one holder at any instant;
    /// wait-queue length of 2 should be observed during contention.
    #[test]
    fn single_interactant_lock_contention() {
        let mut main_loop = MainLoop::builder("scenario-1").build();
        let iid = main_loop.create_interactant("room");

        let current_holders = Arc::new(AtomicUsize::new(0));
        let max_holders = Arc::new(AtomicUsize::new(0));
        let wait_samples = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let body = Box::new(LockLoopAgent {
                iid,
                days: 5,
                current_holders: current_holders.clone(),
                max_holders: max_holders.clone(),
                wait_samples: wait_samples.clone(),
            });
            main_loop.add_agent(format!("looper-{n}"), false, body);
        }

        let transitions = stop_after_n_days(&mut main_loop, 5);
        main_loop.run();

        assert_eq!(max_holders.load(Ordering::SeqCst), 1);
        assert_eq!(current_holders.load(Ordering::SeqCst), 0);
        assert_eq!(transitions.lock().unwrap().len(), 5);

        let samples = wait_samples.lock().unwrap();
        assert!(samples.iter().all(|&n| n <= 2));
        assert!(samples.contains(&2), "expected to observe full contention (2 waiters) at least once: {samples:?}");
    }

    /// Scenario 2: a `MultiInteractant` of capacity 2 with five contending
    /// agents. Holder count never exceeds capacity; the wait queue is
    /// non-empty whenever 3+ agents are active at once.
    #[test]
    fn multi_interactant_respects_capacity() {
        let mut main_loop = MainLoop::builder("scenario-2").build();
        let iid = main_loop.create_multi_interactant("ward", 2);

        let current_holders = Arc::new(AtomicUsize::new(0));
        let max_holders = Arc::new(AtomicUsize::new(0));
        let wait_samples = Arc::new(Mutex::new(Vec::new()));

        for n in 0..5 {
            let body = Box::new(LockLoopAgent {
                iid,
                days: 3,
                current_holders: current_holders.clone(),
                max_holders: max_holders.clone(),
                wait_samples: wait_samples.clone(),
            });
            main_loop.add_agent(format!("looper-{n}"), false, body);
        }

        let _transitions = stop_after_n_days(&mut main_loop, 3);
        main_loop.run();

        assert!(max_holders.load(Ordering::SeqCst) <= 2);
        assert_eq!(current_holders.load(Ordering::SeqCst), 0);

        let samples = wait_samples.lock().unwrap();
        assert!(samples.iter().any(|&n| n >= 1), "expected at least one contended sample: {samples:?}");
    }

    /// A lone agent sleeping repeatedly should see strictly increasing wake
    /// times and the main loop's `timeNow` should track it.
    #[test]
    fn sleep_advances_time_now_monotonically() {
        struct Sleeper {
            observed: Arc<Mutex<Vec<Tick>>>,
        }
        impl AgentBody for Sleeper {
            fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
                for _ in 0..3 {
                    let t = ctx.sleep(1).unwrap();
                    self.observed.lock().unwrap().push(t);
                }
            }
        }

        let mut main_loop = MainLoop::builder("scenario-sleep").build();
        let observed = Arc::new(Mutex::new(Vec::new()));
        main_loop.add_agent("sleeper", false, Box::new(Sleeper { observed: observed.clone() }));
        let _transitions = stop_after_n_days(&mut main_loop, 3);
        main_loop.run();

        let seen = observed.lock().unwrap();
        assert_eq!(seen.len(), 3);
        for pair in seen.windows(2) {
            assert!(pair[1] > pair[0], "time_now must be strictly increasing across sleeps: {seen:?}");
        }
    }

    /// `kill` torn down from another agent: the victim never reaches the
    /// code after its suspended lock call.
    #[test]
    fn kill_prevents_the_victim_from_resuming() {
        struct Victim {
            iid: InteractantId,
            reached_after_lock: Arc<AtomicBool>,
        }
        impl AgentBody for Victim {
            fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
                ctx.lock(self.iid).unwrap(); // this will suspend; killer never lets it resume
                self.reached_after_lock.store(true, Ordering::SeqCst);
            }
        }
        struct Killer {
            iid: InteractantId,
            victim_id: Arc<Mutex<Option<crate::ids::AgentId>>>,
        }
        impl AgentBody for Killer {
            fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
                ctx.lock(self.iid).unwrap(); // holds the interactant so the victim suspends
                ctx.sleep(1).unwrap();
                let victim = self.victim_id.lock().unwrap().expect("victim registered");
                ctx.kill(victim).unwrap();
                ctx.unlock(self.iid).unwrap();
            }
        }

        let mut main_loop = MainLoop::builder("scenario-kill").build();
        let iid = main_loop.create_interactant("gate");
        let victim_id = Arc::new(Mutex::new(None));
        let reached_after_lock = Arc::new(AtomicBool::new(false));

        // The killer is registered (and so dequeued) before the victim, so it
        // grabs `iid` first and the victim's own lock call is the one that
        // suspends.
        main_loop.add_agent("killer", false, Box::new(Killer { iid, victim_id: victim_id.clone() }));
        let vid = main_loop.add_agent(
            "victim",
            false,
            Box::new(Victim { iid, reached_after_lock: reached_after_lock.clone() }),
        );
        *victim_id.lock().unwrap() = Some(vid);

        let _transitions = stop_after_n_days(&mut main_loop, 2);
        main_loop.run();

        assert!(!reached_after_lock.load(Ordering::SeqCst));
    }

    /// `kill` on a victim asleep several days out (scheduled wake tick well
    /// past `timeNow`): the sequencer entry sits under that future tick, not
    /// under "now", so `unenqueue` must look up the victim's real wake time
    /// rather than assume it.
    #[test]
    fn kill_reaches_a_victim_sleeping_multiple_days_out() {
        struct SleepyVictim {
            woke_up: Arc<AtomicBool>,
        }
        impl AgentBody for SleepyVictim {
            fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
                ctx.sleep(5).unwrap(); // killed long before this returns
                self.woke_up.store(true, Ordering::SeqCst);
            }
        }
        struct Killer {
            victim_id: Arc<Mutex<Option<crate::ids::AgentId>>>,
        }
        impl AgentBody for Killer {
            fn run(&mut self, ctx: &mut AgentContext, _start_time: Tick) {
                ctx.sleep(1).unwrap(); // let the victim register its 5-day sleep first
                let victim = self.victim_id.lock().unwrap().expect("victim registered");
                ctx.kill(victim).unwrap();
            }
        }

        let mut main_loop = MainLoop::builder("scenario-kill-sleeping").build();
        let victim_id = Arc::new(Mutex::new(None));
        let woke_up = Arc::new(AtomicBool::new(false));

        let vid = main_loop.add_agent("victim", false, Box::new(SleepyVictim { woke_up: woke_up.clone() }));
        *victim_id.lock().unwrap() = Some(vid);
        main_loop.add_agent("killer", false, Box::new(Killer { victim_id: victim_id.clone() }));

        let _transitions = stop_after_n_days(&mut main_loop, 10);
        main_loop.run();

        assert!(!woke_up.load(Ordering::SeqCst));
    }
}
