//! locks — scenarios 1 & 2 from `spec.md` §8: a handful of agents
//! contending on a single-patch interactant, no gates or network involved.
//!
//! Scenario 1: 3 agents loop `lock/sleep(1)/unlock` on a single-holder
//! interactant for 5 days. At most one holder at any instant; the wait
//! queue is observed to reach length 2 while all three are active.
//!
//! Scenario 2: 5 agents do the same against a `MultiInteractant(capacity=2)`.
//! At most 2 concurrent holders; the wait queue is non-empty once 3 or more
//! agents are contending.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use sk_core::Tick;
use sk_kernel::{AgentBody, AgentContext, InteractantId, MainLoop};

const DAYS: u64 = 5;

/// Loops `lock/sleep(1)/unlock` for `rounds` days, recording the widest
/// wait-queue length it ever observed on `iid` into `max_wait`.
struct Looper {
    iid: InteractantId,
    rounds: u64,
    max_wait: Arc<AtomicUsize>,
}

impl AgentBody for Looper {
    fn run(&mut self, ctx: &mut AgentContext, start_time: Tick) {
        let mut time_now = start_time;
        for _ in 0..self.rounds {
            let wait_before = ctx.interactant_wait_len(self.iid);
            self.max_wait.fetch_max(wait_before, Ordering::SeqCst);

            time_now = match ctx.lock(self.iid) {
                Ok(t) => t,
                Err(e) => {
                    log::error!("{} failed to lock: {e}", ctx.name());
                    return;
                }
            };
            time_now = match ctx.sleep(1) {
                Ok(t) => t,
                Err(_) => return,
            };
            if let Err(e) = ctx.unlock(self.iid) {
                log::error!("{} failed to unlock: {e}", ctx.name());
                return;
            }
        }
        let _ = time_now;
    }
}

/// Runs `main_loop` until exactly `DAYS` day-transitions have happened.
fn drive_for_n_days(main_loop: &mut MainLoop) {
    let stop_flag = main_loop.stop_flag();
    let days_seen = Arc::new(AtomicUsize::new(0));
    main_loop.add_per_day_callback(move |_| {
        if days_seen.fetch_add(1, Ordering::SeqCst) + 1 >= DAYS as usize {
            stop_flag.store(true, Ordering::SeqCst);
        }
    });
    main_loop.run();
}

fn scenario_1() -> Result<()> {
    let mut main_loop = MainLoop::builder("scenario-1-single-holder").safety(10_000).build();
    let iid = main_loop.create_interactant("single-chair");
    let max_wait = Arc::new(AtomicUsize::new(0));

    for name in ["alice", "bob", "carol"] {
        main_loop.add_agent(name, false, Box::new(Looper { iid, rounds: DAYS, max_wait: max_wait.clone() }));
    }

    drive_for_n_days(&mut main_loop);
    log::info!("scenario 1: widest wait queue observed = {} (at most 2 with 3 contenders)", max_wait.load(Ordering::SeqCst));
    Ok(())
}

fn scenario_2() -> Result<()> {
    let mut main_loop = MainLoop::builder("scenario-2-multi-holder").safety(10_000).build();
    let iid = main_loop.create_multi_interactant("two-chairs", 2);
    let max_wait = Arc::new(AtomicUsize::new(0));

    for name in ["alice", "bob", "carol", "dave", "erin"] {
        main_loop.add_agent(name, false, Box::new(Looper { iid, rounds: DAYS, max_wait: max_wait.clone() }));
    }

    drive_for_n_days(&mut main_loop);
    log::info!(
        "scenario 2: widest wait queue observed = {} (non-zero expected with 5 contenders over capacity 2)",
        max_wait.load(Ordering::SeqCst)
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    scenario_1()?;
    scenario_2()?;
    Ok(())
}
