//! The distinguished, always-`timeless` agent that advances simulated days.

use std::sync::{Arc, Mutex};

use log::error;
use sk_core::Tick;

use crate::agent::{AgentBody, AgentContext};
use crate::state::ClockControls;

/// The per-tick break hook: whatever the clock agent does instead of idling.
///
/// The default ([`default_break_hook`]) is a plain `sleep(0)` — yield the
/// thread once per iteration. A patch-group driver overrides this (via
/// [`crate::MainLoopBuilder::break_hook`]) to run the cross-rank
/// communication cycle in its place, exactly as the original lets software
/// above the kernel layer substitute different loop-breaking behavior.
pub type BreakHook = Box<dyn FnMut(&mut AgentContext) -> Tick + Send>;

pub(crate) fn default_break_hook() -> BreakHook {
    Box::new(|ctx: &mut AgentContext| {
        ctx.sleep(0).unwrap_or_else(|e| {
            error!("clock agent sleep(0) failed: {e}");
            ctx.kill_self()
        })
    })
}

pub(crate) struct ClockAgent {
    controls: Arc<Mutex<ClockControls>>,
    break_hook: BreakHook,
}

impl ClockAgent {
    pub(crate) fn new(controls: Arc<Mutex<ClockControls>>, break_hook: BreakHook) -> Self {
        Self { controls, break_hook }
    }
}

impl AgentBody for ClockAgent {
    fn run(&mut self, ctx: &mut AgentContext, start_time: Tick) {
        let mut time_now = start_time;
        loop {
            let frozen = self.controls.lock().unwrap().date_frozen;
            if !frozen && ctx.done_with_today() {
                ctx.bump_time();
            }
            let new_time_now = (self.break_hook)(ctx);

            {
                let mut controls = self.controls.lock().unwrap();
                for cb in controls.per_tick.iter_mut() {
                    cb(time_now, new_time_now);
                }
            }
            if new_time_now != time_now {
                let mut controls = self.controls.lock().unwrap();
                for cb in controls.per_day.iter_mut() {
                    cb(new_time_now);
                }
                time_now = new_time_now;
            }
        }
    }
}
