//! patches — scenario 3 from `spec.md` §8: two patches joined by a gate
//! pair, one agent migrating A→B→A→B repeatedly. Both patches run on one
//! rank, driven by `PatchGroup::switch` through the dummy (single-rank)
//! network interface — no wire traffic, but the gate-crossing mechanics are
//! identical to the cross-rank case in `demos/distributed`.
//!
//! Each leg is carried by a fresh agent-as-message (`sk_patch::MessageBody`)
//! addressed at the far patch's terminal interactant. Termini are created
//! with enough capacity to hold every leg's arrival simultaneously, since a
//! message never unlocks once arrived (`spec.md` §4.7) — this lets the
//! demo observe every past arrival, not just the most recent one.

use std::sync::Arc;

use anyhow::{Context, Result};
use sk_core::{GblAddr, LclId};
use sk_net::DummyNetworkInterface;
use sk_patch::{MsgKindRegistry, Patch, PatchGroup, WireMsgState, KIND_SIMPLE};

const TRIPS: usize = 10;
const MAX_ROUNDS_PER_LEG: usize = 20;

fn main() -> Result<()> {
    env_logger::init();

    let registry = Arc::new(MsgKindRegistry::new());
    let net = Box::new(DummyNetworkInterface::new(true));
    let mut group = PatchGroup::new(net);

    let addr_a = GblAddr::new(0, LclId::Plain(0));
    let addr_b = GblAddr::new(0, LclId::Plain(1));

    let mut patch_a = Patch::new(addr_a, registry.clone());
    patch_a.add_gate_to(addr_b);
    patch_a.add_gate_from(addr_b);
    let (term_a_iid, term_a_addr) = patch_a.create_multi_interactant("home", TRIPS + 1);

    let mut patch_b = Patch::new(addr_b, registry.clone());
    patch_b.add_gate_to(addr_a);
    patch_b.add_gate_from(addr_a);
    let (term_b_iid, term_b_addr) = patch_b.create_multi_interactant("away", TRIPS + 1);

    group.add_patch(patch_a);
    group.add_patch(patch_b);
    group.finalize()?;
    group.barrier();

    // index 0 = patch A / term_a, index 1 = patch B / term_b.
    let mut here = 0usize;
    let termini = [(term_a_iid, term_a_addr), (term_b_iid, term_b_addr)];
    let mut seen_holders = [0usize, 0usize];

    for leg in 1..=TRIPS {
        let there = 1 - here;
        let src_addr = if here == 0 { addr_a } else { addr_b };
        let (_, dest_addr) = termini[there];

        let state = WireMsgState { kind: KIND_SIMPLE, src: src_addr, dest: dest_addr, payload: vec![], arrival_time: None };
        let cargo = bincode::serialize(&state).context("encoding the leg's wire state")?;
        let routing = group.patches()[here].routing()?;
        let pending_sends = group.patches()[here].pending_sends();
        let body = registry.construct(&cargo, routing, pending_sends).expect("KIND_SIMPLE is always constructible");
        group.patches_mut()[here].add_agent(format!("leg-{leg}"), false, Box::new(body));

        let (there_iid, _) = termini[there];
        let mut arrived = false;
        for _ in 0..MAX_ROUNDS_PER_LEG {
            group.switch()?;
            let holders = group.patches()[there].main_loop_ref().interactant_holders(there_iid).len();
            if holders > seen_holders[there] {
                seen_holders[there] = holders;
                arrived = true;
                break;
            }
        }
        if !arrived {
            anyhow::bail!("leg {leg} never arrived at patch {there} within {MAX_ROUNDS_PER_LEG} rounds");
        }
        log::info!(
            "leg {leg}: agent migrated {} -> {} (tick {})",
            if here == 0 { addr_a } else { addr_b },
            if there == 0 { addr_a } else { addr_b },
            group.patches()[there].main_loop_ref().time_now(),
        );
        here = there;
    }

    group.barrier();
    log::info!("all {TRIPS} legs delivered; agent never appeared in two patches at once");
    Ok(())
}
