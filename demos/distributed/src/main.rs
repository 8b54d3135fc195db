//! distributed — scenarios 4, 5 & 6 from `spec.md` §8: two ranks, one patch
//! each, joined by a cross-rank gate pair. Each rank sends 100 `SimpleMsg`
//! agents to the other plus one `FutureMsg`, then both drive their patch
//! group to completion via the same `recv/run/send/finish/done-signal`
//! cycle `demos/patches` uses — the only difference here is that the
//! network interface is [`sk_net::ChannelNetworkInterface`] over a real
//! (if in-process) [`sk_net::ChannelTransport`] rather than the dummy.
//!
//! `ChannelTransport::cluster` emulates ranks as OS threads within one
//! process (`sk-net`'s doc comment on the type): each thread below plays
//! the part of one rank end to end, including its own `PatchGroup::run`.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use sk_core::{GblAddr, LclId};
use sk_net::{ChannelNetworkInterface, ChannelTransport, Transport};
use sk_patch::{MsgKindRegistry, Patch, PatchGroup, WireMsgState, KIND_FUTURE, KIND_SIMPLE};

const RANKS: u32 = 2;
const MESSAGES_PER_DIRECTION: usize = 100;
const FUTURE_MSG_DELAY_TICKS: u64 = 3;

struct RankResult {
    rank: u32,
    mailbox_arrivals: usize,
    future_arrived_at: Option<u64>,
}

fn run_rank(transport: ChannelTransport) -> Result<RankResult> {
    let rank = transport.rank();
    let peer = 1 - rank;
    let my_addr = GblAddr::new(rank, 0u32);
    let peer_addr = GblAddr::new(peer, 0u32);

    let registry = Arc::new(MsgKindRegistry::new());
    let net = Box::new(ChannelNetworkInterface::new(transport, true));
    let mut group = PatchGroup::new(net);

    let mut patch = Patch::new(my_addr, registry.clone());
    patch.add_gate_to(peer_addr);
    patch.add_gate_from(peer_addr);
    let (mailbox_iid, _) = patch.create_multi_interactant("mailbox", MESSAGES_PER_DIRECTION);
    let (future_iid, _) = patch.create_multi_interactant("future-mailbox", 1);

    group.add_patch(patch);
    group.finalize()?;

    // Both ranks register their two termini in the same order, so the
    // peer's addresses are computable without an explicit exchange:
    // mailbox is the patch's first child slot, future-mailbox its second.
    let peer_mailbox_addr = GblAddr::new(peer, LclId::Child(0, 0));
    let peer_future_addr = GblAddr::new(peer, LclId::Child(0, 1));

    let send_time = group.patches()[0].main_loop_ref().time_now().0;
    let arrival_time = send_time + FUTURE_MSG_DELAY_TICKS;

    // Only rank 0 sends the FutureMsg, so there's exactly one to track.
    if rank == 0 {
        let state = WireMsgState {
            kind: KIND_FUTURE,
            src: my_addr,
            dest: peer_future_addr,
            payload: vec![],
            arrival_time: Some(arrival_time),
        };
        let cargo = bincode::serialize(&state).context("encoding the FutureMsg")?;
        let routing = group.patches()[0].routing()?;
        let pending_sends = group.patches()[0].pending_sends();
        let body = registry.construct(&cargo, routing, pending_sends).expect("KIND_FUTURE is always constructible");
        group.patches_mut()[0].add_agent("future-traveler", false, Box::new(body));
    }

    for i in 0..MESSAGES_PER_DIRECTION {
        let state = WireMsgState {
            kind: KIND_SIMPLE,
            src: my_addr,
            dest: peer_mailbox_addr,
            payload: vec![],
            arrival_time: None,
        };
        let cargo = bincode::serialize(&state).context("encoding a SimpleMsg")?;
        let routing = group.patches()[0].routing()?;
        let pending_sends = group.patches()[0].pending_sends();
        let body = registry.construct(&cargo, routing, pending_sends).expect("KIND_SIMPLE is always constructible");
        group.patches_mut()[0].add_agent(format!("traveler-{i}"), false, Box::new(body));
    }

    group.run()?;

    let mailbox_arrivals = group.patches()[0].main_loop_ref().interactant_holders(mailbox_iid).len();
    let future_arrived_at = if !group.patches()[0].main_loop_ref().interactant_holders(future_iid).is_empty() {
        Some(group.patches()[0].main_loop_ref().time_now().0)
    } else {
        None
    };

    Ok(RankResult { rank, mailbox_arrivals, future_arrived_at })
}

fn main() -> Result<()> {
    env_logger::init();

    let transports = ChannelTransport::cluster(RANKS);
    let results: Vec<Result<RankResult>> = thread::scope(|scope| {
        let handles: Vec<_> = transports.into_iter().map(|t| scope.spawn(move || run_rank(t))).collect();
        handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect()
    });

    for result in results {
        let r = result?;
        log::info!(
            "rank {}: received {}/{MESSAGES_PER_DIRECTION} SimpleMsg agents, FutureMsg delivered at tick {:?} (delay was {FUTURE_MSG_DELAY_TICKS})",
            r.rank,
            r.mailbox_arrivals,
            r.future_arrived_at,
        );
        anyhow::ensure!(r.mailbox_arrivals == MESSAGES_PER_DIRECTION, "rank {} lost or duplicated a SimpleMsg delivery", r.rank);
        if r.rank == 1 {
            let arrived_at = r.future_arrived_at.context("FutureMsg never arrived at rank 1")?;
            anyhow::ensure!(arrived_at >= FUTURE_MSG_DELAY_TICKS, "FutureMsg delivered before its arrivalTime");
        }
    }

    log::info!("all {} messages delivered exactly once across both ranks; done-signal reached on both sides", MESSAGES_PER_DIRECTION * 2);
    Ok(())
}
