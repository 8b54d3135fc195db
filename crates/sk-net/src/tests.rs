use std::sync::{Arc, Mutex};

use sk_core::GblAddr;

use crate::interface::{ChannelNetworkInterface, DummyNetworkInterface, NetworkInterface};
use crate::transport::ChannelTransport;
use crate::wire::{chunk_outbox, DoneMarker, WireEntry, MAX_CHUNKS_PER_MSG, TAG_END, TAG_MORE};

mod wire_chunking {
    use super::*;

    fn entry(i: u32) -> WireEntry {
        WireEntry { msg_type: 0, src: GblAddr::new(0, i), dst: GblAddr::new(1, i), cargo: vec![i as u8] }
    }

    #[test]
    fn empty_outbox_still_ships_the_done_marker() {
        let chunks = chunk_outbox(vec![0, 0], Vec::new(), DoneMarker { done: true, cycle: 3 });
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].entries.is_empty());
        assert_eq!(chunks[0].trailer, Some(DoneMarker { done: true, cycle: 3 }));
        assert_eq!(chunks[0].tag(), TAG_END);
    }

    #[test]
    fn batches_larger_than_the_chunk_limit_split_with_trailer_only_on_the_last() {
        let entries: Vec<_> = (0..(MAX_CHUNKS_PER_MSG as u32 * 2 + 5)).map(entry).collect();
        let total = entries.len();
        let chunks = chunk_outbox(vec![1, 0], entries, DoneMarker::default());

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].entries.len(), MAX_CHUNKS_PER_MSG);
        assert_eq!(chunks[1].entries.len(), MAX_CHUNKS_PER_MSG);
        assert_eq!(chunks[2].entries.len(), total - 2 * MAX_CHUNKS_PER_MSG);

        assert!(chunks[0].trailer.is_none());
        assert!(chunks[1].trailer.is_none());
        assert!(chunks[2].trailer.is_some());

        assert_eq!(chunks[0].tag(), TAG_MORE);
        assert_eq!(chunks[1].tag(), TAG_MORE);
        assert_eq!(chunks[2].tag(), TAG_END);
    }

    #[test]
    fn exactly_one_chunk_worth_still_carries_the_trailer() {
        let entries: Vec<_> = (0..MAX_CHUNKS_PER_MSG as u32).map(entry).collect();
        let chunks = chunk_outbox(vec![0], entries, DoneMarker { done: true, cycle: 1 });
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].entries.len(), MAX_CHUNKS_PER_MSG);
        assert!(chunks[0].trailer.is_some());
    }
}

mod dummy_interface {
    use super::*;

    #[test]
    fn a_local_message_arrives_in_the_next_finish_recv() {
        let mut net = DummyNetworkInterface::new(false);
        let src = net.gbl_addr(0u32);
        let dst = net.gbl_addr(1u32);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        net.expect(src, dst, Box::new(move |msg_type, cargo| seen_cb.lock().unwrap().push((msg_type, cargo))))
            .unwrap();

        net.enqueue(7, src, dst, vec![1, 2, 3]).unwrap();
        net.start_send().unwrap();
        net.start_recv().unwrap();
        net.finish_recv().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(7, vec![1, 2, 3])]);
    }

    #[test]
    fn enqueueing_to_a_foreign_rank_is_an_error() {
        let mut net = DummyNetworkInterface::new(false);
        let src = net.gbl_addr(0u32);
        let foreign = GblAddr::new(1, 0u32);
        assert!(net.enqueue(0, src, foreign, Vec::new()).is_err());
    }

    #[test]
    fn an_undelivered_message_with_no_expect_is_reported_not_silently_dropped() {
        let mut net = DummyNetworkInterface::new(false);
        let src = net.gbl_addr(0u32);
        let dst = net.gbl_addr(9u32);
        net.enqueue(0, src, dst, Vec::new()).unwrap();
        net.start_send().unwrap();
        net.start_recv().unwrap();
        assert!(net.finish_recv().is_err());
    }

    #[test]
    fn send_done_signal_is_always_true_with_no_partners() {
        let mut net = DummyNetworkInterface::new(false);
        assert!(net.send_done_signal());
        assert!(net.send_done_signal());
    }
}

mod channel_interface {
    use super::*;

    /// Two ranks, each expecting one message from the other, exchanging
    /// exactly one round before calling done. Exercises `start_send` →
    /// `finish_recv`'s `wait_any` loop and the chunk trailer's done marker.
    #[test]
    fn two_ranks_exchange_messages_and_converge_on_done() {
        let mut transports = ChannelTransport::cluster(2).into_iter();
        let t0 = transports.next().unwrap();
        let t1 = transports.next().unwrap();

        let mut net0 = ChannelNetworkInterface::new(t0, false);
        let mut net1 = ChannelNetworkInterface::new(t1, false);

        let addr0 = net0.gbl_addr(0u32);
        let addr1 = net1.gbl_addr(0u32);

        let received0 = Arc::new(Mutex::new(Vec::new()));
        let received1 = Arc::new(Mutex::new(Vec::new()));
        {
            let r = received0.clone();
            net0.expect(addr1, addr0, Box::new(move |t, c| r.lock().unwrap().push((t, c)))).unwrap();
        }
        {
            let r = received1.clone();
            net1.expect(addr0, addr1, Box::new(move |t, c| r.lock().unwrap().push((t, c)))).unwrap();
        }

        net0.enqueue(42, addr0, addr1, vec![9, 9]).unwrap();
        net1.enqueue(43, addr1, addr0, vec![8, 8]).unwrap();

        let h0 = std::thread::spawn(move || {
            net0.start_recv().unwrap();
            net0.start_send().unwrap();
            net0.finish_send().unwrap();
            net0.finish_recv().unwrap();
            net0
        });
        let h1 = std::thread::spawn(move || {
            net1.start_recv().unwrap();
            net1.start_send().unwrap();
            net1.finish_send().unwrap();
            net1.finish_recv().unwrap();
            net1
        });
        let mut net0 = h0.join().unwrap();
        let mut net1 = h1.join().unwrap();

        assert_eq!(*received0.lock().unwrap(), vec![(43, vec![8, 8])]);
        assert_eq!(*received1.lock().unwrap(), vec![(42, vec![9, 9])]);

        // Neither side has signalled done yet.
        assert!(!net0.send_done_signal());
        assert!(!net1.send_done_signal());

        // A cycle with nothing to say still ships the done marker and both
        // sides should now see each other as converged.
        let h0 = std::thread::spawn(move || {
            net0.start_recv().unwrap();
            net0.start_send().unwrap();
            net0.finish_send().unwrap();
            net0.finish_recv().unwrap();
            net0.send_done_signal()
        });
        let h1 = std::thread::spawn(move || {
            net1.start_recv().unwrap();
            net1.start_send().unwrap();
            net1.finish_send().unwrap();
            net1.finish_recv().unwrap();
            net1.send_done_signal()
        });
        let done0 = h0.join().unwrap();
        let done1 = h1.join().unwrap();
        assert!(done0);
        assert!(done1);
    }

    #[test]
    fn send_done_signal_is_idempotent_after_the_first_call() {
        let mut transports = ChannelTransport::cluster(1).into_iter();
        let t0 = transports.next().unwrap();
        let mut net = ChannelNetworkInterface::new(t0, false);
        // No partners expected, so the formula's |expectFrom| term is 0 and
        // it converges immediately.
        assert!(net.send_done_signal());
        assert!(net.send_done_signal());
    }
}
