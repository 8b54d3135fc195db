//! The [`Transport`] abstraction: the one seam between `sk-net`'s protocol
//! logic and whatever moves bytes between ranks.
//!
//! The source binds this layer to `mpi4py`. No MPI crate lives in this
//! workspace's dependency pack, so the only non-degenerate implementor here
//! is [`ChannelTransport`], an in-process stand-in built on
//! `std::sync::mpsc` and `std::sync::Barrier` that emulates a fixed set of
//! "ranks" as threads within one process. It is not a wire-compatible MPI
//! binding — swapping in a real one later only means writing a second
//! `Transport` impl, not touching `sk-net`'s protocol code.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

use crate::error::{NetError, NetResult};

/// A posted, not-yet-completed send.
pub trait SendTicket: Send {
    fn wait(self: Box<Self>) -> NetResult<()>;
    fn is_complete(&self) -> bool;
}

/// A posted, not-yet-completed receive.
pub trait RecvTicket: Send {
    fn wait(self: Box<Self>) -> NetResult<(u32, Vec<u8>)>;
    fn try_wait(&mut self) -> NetResult<Option<(u32, Vec<u8>)>>;
}

/// Point-to-point plus collective primitives a `sk-net` network interface
/// needs. Mirrors the subset of the `mpi4py` `Comm` surface the source
/// actually touches: `Get_rank`/`Get_size`, `Isend`/`Irecv`/`Waitany`/`Wait`,
/// `Barrier`, `bcast`, `allgather`.
pub trait Transport: Send + Sync {
    fn rank(&self) -> u32;
    fn size(&self) -> u32;

    fn barrier(&self);

    fn isend(&self, dst: u32, tag: u8, payload: Vec<u8>) -> Box<dyn SendTicket>;
    fn irecv(&self, src: u32) -> Box<dyn RecvTicket>;

    /// Block until any of `tickets` completes, returning its index and
    /// payload. The source's `Waitany` equivalent.
    fn wait_any(&self, tickets: Vec<Box<dyn RecvTicket>>) -> NetResult<(usize, u32, Vec<u8>)>;

    /// Broadcast `payload` (meaningful only at `root`) to every rank.
    fn bcast(&self, payload: Option<Vec<u8>>, root: u32) -> NetResult<Vec<u8>>;

    /// Every rank contributes `payload`; all ranks get the full, rank-ordered
    /// vector back.
    fn allgather(&self, payload: Vec<u8>) -> NetResult<Vec<Vec<u8>>>;
}

/// A transport that panics if any point-to-point or collective primitive is
/// actually invoked. For a single-rank run, `sk-net`'s protocol code never
/// calls into the transport at all — mirrors `netinterface_dummy.py`, which
/// carries no MPI handle whatsoever.
pub struct DummyTransport;

impl Transport for DummyTransport {
    fn rank(&self) -> u32 { 0 }
    fn size(&self) -> u32 { 1 }
    fn barrier(&self) {}

    fn isend(&self, _dst: u32, _tag: u8, _payload: Vec<u8>) -> Box<dyn SendTicket> {
        unreachable!("DummyTransport never sends: single-rank runs never call the wire layer")
    }
    fn irecv(&self, _src: u32) -> Box<dyn RecvTicket> {
        unreachable!("DummyTransport never receives: single-rank runs never call the wire layer")
    }
    fn wait_any(&self, _tickets: Vec<Box<dyn RecvTicket>>) -> NetResult<(usize, u32, Vec<u8>)> {
        unreachable!("DummyTransport never receives")
    }
    fn bcast(&self, payload: Option<Vec<u8>>, _root: u32) -> NetResult<Vec<u8>> {
        Ok(payload.unwrap_or_default())
    }
    fn allgather(&self, payload: Vec<u8>) -> NetResult<Vec<Vec<u8>>> {
        Ok(vec![payload])
    }
}

struct Envelope {
    tag: u8,
    payload: Vec<u8>,
}

struct ClusterShared {
    phase_barrier: Barrier,
    collective_slot: Mutex<Vec<Option<Vec<u8>>>>,
    collective_barrier: Barrier,
}

/// An in-process emulation of a fixed-size cluster: each "rank" is a real OS
/// thread holding one [`ChannelTransport`] handle, point-to-point messages
/// travel over a per-(src,dst) `mpsc` channel, and collectives rendezvous
/// through a shared slot guarded by a pair of barriers.
pub struct ChannelTransport {
    rank: u32,
    size: u32,
    senders: Vec<Sender<Envelope>>,
    receivers: Arc<Mutex<Vec<Receiver<Envelope>>>>,
    shared: Arc<ClusterShared>,
}

impl ChannelTransport {
    /// Build `size` linked transports, one per emulated rank. `receivers[i]`
    /// holds rank `i`'s inbox from every other rank, indexed by sender rank.
    pub fn cluster(size: u32) -> Vec<ChannelTransport> {
        assert!(size > 0, "a cluster needs at least one rank");
        let size_usize = size as usize;

        // channels[src][dst] is src's outbound channel to dst.
        let mut senders: Vec<Vec<Sender<Envelope>>> = Vec::with_capacity(size_usize);
        let mut receivers: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..size_usize).map(|_| (0..size_usize).map(|_| None).collect()).collect();

        for src in 0..size_usize {
            let mut row = Vec::with_capacity(size_usize);
            for dst in 0..size_usize {
                let (tx, rx) = std::sync::mpsc::channel();
                row.push(tx);
                receivers[dst][src] = Some(rx);
            }
            senders.push(row);
        }

        let shared = Arc::new(ClusterShared {
            phase_barrier: Barrier::new(size_usize),
            collective_slot: Mutex::new(vec![None; size_usize]),
            collective_barrier: Barrier::new(size_usize),
        });

        (0..size_usize)
            .map(|rank| {
                let my_senders: Vec<Sender<Envelope>> = senders.iter().map(|row| row[rank].clone()).collect();
                let my_receivers: Vec<Receiver<Envelope>> =
                    receivers[rank].iter_mut().map(|slot| slot.take().expect("filled above")).collect();
                ChannelTransport {
                    rank: rank as u32,
                    size,
                    senders: my_senders,
                    receivers: Arc::new(Mutex::new(my_receivers)),
                    shared: shared.clone(),
                }
            })
            .collect()
    }
}

struct ChannelSendTicket;

impl SendTicket for ChannelSendTicket {
    fn wait(self: Box<Self>) -> NetResult<()> { Ok(()) }
    fn is_complete(&self) -> bool { true }
}

/// Polls the shared inbox for mail from one specific source rank.
///
/// `std::sync::mpsc` has no peek, so completion is checked with
/// `try_recv` and a short backoff rather than a true async wait — adequate
/// for an in-process stand-in, not a model for a production transport.
struct ChannelRecvTicket {
    src: u32,
    receivers: Arc<Mutex<Vec<Receiver<Envelope>>>>,
}

impl RecvTicket for ChannelRecvTicket {
    fn wait(self: Box<Self>) -> NetResult<(u32, Vec<u8>)> {
        loop {
            if let Some(msg) = self.try_wait()? {
                return Ok(msg);
            }
            std::thread::yield_now();
        }
    }

    fn try_wait(&mut self) -> NetResult<Option<(u32, Vec<u8>)>> {
        let receivers = self.receivers.lock().map_err(|_| NetError::Transport("inbox lock poisoned".into()))?;
        match receivers[self.src as usize].try_recv() {
            Ok(env) => Ok(Some((env.tag as u32, env.payload))),
            Err(std::sync::mpsc::TryRecvError::Empty) => Ok(None),
            Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                Err(NetError::Transport(format!("inbox from rank {} disconnected", self.src)))
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> u32 { self.rank }
    fn size(&self) -> u32 { self.size }

    fn barrier(&self) {
        self.shared.phase_barrier.wait();
    }

    fn isend(&self, dst: u32, tag: u8, payload: Vec<u8>) -> Box<dyn SendTicket> {
        let _ = self.senders[dst as usize].send(Envelope { tag, payload });
        Box::new(ChannelSendTicket)
    }

    fn irecv(&self, src: u32) -> Box<dyn RecvTicket> {
        Box::new(ChannelRecvTicket { src, receivers: self.receivers.clone() })
    }

    fn wait_any(&self, mut tickets: Vec<Box<dyn RecvTicket>>) -> NetResult<(usize, u32, Vec<u8>)> {
        loop {
            for (i, ticket) in tickets.iter_mut().enumerate() {
                if let Some((tag, payload)) = ticket.try_wait()? {
                    return Ok((i, tag, payload));
                }
            }
            std::thread::yield_now();
        }
    }

    fn bcast(&self, payload: Option<Vec<u8>>, root: u32) -> NetResult<Vec<u8>> {
        if self.rank == root {
            let mut slot = self.shared.collective_slot.lock().unwrap();
            for entry in slot.iter_mut() {
                *entry = payload.clone();
            }
        }
        self.shared.collective_barrier.wait();
        let result = self.shared.collective_slot.lock().unwrap()[self.rank as usize].clone().unwrap_or_default();
        self.shared.collective_barrier.wait();
        Ok(result)
    }

    fn allgather(&self, payload: Vec<u8>) -> NetResult<Vec<Vec<u8>>> {
        {
            let mut slot = self.shared.collective_slot.lock().unwrap();
            slot[self.rank as usize] = Some(payload);
        }
        self.shared.collective_barrier.wait();
        let gathered: Vec<Vec<u8>> =
            self.shared.collective_slot.lock().unwrap().iter().map(|entry| entry.clone().unwrap_or_default()).collect();
        self.shared.collective_barrier.wait();
        Ok(gathered)
    }
}
