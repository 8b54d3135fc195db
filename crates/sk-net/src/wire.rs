//! The wire format: chunked batches of entries, each prefixed with a vector
//! clock and the final chunk carrying the done-signal trailer.

use sk_core::GblAddr;

/// Entries per chunk. Matches the source's `maxChunksPerMsg`; the name is
/// inherited from there even though it bounds entries-per-chunk, not chunks.
pub const MAX_CHUNKS_PER_MSG: usize = 24;

/// Per-request receive buffer size. A real transport may grow this if it
/// supports resizing; it's a starting allocation, not a hard cap here.
pub const RECV_BUFFER_BYTES: usize = 1024 * 1024;

pub const TAG_MORE: u8 = 1;
pub const TAG_END: u8 = 2;

/// One routed piece of cargo: `(msgType, srcGblAddr, dstGblAddr, cargo)`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct WireEntry {
    pub msg_type: u32,
    pub src: GblAddr,
    pub dst: GblAddr,
    pub cargo: Vec<u8>,
}

/// The `(done, cycle)` pair piggybacked on the last chunk of a batch.
/// `done = false` unless `sendDoneSignal` has actually been called.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DoneMarker {
    pub done: bool,
    pub cycle: u32,
}

/// One chunk of an outbound batch: a vector-clock snapshot, up to
/// `MAX_CHUNKS_PER_MSG` entries, and — only on the last chunk of a batch — a
/// [`DoneMarker`] trailer.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    pub vclock: Vec<u32>,
    pub entries: Vec<WireEntry>,
    pub trailer: Option<DoneMarker>,
}

impl Chunk {
    /// `TAG_END` iff this chunk carries the trailer, else `TAG_MORE`.
    pub fn tag(&self) -> u8 {
        if self.trailer.is_some() { TAG_END } else { TAG_MORE }
    }
}

/// Partition `entries` bound for one destination rank into chunks of at most
/// [`MAX_CHUNKS_PER_MSG`], each stamped with `vclock`. The final chunk always
/// carries `done` (defaulting to `DoneMarker::default()`, i.e. not-done, when
/// no done signal has been sent yet) — mirroring the source always
/// appending `self.doneMsg` to the last chunk of every batch, sent or not.
///
/// An empty `entries` list still produces one (empty) chunk, so a rank with
/// nothing to say this cycle can still deliver its done marker.
pub fn chunk_outbox(vclock: Vec<u32>, mut entries: Vec<WireEntry>, done: DoneMarker) -> Vec<Chunk> {
    if entries.is_empty() {
        return vec![Chunk { vclock, entries: Vec::new(), trailer: Some(done) }];
    }

    let mut chunks = Vec::new();
    while !entries.is_empty() {
        let take = entries.len().min(MAX_CHUNKS_PER_MSG);
        let rest = entries.split_off(take);
        let this_chunk = std::mem::replace(&mut entries, rest);
        let is_last = entries.is_empty();
        chunks.push(Chunk {
            vclock: vclock.clone(),
            entries: this_chunk,
            trailer: if is_last { Some(done) } else { None },
        });
    }
    chunks
}

/// Sort order used in deterministic mode, both for the per-destination
/// message list before chunking and for the ascending-rank iteration order
/// elsewhere in `sk-net`.
pub fn deterministic_key(entry: &WireEntry) -> (GblAddr, GblAddr, u32) {
    (entry.src, entry.dst, entry.msg_type)
}
