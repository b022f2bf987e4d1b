//! Length-prefixed frame codec.
//!
//! The read path ([`FrameReader`]) reassembles frames across buffer
//! boundaries; the write path ([`WriteQueue`]) batches encoded frames into
//! vectored submissions and accounts for partial writes.
//!
//! Two header dialects share the machinery:
//! - [`Dialect::Tagged`]: `[kind: u16 BE][length: u16 BE]`, 4 bytes.
//! - [`Dialect::SelfDescribing`]: `[length: u16 BE]`, 2 bytes; the kind is a
//!   tagged union at the start of the payload.

use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::warn;

use crate::buffer::{BufferRef, FrameSlice, ReadSlice};
use crate::config::{MAX_PAYLOAD, PREALLOCATED_BUFFERS};
use crate::error::{Error, Result};
use crate::message::{Kind, Message};
use crate::pool::BufferPools;

/// Frame header layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `[kind u16 BE][length u16 BE]` — the revision the runtime speaks.
    #[default]
    Tagged,
    /// `[length u16 BE]` with a self-describing payload.
    SelfDescribing,
}

impl Dialect {
    #[inline]
    #[must_use]
    pub const fn header_len(self) -> usize {
        match self {
            Self::Tagged => 4,
            Self::SelfDescribing => 2,
        }
    }

    fn write_header(self, out: &mut [u8], kind: Kind, payload_len: usize) {
        debug_assert!(payload_len <= MAX_PAYLOAD);
        let len = (payload_len as u16).to_be_bytes();
        match self {
            Self::Tagged => {
                out[..2].copy_from_slice(&kind.to_wire().to_be_bytes());
                out[2..4].copy_from_slice(&len);
            }
            Self::SelfDescribing => out[..2].copy_from_slice(&len),
        }
    }
}

/// Encode one frame into a freshly acquired pooled buffer.
///
/// Payloads beyond the 16-bit length field are rejected with a warning; the
/// connection stays healthy and the frame is simply not produced.
pub fn encode(
    pools: &BufferPools,
    dialect: Dialect,
    kind: Kind,
    payload: &[u8],
) -> Result<Message> {
    if payload.len() > MAX_PAYLOAD {
        warn!(size = payload.len(), "payload too large to encode");
        return Err(Error::FrameOverflow {
            size: payload.len(),
        });
    }

    let mut buffer = pools.acquire();
    let header = dialect.header_len();
    let data = buffer.get_mut().as_mut_slice();
    debug_assert!(data.len() >= header + payload.len());

    dialect.write_header(data, kind, payload.len());
    data[header..header + payload.len()].copy_from_slice(payload);

    Ok(Message::new(buffer, 0, dialect))
}

/// Read-path reassembly state for one transport.
///
/// Keeps the current read buffer and the `[start, end)` window of bytes
/// already received. Frames are emitted in place; a partial tail is carried
/// to a fresh buffer only when the current one is exhausted, and the buffer
/// is rotated after a fully consumed read so subsequent frames stay
/// contiguous.
pub struct FrameReader {
    dialect: Dialect,
    buffer: BufferRef,
    start: usize,
    end: usize,
}

impl FrameReader {
    pub fn new(dialect: Dialect, pools: &BufferPools) -> Self {
        Self {
            dialect,
            buffer: pools.acquire(),
            start: 0,
            end: 0,
        }
    }

    /// The window `[end, capacity)` for the next read submission.
    #[must_use]
    pub fn read_window(&self) -> ReadSlice {
        ReadSlice::new(self.buffer.clone(), self.end)
    }

    /// Account for `count` freshly read bytes and emit every complete frame
    /// through `sink`.
    ///
    /// `count` must be non-zero; a zero-length read means the peer closed
    /// and is the transport's call to make.
    pub fn on_read(
        &mut self,
        count: usize,
        pools: &BufferPools,
        sink: &mut dyn FnMut(Message),
    ) {
        debug_assert!(count > 0);

        let capacity = self.buffer.capacity();
        if count == capacity - self.end {
            // the kernel filled the whole window; likely more is waiting
            warn!(count, "partial read");
        }

        self.end += count;
        debug_assert!(self.end <= capacity);

        let header = self.dialect.header_len();
        loop {
            let available = self.end - self.start;
            if available < header {
                break;
            }

            let message = Message::new(self.buffer.clone(), self.start, self.dialect);
            let size = message.size_with_header();
            if size > available {
                // partial frame: wait for more bytes
                break;
            }

            sink(message);
            self.start += size;
        }

        if self.start == self.end {
            // fully consumed: rotate so the next read begins at offset 0
            self.buffer = pools.acquire();
            self.start = 0;
            self.end = 0;
        } else if self.end == capacity {
            // The buffer is large enough for any frame, so a frame hitting
            // the end can only start mid-buffer; carry the tail forward.
            debug_assert!(self.start != 0);
            let available = self.end - self.start;
            let mut fresh = pools.acquire();
            fresh.get_mut().as_mut_slice()[..available]
                .copy_from_slice(&self.buffer.as_slice()[self.start..self.end]);
            self.buffer = fresh;
            self.end = available;
            self.start = 0;
        }
    }
}

/// Ordered outbound frame queue with single-submission accounting.
///
/// Guarded by the transport's writer mutex. At most one vectored submission
/// is in flight; a submission carries up to [`PREALLOCATED_BUFFERS`] frames
/// back-to-back, and a completion that lands inside a frame leaves a
/// partial-write offset applied to the next submission.
pub struct WriteQueue {
    queue: VecDeque<Message>,
    partial: usize,
    submitted: SmallVec<[usize; PREALLOCATED_BUFFERS]>,
    idle: bool,
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::with_capacity(128),
            partial: 0,
            submitted: SmallVec::new(),
            idle: true,
        }
    }

    /// Append a frame. Returns `true` when the caller must wake the service
    /// thread to arm a submission (queue was drained and nothing in flight).
    pub fn push(&mut self, message: Message) -> bool {
        self.idle = false;
        self.queue.push_back(message);
        self.submitted.is_empty() && self.queue.len() == 1
    }

    /// Slice the queue front into a gather list and mark it in flight.
    ///
    /// Returns `None` while a submission is outstanding or when there is
    /// nothing to write.
    pub fn begin_submission(&mut self) -> Option<Vec<FrameSlice>> {
        if !self.submitted.is_empty() || self.queue.is_empty() {
            return None;
        }

        let mut slices = Vec::with_capacity(self.queue.len().min(PREALLOCATED_BUFFERS));
        let mut skip = self.partial;
        for message in self.queue.iter().take(PREALLOCATED_BUFFERS) {
            let size = message.size_with_header();
            debug_assert!(size > skip);
            self.submitted.push(size);
            slices.push(FrameSlice::new(message.clone(), skip));
            skip = 0;
        }

        Some(slices)
    }

    /// Consume `count` written bytes from the in-flight submission.
    pub fn complete_submission(&mut self, mut count: usize) {
        debug_assert!(!self.submitted.is_empty());

        let mut consumed = 0;
        for &size in &self.submitted {
            if count == 0 {
                break;
            }
            let remaining = size - self.partial;
            if count < remaining {
                warn!("partial write");
                self.partial += count;
                count = 0;
                break;
            }
            count -= remaining;
            self.partial = 0;
            consumed += 1;
        }

        self.queue.drain(..consumed);
        self.submitted.clear();
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn submission_in_flight(&self) -> bool {
        !self.submitted.is_empty()
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }

    /// Drop all queued frames (teardown path).
    pub fn clear(&mut self) {
        self.queue.clear();
        self.submitted.clear();
        self.partial = 0;
        self.idle = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(dialect: Dialect, kind: Kind, payload: &[u8]) -> Vec<u8> {
        let pools = BufferPools::new();
        encode(&pools, dialect, kind, payload).unwrap().span().to_vec()
    }

    fn feed_chunked(
        dialect: Dialect,
        stream: &[u8],
        chunk: usize,
        pools: &BufferPools,
    ) -> Vec<Vec<u8>> {
        let mut reader = FrameReader::new(dialect, pools);
        let mut out = Vec::new();
        for piece in stream.chunks(chunk) {
            let mut window = reader.read_window();
            assert_eq!(window.fill(piece), piece.len());
            drop(window);
            reader.on_read(piece.len(), pools, &mut |msg| {
                out.push(msg.payload_bytes().to_vec());
            });
        }
        out
    }

    #[test]
    fn framing_round_trips_under_arbitrary_chunking() {
        let payloads: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"a".to_vec(),
            vec![0xAB; 300],
            b"tail".to_vec(),
        ];

        for dialect in [Dialect::Tagged, Dialect::SelfDescribing] {
            let mut stream = Vec::new();
            for p in &payloads {
                stream.extend_from_slice(&frame_bytes(dialect, Kind::GamePacket, p));
            }

            for chunk in [1, 3, 7, stream.len()] {
                let pools = BufferPools::new();
                let decoded = feed_chunked(dialect, &stream, chunk, &pools);
                assert_eq!(decoded, payloads, "dialect {dialect:?} chunk {chunk}");
            }
        }
    }

    #[test]
    fn frames_from_one_read_share_a_buffer() {
        let pools = BufferPools::new();
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame_bytes(Dialect::Tagged, Kind::GamePacket, b"one"));
        stream.extend_from_slice(&frame_bytes(Dialect::Tagged, Kind::BallPrediction, b"two"));

        let mut reader = FrameReader::new(Dialect::Tagged, &pools);
        let mut window = reader.read_window();
        window.fill(&stream);
        drop(window);

        let mut messages = Vec::new();
        reader.on_read(stream.len(), &pools, &mut |msg| messages.push(msg));

        assert_eq!(messages.len(), 2);
        let (a, b) = (messages[0].buffer().unwrap(), messages[1].buffer().unwrap());
        assert!(a.shares_slot(b), "zero-copy fan-out shares the buffer");

        // The shared buffer returns to its pool only once both messages and
        // the reader's rotated-away handle are gone.
        let before: usize = pools.stats().iter().map(|&(_, free)| free).sum();
        drop(messages);
        let after: usize = pools.stats().iter().map(|&(_, free)| free).sum();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn tail_is_carried_across_buffer_boundary() {
        // Two maximum-size frames overflow one buffer, so the second frame
        // straddles the boundary and its tail must be carried forward.
        let pools = BufferPools::new();
        let capacity = crate::config::BUFFER_CAPACITY;

        let first = frame_bytes(Dialect::Tagged, Kind::GamePacket, &vec![0x5A; MAX_PAYLOAD]);
        let second_payload = vec![0x42; MAX_PAYLOAD];
        let second = frame_bytes(Dialect::Tagged, Kind::BallPrediction, &second_payload);
        assert!(first.len() + second.len() > capacity);

        let mut reader = FrameReader::new(Dialect::Tagged, &pools);
        let mut decoded = Vec::new();

        // First read exactly fills the buffer: the whole first frame plus
        // the head of the second.
        let head = capacity - first.len();
        let mut chunk1 = first.clone();
        chunk1.extend_from_slice(&second[..head]);
        let mut window = reader.read_window();
        assert_eq!(window.fill(&chunk1), chunk1.len());
        drop(window);
        reader.on_read(chunk1.len(), &pools, &mut |msg| {
            decoded.push(msg.payload_bytes().to_vec());
        });
        assert_eq!(decoded.len(), 1, "second frame still incomplete");

        // Second read delivers the rest, landing right after the carried
        // tail in the fresh buffer.
        let rest = &second[head..];
        let mut window = reader.read_window();
        assert_eq!(window.fill(rest), rest.len());
        drop(window);
        reader.on_read(rest.len(), &pools, &mut |msg| {
            decoded.push(msg.payload_bytes().to_vec());
        });

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1], second_payload);
    }

    #[test]
    fn oversize_payload_is_rejected_at_encode() {
        let pools = BufferPools::new();
        let err = encode(&pools, Dialect::Tagged, Kind::MatchComm, &vec![0; 70_000]).unwrap_err();
        assert!(matches!(err, Error::FrameOverflow { size: 70_000 }));
        // The buffer pool is untouched by the failed encode.
        assert!(pools.stats().iter().all(|&(watermark, _)| watermark == 0));
    }

    #[test]
    fn write_queue_batches_and_wakes_once() {
        let pools = BufferPools::new();
        let mut queue = WriteQueue::new();

        let first = encode(&pools, Dialect::Tagged, Kind::PlayerInput, b"a").unwrap();
        assert!(queue.push(first), "first frame arms the writer");

        let second = encode(&pools, Dialect::Tagged, Kind::PlayerInput, b"b").unwrap();
        assert!(!queue.push(second), "writer already armed");

        let slices = queue.begin_submission().unwrap();
        assert_eq!(slices.len(), 2);
        assert!(queue.begin_submission().is_none(), "one submission at a time");

        let total: usize = 2 * (4 + 1);
        queue.complete_submission(total);
        assert!(queue.is_drained());
        assert!(!queue.submission_in_flight());
    }

    #[test]
    fn write_queue_remembers_partial_writes() {
        let pools = BufferPools::new();
        let mut queue = WriteQueue::new();
        queue.push(encode(&pools, Dialect::Tagged, Kind::PlayerInput, b"hello").unwrap());
        queue.push(encode(&pools, Dialect::Tagged, Kind::PlayerInput, b"world").unwrap());

        let slices = queue.begin_submission().unwrap();
        assert_eq!(slices.len(), 2);
        drop(slices);

        // 9 bytes of frame one, 3 bytes into frame two.
        queue.complete_submission(12);
        assert!(!queue.is_drained());

        let slices = queue.begin_submission().unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(
            compio::buf::IoBuf::buf_len(&slices[0]),
            9 - 3,
            "next submission skips the written prefix"
        );
        drop(slices);

        queue.complete_submission(6);
        assert!(queue.is_drained());
    }

    #[test]
    fn write_queue_caps_a_submission_at_the_gather_limit() {
        let pools = BufferPools::new();
        let mut queue = WriteQueue::new();
        for _ in 0..PREALLOCATED_BUFFERS + 5 {
            queue.push(encode(&pools, Dialect::Tagged, Kind::PlayerInput, b"x").unwrap());
        }

        let slices = queue.begin_submission().unwrap();
        assert_eq!(slices.len(), PREALLOCATED_BUFFERS);
    }
}
