//! Fixed-capacity I/O buffers and their completion-I/O adapters.
//!
//! This module is the ONLY place where unsafe memory manipulation is allowed.
//! All invariants are enforced here so the rest of the system can remain
//! 100% safe.
//!
//! Two adapters bridge pooled buffers into compio's ownership-passing I/O:
//! - [`ReadSlice`]: a mutable window `[offset, capacity)` of a pooled buffer,
//!   handed to the kernel for a single read submission.
//! - [`FrameSlice`]: an immutable view of one encoded frame, used as an
//!   element of a vectored write submission. Holding it keeps the frame's
//!   buffer refcount up for the duration of the submission.

#![allow(unsafe_code)]

use compio::buf::{IoBuf, IoBufMut, SetBufInit};

use crate::config::BUFFER_CAPACITY;
use crate::message::Message;
use crate::pool::{Poolable, PoolRef};

/// A pooled, fixed-capacity byte buffer.
///
/// The backing storage is heap-allocated once and never reallocated, so raw
/// pointers into it stay valid for as long as any pool handle is alive.
pub struct Buffer {
    data: Box<[u8]>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            data: vec![0u8; BUFFER_CAPACITY].into_boxed_slice(),
        }
    }
}

impl Poolable for Buffer {}

impl Buffer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Shared handle to a pooled buffer.
pub type BufferRef = PoolRef<Buffer>;

/// A mutable read window over a pooled buffer, starting at `offset`.
///
/// Implements `IoBufMut` so compio can write into it during a read
/// submission; it is never exposed to user code and is converted back into
/// `(BufferRef, filled)` once the completion arrives.
pub struct ReadSlice {
    buf: BufferRef,
    offset: usize,
    init: usize,
}

// SAFETY: the window points into heap storage owned by the pool slot, which
// the contained BufferRef keeps alive; the pointer never moves.
unsafe impl Send for ReadSlice {}

impl ReadSlice {
    /// Create a read window `[offset, capacity)` over `buf`.
    ///
    /// The caller must guarantee that no other writer touches that region
    /// while the slice is outstanding. Bytes below `offset` may still be
    /// shared read-only with live messages.
    pub(crate) fn new(buf: BufferRef, offset: usize) -> Self {
        debug_assert!(offset < BUFFER_CAPACITY);
        Self {
            buf,
            offset,
            init: 0,
        }
    }

    /// Number of bytes the kernel wrote into the window.
    #[inline]
    pub fn filled(&self) -> usize {
        self.init
    }

    /// Copy `data` into the window, as a completed read would.
    ///
    /// Used by tests and simulated transports that stand in for the kernel.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(IoBuf::buf_capacity(&*self));
        // SAFETY: the window is exclusive to this slice while it exists,
        // and n is bounded by the window length.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base(), n);
        }
        self.init = n;
        n
    }

    /// Release the window, returning the underlying handle.
    #[inline]
    pub fn into_buffer(self) -> BufferRef {
        self.buf
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        // SAFETY: value_ptr is valid while self.buf is alive; the Box<[u8]>
        // inside Buffer is a stable heap allocation.
        unsafe { (*self.buf.value_ptr()).data.as_mut_ptr().add(self.offset) }
    }
}

// SAFETY: the region [base, base + capacity - offset) is valid, pinned heap
// memory; `init` never exceeds the window length (enforced in set_buf_init).
unsafe impl IoBuf for ReadSlice {
    #[inline]
    fn as_buf_ptr(&self) -> *const u8 {
        self.base()
    }

    #[inline]
    fn buf_len(&self) -> usize {
        self.init
    }

    #[inline]
    fn buf_capacity(&self) -> usize {
        BUFFER_CAPACITY - self.offset
    }
}

// SAFETY: the window is exclusively the kernel's between submission and
// completion; no safe API hands out aliasing mutable access meanwhile.
unsafe impl IoBufMut for ReadSlice {
    #[inline]
    fn as_buf_mut_ptr(&mut self) -> *mut u8 {
        self.base()
    }
}

impl SetBufInit for ReadSlice {
    #[inline]
    unsafe fn set_buf_init(&mut self, len: usize) {
        debug_assert!(len <= BUFFER_CAPACITY - self.offset);
        self.init = len;
    }
}

/// One frame of a vectored write submission.
///
/// Wraps a message (skipping `skip` bytes of an earlier partial write) and
/// exposes its wire span as an `IoBuf`, so a `Vec<FrameSlice>` forms the
/// gather list of a single submission. The contained message pins the
/// buffer until the write completion is consumed.
pub struct FrameSlice {
    msg: Message,
    skip: usize,
}

// SAFETY: same pinning argument as ReadSlice; the span is read-only.
unsafe impl Send for FrameSlice {}

impl FrameSlice {
    pub(crate) fn new(msg: Message, skip: usize) -> Self {
        debug_assert!(skip < msg.size_with_header());
        Self { msg, skip }
    }

    #[inline]
    fn span(&self) -> &[u8] {
        &self.msg.span()[self.skip..]
    }
}

// SAFETY: the span borrows pooled storage kept alive by self.msg; it is
// immutable for the lifetime of the submission.
unsafe impl IoBuf for FrameSlice {
    #[inline]
    fn as_buf_ptr(&self) -> *const u8 {
        self.span().as_ptr()
    }

    #[inline]
    fn buf_len(&self) -> usize {
        self.span().len()
    }

    #[inline]
    fn buf_capacity(&self) -> usize {
        self.span().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;

    #[test]
    fn read_slice_window_tracks_offset() {
        let pool = Pool::<Buffer>::create("test");
        let buf = pool.acquire();
        let slice = ReadSlice::new(buf, 100);
        assert_eq!(slice.buf_capacity(), BUFFER_CAPACITY - 100);
        assert_eq!(slice.filled(), 0);
    }

    #[test]
    fn read_slice_returns_buffer() {
        let pool = Pool::<Buffer>::create("test");
        let buf = pool.acquire();
        let slice = ReadSlice::new(buf.clone(), 0);
        let back = slice.into_buffer();
        assert!(back.shares_slot(&buf));
    }
}
