//! Refcounted object pools.
//!
//! A [`Pool`] keeps a free list of recycled objects behind a mutex; handles
//! ([`PoolRef`]) are clone-shared with an atomic refcount and return their
//! object to the pool when the last clone drops. Live handles hold the pool
//! alive, so a pool may be replaced while references are still in flight and
//! the tail of releases still lands somewhere valid.
//!
//! Buffer traffic comes from several threads at once (reader, writers,
//! encoders), so buffer pools are sharded: [`BufferPools`] spreads acquires
//! over [`POOL_SHARDS`] sub-pools with an atomic round-robin index, and each
//! buffer is released back to the shard it came from.
//!
//! A per-pool *preferred* sub-list holds the buffers preallocated at
//! transport init (tagged with their registration index); acquire serves
//! preferred buffers first so the hot path keeps hitting the same storage.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::buffer::Buffer;
use crate::config::POOL_SHARDS;

/// Objects a pool can recycle.
///
/// `reset` runs on every acquire so a recycled object never leaks state from
/// its previous life; plain byte buffers keep their contents (the codec
/// tracks validity by offsets).
pub trait Poolable: Default + Send + 'static {
    fn reset(&mut self) {}
}

/// Reusable encode scratch for outbound payload serialization.
#[derive(Default)]
pub struct EncodeBuffer {
    data: Vec<u8>,
}

impl Poolable for EncodeBuffer {
    fn reset(&mut self) {
        self.data.clear();
    }
}

impl EncodeBuffer {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

/// One pooled object plus its sharing state.
struct Slot<T> {
    refs: AtomicU32,
    tag: AtomicU32,
    preferred: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the UnsafeCell is only accessed mutably while refs == 0 (inside
// the pool, under its mutex) or through PoolRef::get_mut which requires a
// unique handle; shared access is read-only.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T: Poolable> Slot<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            refs: AtomicU32::new(0),
            tag: AtomicU32::new(0),
            preferred: AtomicBool::new(false),
            value: UnsafeCell::new(T::default()),
        })
    }
}

struct FreeLists<T> {
    plain: Vec<Arc<Slot<T>>>,
    preferred: Vec<Arc<Slot<T>>>,
    watermark: usize,
}

/// A single object pool. See module docs; most users want [`BufferPools`].
pub struct Pool<T> {
    name: &'static str,
    free: Mutex<FreeLists<T>>,
}

impl<T: Poolable> Pool<T> {
    /// Create an empty pool.
    pub fn create(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            free: Mutex::new(FreeLists {
                plain: Vec::new(),
                preferred: Vec::new(),
                watermark: 0,
            }),
        })
    }

    /// Get an object from the pool, constructing one if the free lists are
    /// empty. Preferred objects are served first.
    pub fn acquire(self: &Arc<Self>) -> PoolRef<T> {
        let slot = {
            let mut free = self.free.lock().expect("pool mutex");
            free.preferred
                .pop()
                .or_else(|| free.plain.pop())
                .unwrap_or_else(Slot::new)
        };

        debug_assert_eq!(slot.refs.load(Ordering::Relaxed), 0);
        // SAFETY: refs == 0, so no handle aliases the value.
        unsafe { (*slot.value.get()).reset() };
        slot.refs.store(1, Ordering::Relaxed);

        PoolRef {
            pool: Arc::clone(self),
            slot: Some(slot),
        }
    }

    fn release(&self, slot: Arc<Slot<T>>) {
        let mut free = self.free.lock().expect("pool mutex");
        if slot.preferred.load(Ordering::Relaxed) {
            free.preferred.push(slot);
        } else {
            free.plain.push(slot);
        }
        let len = free.plain.len() + free.preferred.len();
        free.watermark = free.watermark.max(len);
    }

    /// `(watermark, current free-list length)` — equal once every handle
    /// handed out has been released.
    pub fn stats(&self) -> (usize, usize) {
        let free = self.free.lock().expect("pool mutex");
        (free.watermark, free.plain.len() + free.preferred.len())
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        if let Ok(free) = self.free.get_mut() {
            debug!(
                pool = self.name,
                watermark = free.watermark,
                "pool dropped"
            );
        }
    }
}

/// Clone-shared handle to a pooled object.
///
/// Cloning bumps an atomic refcount; dropping the last clone returns the
/// object to its pool. The handle also carries the pool-private registration
/// fields used for preferred buffers.
pub struct PoolRef<T: Poolable> {
    pool: Arc<Pool<T>>,
    slot: Option<Arc<Slot<T>>>,
}

impl<T: Poolable> PoolRef<T> {
    /// Shared read access.
    #[inline]
    pub fn get(&self) -> &T {
        let slot = self.slot.as_ref().expect("live handle");
        debug_assert!(slot.refs.load(Ordering::Relaxed) > 0);
        // SAFETY: shared access; mutation only happens through value_mut
        // (unique handle) or inside the pool (refs == 0).
        unsafe { &*slot.value.get() }
    }

    /// Exclusive write access. Only legal while this is the sole handle,
    /// i.e. before the object has been shared.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        let slot = self.slot.as_ref().expect("live handle");
        debug_assert_eq!(slot.refs.load(Ordering::Relaxed), 1);
        // SAFETY: refcount 1 means this handle is the only live alias.
        unsafe { &mut *slot.value.get() }
    }

    /// Raw pointer to the value, for the I/O adapters in `buffer`.
    #[inline]
    pub(crate) fn value_ptr(&self) -> *mut T {
        self.slot.as_ref().expect("live handle").value.get()
    }

    /// Registration index of a preferred buffer.
    #[inline]
    pub fn tag(&self) -> u32 {
        self.slot
            .as_ref()
            .map_or(0, |s| s.tag.load(Ordering::Relaxed))
    }

    pub fn set_tag(&self, tag: u32) {
        if let Some(slot) = &self.slot {
            slot.tag.store(tag, Ordering::Relaxed);
        }
    }

    /// Whether this object belongs to the preferred sub-pool.
    #[inline]
    pub fn preferred(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|s| s.preferred.load(Ordering::Relaxed))
    }

    pub fn set_preferred(&self, preferred: bool) {
        if let Some(slot) = &self.slot {
            slot.preferred.store(preferred, Ordering::Relaxed);
        }
    }

    /// Whether two handles view the same pooled object.
    #[inline]
    pub fn shares_slot(&self, other: &Self) -> bool {
        match (&self.slot, &other.slot) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn refcount(&self) -> u32 {
        self.slot
            .as_ref()
            .map_or(0, |s| s.refs.load(Ordering::Relaxed))
    }
}

impl<T: Poolable> Clone for PoolRef<T> {
    fn clone(&self) -> Self {
        let slot = self.slot.as_ref().expect("live handle");
        slot.refs.fetch_add(1, Ordering::Relaxed);
        Self {
            pool: Arc::clone(&self.pool),
            slot: Some(Arc::clone(slot)),
        }
    }
}

impl<T: Poolable> Drop for PoolRef<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            if slot.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.pool.release(slot);
            }
        }
    }
}

impl<T: Poolable> std::ops::Deref for PoolRef<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.get()
    }
}

/// The sharded buffer pool set used by a transport.
pub struct BufferPools {
    shards: [Arc<Pool<Buffer>>; POOL_SHARDS],
    next: AtomicUsize,
}

impl Default for BufferPools {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPools {
    pub fn new() -> Self {
        Self {
            shards: [
                Pool::create("buffer-0"),
                Pool::create("buffer-1"),
                Pool::create("buffer-2"),
                Pool::create("buffer-3"),
            ],
            next: AtomicUsize::new(0),
        }
    }

    /// Acquire a buffer, spreading requests across shards to reduce lock
    /// contention.
    pub fn acquire(&self) -> PoolRef<Buffer> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.shards[index % POOL_SHARDS].acquire()
    }

    /// Per-shard `(watermark, free length)` pairs.
    pub fn stats(&self) -> Vec<(usize, usize)> {
        self.shards.iter().map(|s| s.stats()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_recycles_released_objects() {
        let pool = Pool::<EncodeBuffer>::create("test");
        let first = pool.acquire();
        drop(first);

        let second = pool.acquire();
        assert_eq!(second.refcount(), 1);
        assert_eq!(pool.stats(), (1, 0));
        drop(second);
        assert_eq!(pool.stats(), (1, 1));
    }

    #[test]
    fn clone_shares_until_last_drop() {
        let pool = Pool::<EncodeBuffer>::create("test");
        let a = pool.acquire();
        let b = a.clone();
        assert!(a.shares_slot(&b));
        assert_eq!(a.refcount(), 2);

        drop(a);
        assert_eq!(pool.stats().1, 0, "still referenced");
        drop(b);
        assert_eq!(pool.stats().1, 1, "recycled on last drop");
    }

    #[test]
    fn builder_resets_on_acquire() {
        let pool = Pool::<EncodeBuffer>::create("test");
        let mut builder = pool.acquire();
        builder.get_mut().as_mut_vec().extend_from_slice(b"stale");
        drop(builder);

        let recycled = pool.acquire();
        assert!(recycled.as_slice().is_empty());
    }

    #[test]
    fn preferred_objects_come_back_first() {
        let pool = Pool::<Buffer>::create("test");
        let preferred = pool.acquire();
        preferred.set_preferred(true);
        preferred.set_tag(7);
        let plain = pool.acquire();
        drop(plain);
        drop(preferred);

        let next = pool.acquire();
        assert!(next.preferred());
        assert_eq!(next.tag(), 7);
    }

    #[test]
    fn shards_round_robin() {
        let pools = BufferPools::new();
        let held: Vec<_> = (0..POOL_SHARDS).map(|_| pools.acquire()).collect();
        drop(held);

        let stats = pools.stats();
        assert_eq!(stats.len(), POOL_SHARDS);
        assert!(stats.iter().all(|&(watermark, free)| watermark == free));
        assert_eq!(stats.iter().map(|&(_, free)| free).sum::<usize>(), POOL_SHARDS);
    }

    #[test]
    fn pool_outlives_handles_released_late() {
        let pool = Pool::<EncodeBuffer>::create("test");
        let held = pool.acquire();
        drop(pool);
        // The handle still owns an Arc to the pool; releasing after the
        // creator dropped its Arc must not crash.
        drop(held);
    }
}
