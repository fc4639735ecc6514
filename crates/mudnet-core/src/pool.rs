//! Generic object pool.
//!
//! A bounded lock-free free list of `T`. There is no reset callback: the
//! caller must clear an object's state before handing it back, so a pooled
//! value is always indistinguishable from a freshly constructed one.

use crossbeam_queue::ArrayQueue;

pub struct ObjectPool<T> {
    free: ArrayQueue<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Default + 'static> ObjectPool<T> {
    /// Pool that builds missing objects with `T::default()`.
    pub fn new(capacity: usize) -> Self {
        Self::with_factory(capacity, T::default)
    }
}

impl<T> ObjectPool<T> {
    /// Pool that builds missing objects with `factory`.
    pub fn with_factory<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
            factory: Box::new(factory),
        }
    }

    /// Pop a pooled object, or build one when the pool is empty.
    #[inline]
    pub fn acquire(&self) -> T {
        self.free.pop().unwrap_or_else(|| (self.factory)())
    }

    /// Hand a reset object back. Returns `false` (and drops it) when full.
    #[inline]
    pub fn release(&self, item: T) -> bool {
        self.free.push(item).is_ok()
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_empty_pool_builds() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4);
        assert!(pool.is_empty());
        let v = pool.acquire();
        assert!(v.is_empty());
    }

    #[test]
    fn test_release_then_reuse() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = ObjectPool::with_factory(4, move || {
            counter.fetch_add(1, Ordering::Relaxed);
            String::with_capacity(32)
        });

        let mut s = pool.acquire();
        s.push_str("payload");
        s.clear();
        assert!(pool.release(s));
        assert_eq!(pool.len(), 1);

        let s = pool.acquire();
        assert!(s.capacity() >= 32);
        assert_eq!(built.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_release_when_full() {
        let pool: ObjectPool<u32> = ObjectPool::new(1);
        assert!(pool.release(1));
        assert!(!pool.release(2));
        assert_eq!(pool.acquire(), 1);
        assert_eq!(pool.acquire(), 0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let pool: ObjectPool<u8> = ObjectPool::new(0);
        assert_eq!(pool.capacity(), 1);
    }
}
