//! `BufferPool`: per-size free lists of reusable byte buffers.
//!
//! Buffers are plain `Box<[u8]>` allocations keyed by their exact length.
//! Each size class is a bounded lock-free queue; the size-class table is
//! read-locked on the hot path and write-locked only the first time a size
//! is seen.
//!
//! `acquire` never fails and never blocks: an empty free list falls back to
//! a fresh allocation. `release` of a buffer whose class is full simply drops
//! it. Contents of a recycled buffer are NOT cleared.

use crossbeam_queue::ArrayQueue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

type FreeList = Arc<ArrayQueue<Box<[u8]>>>;

pub struct BufferPool {
    classes: RwLock<HashMap<usize, FreeList>>,
    /// Max idle buffers retained per size class.
    per_class: usize,
    /// Buffers handed out and not yet returned (diagnostics).
    in_use: AtomicUsize,
    /// Buffers ever allocated by this pool (diagnostics).
    allocated: AtomicUsize,
}

impl BufferPool {
    pub const DEFAULT_PER_CLASS: usize = 1024;

    pub fn new() -> Self {
        Self::with_class_capacity(Self::DEFAULT_PER_CLASS)
    }

    /// Pool keeping at most `per_class` idle buffers of each size.
    pub fn with_class_capacity(per_class: usize) -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            per_class: per_class.max(1),
            in_use: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Process-wide pool shared by every session.
    pub fn global() -> &'static BufferPool {
        static GLOBAL: OnceLock<BufferPool> = OnceLock::new();
        GLOBAL.get_or_init(BufferPool::new)
    }

    fn class(&self, size: usize) -> FreeList {
        {
            let classes = self.classes.read().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = classes.get(&size) {
                return Arc::clone(list);
            }
        }
        let mut classes = self.classes.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            classes
                .entry(size)
                .or_insert_with(|| Arc::new(ArrayQueue::new(self.per_class))),
        )
    }

    /// Take a buffer of exactly `size` bytes.
    pub fn acquire(&self, size: usize) -> Box<[u8]> {
        self.in_use.fetch_add(1, Ordering::Relaxed);
        if let Some(buf) = self.class(size).pop() {
            return buf;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        vec![0u8; size].into_boxed_slice()
    }

    /// Return a buffer to the free list for its length.
    pub fn release(&self, buf: Box<[u8]>) {
        // Saturating: foreign buffers may be released into the pool too.
        let _ = self
            .in_use
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        if buf.is_empty() {
            return;
        }
        let _ = self.class(buf.len()).push(buf);
    }

    /// Idle buffers currently cached for `size`.
    pub fn available(&self, size: usize) -> usize {
        let classes = self.classes.read().unwrap_or_else(|e| e.into_inner());
        classes.get(&size).map_or(0, |list| list.len())
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("per_class", &self.per_class)
            .field("in_use", &self.in_use())
            .field("allocated", &self.allocated())
            .finish()
    }
}
