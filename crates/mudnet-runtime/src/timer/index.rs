//! Stable small timer indices.
//!
//! Fresh indices come from a global counter. A dropped timer returns its
//! index to the free list of the dropping thread, and new timers take the
//! smallest free index first. Keeping the free list per thread means a
//! loop thread's timers get indices in creation order no matter what
//! other threads allocate.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static FREE: RefCell<BinaryHeap<Reverse<u32>>> = RefCell::new(BinaryHeap::new());
}

#[derive(Debug)]
pub(crate) struct TimerIndex(u32);

impl TimerIndex {
    pub(crate) fn acquire() -> Self {
        let reused = FREE
            .try_with(|free| free.borrow_mut().pop())
            .ok()
            .flatten()
            .map(|Reverse(idx)| idx);
        TimerIndex(reused.unwrap_or_else(|| NEXT.fetch_add(1, Ordering::Relaxed)))
    }

    #[inline]
    pub(crate) fn get(&self) -> u32 {
        self.0
    }
}

impl Drop for TimerIndex {
    fn drop(&mut self) {
        let idx = self.0;
        // Thread teardown: the index is simply never reused.
        let _ = FREE.try_with(|free| free.borrow_mut().push(Reverse(idx)));
    }
}
