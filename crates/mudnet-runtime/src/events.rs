//! Named publish/subscribe registry.
//!
//! The subscriber table is only touched on the owning loop's thread.
//! Link/unlink requests from other threads go into a pending queue that
//! the owner drains immediately before it dispatches the next broadcast,
//! so a subscription change never races a delivery.

use crossbeam_queue::SegQueue;

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Broadcast payload. Handlers downcast to the type they expect.
pub type Payload = Arc<dyn Any + Send + Sync>;

pub type EventHandler = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Token returned by `Loop::link`, used to unlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription(u64);

enum Change {
    Link {
        name: String,
        sub: Subscription,
        handler: EventHandler,
    },
    Unlink {
        name: String,
        sub: Subscription,
    },
}

type Table = HashMap<String, Vec<(Subscription, EventHandler)>>;

pub(crate) struct EventRegistry {
    table: Mutex<Table>,
    pending: SegQueue<Change>,
    next: AtomicU64,
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            pending: SegQueue::new(),
            next: AtomicU64::new(1),
        }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn next_subscription(&self) -> Subscription {
        Subscription(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn link_now(&self, name: String, sub: Subscription, handler: EventHandler) {
        self.table().entry(name).or_default().push((sub, handler));
    }

    pub(crate) fn unlink_now(&self, name: &str, sub: Subscription) -> bool {
        let mut table = self.table();
        let Some(subs) = table.get_mut(name) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(s, _)| *s != sub);
        let removed = subs.len() != before;
        if subs.is_empty() {
            table.remove(name);
        }
        removed
    }

    pub(crate) fn defer_link(&self, name: String, sub: Subscription, handler: EventHandler) {
        self.pending.push(Change::Link { name, sub, handler });
    }

    pub(crate) fn defer_unlink(&self, name: String, sub: Subscription) {
        self.pending.push(Change::Unlink { name, sub });
    }

    /// Owner thread only: fold queued changes into the table, in order.
    pub(crate) fn apply_pending(&self) {
        while let Some(change) = self.pending.pop() {
            match change {
                Change::Link { name, sub, handler } => self.link_now(name, sub, handler),
                Change::Unlink { name, sub } => {
                    self.unlink_now(&name, sub);
                }
            }
        }
    }

    /// Snapshot of handlers for `name`, in link order.
    pub(crate) fn handlers(&self, name: &str) -> Vec<EventHandler> {
        self.table()
            .get(name)
            .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn subscriber_count(&self, name: &str) -> usize {
        self.table().get(name).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> EventHandler {
        Arc::new(|_: &Payload| {})
    }

    #[test]
    fn test_link_unlink() {
        let reg = EventRegistry::new();
        let a = reg.next_subscription();
        let b = reg.next_subscription();
        reg.link_now("tick".into(), a, noop());
        reg.link_now("tick".into(), b, noop());
        assert_eq!(reg.subscriber_count("tick"), 2);

        assert!(reg.unlink_now("tick", a));
        assert!(!reg.unlink_now("tick", a));
        assert_eq!(reg.subscriber_count("tick"), 1);
        assert!(reg.unlink_now("tick", b));
        assert_eq!(reg.subscriber_count("tick"), 0);
    }

    #[test]
    fn test_deferred_changes_apply_in_order() {
        let reg = EventRegistry::new();
        let sub = reg.next_subscription();
        reg.defer_link("tock".into(), sub, noop());
        reg.defer_unlink("tock".into(), sub);
        assert!(!reg.pending.is_empty());
        assert_eq!(reg.subscriber_count("tock"), 0);

        reg.apply_pending();
        assert!(reg.pending.is_empty());
        assert_eq!(reg.subscriber_count("tock"), 0);

        reg.defer_link("tock".into(), sub, noop());
        reg.apply_pending();
        assert_eq!(reg.handlers("tock").len(), 1);
    }
}
