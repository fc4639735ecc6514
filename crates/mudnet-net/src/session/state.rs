//! Session lifecycle bits.
//!
//! Legal transitions:
//!
//! | flag    | set when                          | cleared when            |
//! |---------|-----------------------------------|-------------------------|
//! | INIT    | `start`, unless INIT or CLOSED    | never                   |
//! | SENDING | a send is submitted, unless held  | its completion settles  |
//! | CLOSED  | the first `close`                 | never                   |
//!
//! Every change is a compare-and-swap, so concurrent callers agree on who
//! won each transition.

use std::sync::atomic::{AtomicU8, Ordering};

pub const INIT: u8 = 0b001;
pub const SENDING: u8 = 0b010;
pub const CLOSED: u8 = 0b100;

#[derive(Debug, Default)]
pub(crate) struct SessionState(AtomicU8);

impl SessionState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub(crate) fn bits(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn contains(&self, flag: u8) -> bool {
        self.bits() & flag != 0
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.contains(CLOSED)
    }

    /// Set `flag` unless any bit of `blocked` is set.
    pub(crate) fn try_add(&self, flag: u8, blocked: u8) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur & blocked == 0).then_some(cur | flag)
            })
            .is_ok()
    }

    /// Clear `flag`; true when it was set.
    pub(crate) fn remove(&self, flag: u8) -> bool {
        self.0.fetch_and(!flag, Ordering::AcqRel) & flag != 0
    }

    /// Set CLOSED. Returns the previous bits only for the caller that won.
    pub(crate) fn close(&self) -> Option<u8> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur & CLOSED == 0).then_some(cur | CLOSED)
            })
            .ok()
    }
}
