//! Binary frames: a 4-byte big-endian length, then that many bytes.

use super::{Accumulator, Progress, Request};
use crate::error::RequestError;
use crate::session::Session;

const HEADER: usize = 4;

pub const DEFAULT_FRAME_LIMIT: usize = 16 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Body(usize),
}

#[derive(Debug)]
pub struct LengthPrefixed {
    phase: Phase,
    pending: Accumulator,
    payload: Vec<u8>,
    limit: usize,
}

impl Default for LengthPrefixed {
    fn default() -> Self {
        Self::with_limit(DEFAULT_FRAME_LIMIT)
    }
}

impl LengthPrefixed {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            phase: Phase::Header,
            pending: Accumulator::new(),
            payload: Vec::new(),
            limit,
        }
    }

    /// Outgoing frame carrying `payload`.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl Request for LengthPrefixed {
    fn consume(&mut self, bytes: &[u8]) -> Result<Progress, RequestError> {
        let mut used = 0;
        loop {
            let rest = &bytes[used..];
            match self.phase {
                Phase::Header => {
                    let take = (HEADER - self.pending.len()).min(rest.len());
                    self.pending.extend(&rest[..take]);
                    used += take;
                    if self.pending.len() < HEADER {
                        return Ok(Progress::partial(used));
                    }
                    let h = self.pending.as_slice();
                    let len = u32::from_be_bytes([h[0], h[1], h[2], h[3]]) as usize;
                    self.pending.clear();
                    if len > self.limit {
                        return Err(RequestError::TooLarge { limit: self.limit });
                    }
                    self.phase = Phase::Body(len);
                }
                Phase::Body(len) => {
                    let take = (len - self.pending.len()).min(rest.len());
                    self.pending.extend(&rest[..take]);
                    used += take;
                    if self.pending.len() < len {
                        return Ok(Progress::partial(used));
                    }
                    self.payload.clear();
                    self.payload.extend_from_slice(self.pending.as_slice());
                    self.pending.clear();
                    self.phase = Phase::Header;
                    return Ok(Progress::complete(used));
                }
            }
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Header;
        self.pending.clear();
        self.payload.clear();
    }

    fn send(&self, session: &Session<Self>) -> bool {
        let len = match u32::try_from(self.payload.len()) {
            Ok(len) => len,
            Err(_) => return false,
        };
        session.write_parts(&[&len.to_be_bytes()[..], self.payload.as_slice()])
    }
}
