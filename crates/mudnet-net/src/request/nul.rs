//! NUL-terminated UTF-8 text messages.

use super::{Accumulator, Progress, Request};
use crate::error::RequestError;
use crate::session::Session;

pub const DEFAULT_TEXT_LIMIT: usize = 1 << 20;

#[derive(Debug)]
pub struct NulTerminated {
    pending: Accumulator,
    text: String,
    limit: usize,
}

impl Default for NulTerminated {
    fn default() -> Self {
        Self::with_limit(DEFAULT_TEXT_LIMIT)
    }
}

impl NulTerminated {
    /// Longest accepted message, terminator excluded.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Accumulator::new(),
            text: String::new(),
            limit,
        }
    }

    /// Outgoing message carrying `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn check(&self, extra: usize) -> Result<(), RequestError> {
        if self.pending.len() + extra > self.limit {
            return Err(RequestError::TooLarge { limit: self.limit });
        }
        Ok(())
    }
}

impl Request for NulTerminated {
    fn consume(&mut self, bytes: &[u8]) -> Result<Progress, RequestError> {
        match bytes.iter().position(|&b| b == 0) {
            Some(end) => {
                self.check(end)?;
                self.pending.extend(&bytes[..end]);
                self.text = std::str::from_utf8(self.pending.as_slice())?.to_owned();
                self.pending.clear();
                Ok(Progress::complete(end + 1))
            }
            None => {
                self.check(bytes.len())?;
                self.pending.extend(bytes);
                Ok(Progress::partial(bytes.len()))
            }
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.text.clear();
    }

    fn send(&self, session: &Session<Self>) -> bool {
        session.write_parts(&[self.text.as_bytes(), &[0u8][..]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_message() {
        let mut req = NulTerminated::default();
        let p = req.consume(b"hi\0rest").unwrap();
        assert_eq!(p, Progress::complete(3));
        assert_eq!(req.text(), "hi");
    }

    #[test]
    fn test_invalid_utf8() {
        let mut req = NulTerminated::default();
        assert!(matches!(req.consume(&[0xff, 0xfe, 0]), Err(RequestError::Utf8(_))));
    }

    #[test]
    fn test_limit_counts_partial_bytes() {
        let mut req = NulTerminated::with_limit(5);
        assert_eq!(req.consume(b"abc").unwrap(), Progress::partial(3));
        assert!(req.consume(b"def").is_err());
    }

    #[test]
    fn test_reset() {
        let mut req = NulTerminated::default();
        req.consume(b"par").unwrap();
        req.reset();
        req.consume(b"x\0").unwrap();
        assert_eq!(req.text(), "x");
    }
}
