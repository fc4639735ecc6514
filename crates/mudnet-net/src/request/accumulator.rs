//! Growable byte accumulator for partial messages.
//!
//! Live bytes sit in `buf[start..end]`. Appending first slides the live
//! bytes back to offset 0 when that makes room, and only grows (doubling)
//! when the live bytes plus the new ones exceed capacity.

#[derive(Debug, Default)]
pub struct Accumulator {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: vec![0; cap],
            start: 0,
            end: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if self.end + bytes.len() > self.buf.len() {
            let live = self.len();
            if live + bytes.len() <= self.buf.len() {
                self.buf.copy_within(self.start..self.end, 0);
            } else {
                let mut cap = self.buf.len().max(64);
                while cap < live + bytes.len() {
                    cap *= 2;
                }
                let mut grown = vec![0; cap];
                grown[..live].copy_from_slice(self.as_slice());
                self.buf = grown;
            }
            self.start = 0;
            self.end = live;
        }
        self.buf[self.end..self.end + bytes.len()].copy_from_slice(bytes);
        self.end += bytes.len();
    }

    /// Drop `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
        if self.start == self.end {
            self.clear();
        }
    }

    /// Forget the contents, keep the capacity.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_by_doubling() {
        let mut acc = Accumulator::with_capacity(4);
        acc.extend(b"abc");
        acc.extend(b"defgh");
        assert_eq!(acc.as_slice(), b"abcdefgh");
        assert_eq!(acc.capacity(), 64);
    }

    #[test]
    fn test_compacts_before_growing() {
        let mut acc = Accumulator::with_capacity(128);
        acc.extend(&[1u8; 100]);
        acc.consume(90);
        acc.extend(&[2u8; 100]);
        assert_eq!(acc.capacity(), 128);
        assert_eq!(acc.len(), 110);
        assert_eq!(&acc.as_slice()[..10], &[1u8; 10]);
        assert_eq!(&acc.as_slice()[10..], &[2u8; 100][..]);
    }

    #[test]
    fn test_consume_all_resets() {
        let mut acc = Accumulator::new();
        acc.extend(b"xyz");
        acc.consume(10);
        assert!(acc.is_empty());
        acc.extend(b"q");
        assert_eq!(acc.as_slice(), b"q");
    }
}
