//! Per-session send queue with byte-budget backpressure.
//!
//! Bytes are copied into pool buffers of size B. A buffer becomes *ready*
//! when it fills or on flush; up to `send_vector` ready buffers go out in
//! one vectored send. A write of `len` bytes is refused when
//!
//! ```text
//! (max_buffers - (ready + in_flight)) * B - partial_fill < len
//! ```
//!
//! so queued plus in-flight bytes never exceed `max_buffers * B`.

use std::collections::VecDeque;

use mudnet_core::BufferPool;

/// The unsent part of one send buffer.
pub(crate) struct Segment {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Segment {
    fn new(buf: Box<[u8]>, end: usize) -> Self {
        Self { buf, start: 0, end }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }

    pub(crate) fn into_buf(self) -> Box<[u8]> {
        self.buf
    }
}

pub(crate) struct Outbox {
    buffer_size: usize,
    max_buffers: usize,
    vector: usize,
    ready: VecDeque<Segment>,
    partial: Option<(Box<[u8]>, usize)>,
    in_flight: usize,
}

impl Outbox {
    pub(crate) fn new(buffer_size: usize, max_buffers: usize, vector: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            max_buffers,
            vector: vector.max(1),
            ready: VecDeque::new(),
            partial: None,
            in_flight: 0,
        }
    }

    fn partial_fill(&self) -> usize {
        self.partial.as_ref().map_or(0, |(_, fill)| *fill)
    }

    /// Bytes charged against the budget, counting every full or in-flight
    /// buffer at B.
    pub(crate) fn charged(&self) -> usize {
        (self.ready.len() + self.in_flight) * self.buffer_size + self.partial_fill()
    }

    pub(crate) fn fits(&self, len: usize) -> bool {
        let held = self.ready.len() + self.in_flight;
        let Some(free) = self.max_buffers.checked_sub(held) else {
            return false;
        };
        free.saturating_mul(self.buffer_size)
            .checked_sub(self.partial_fill())
            .is_some_and(|remain| remain >= len)
    }

    /// Copy `bytes` in. Callers check `fits` first.
    pub(crate) fn push(&mut self, mut bytes: &[u8], pool: &BufferPool) {
        let size = self.buffer_size;
        while !bytes.is_empty() {
            let (buf, fill) = self.partial.get_or_insert_with(|| (pool.acquire(size), 0));
            let n = (size - *fill).min(bytes.len());
            buf[*fill..*fill + n].copy_from_slice(&bytes[..n]);
            *fill += n;
            bytes = &bytes[n..];
            if *fill == size {
                if let Some((buf, fill)) = self.partial.take() {
                    self.ready.push_back(Segment::new(buf, fill));
                }
            }
        }
    }

    /// Promote the partial buffer to ready. False when it was empty.
    pub(crate) fn flush(&mut self) -> bool {
        match self.partial.take() {
            Some((buf, fill)) if fill > 0 => {
                self.ready.push_back(Segment::new(buf, fill));
                true
            }
            other => {
                self.partial = other;
                false
            }
        }
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Next batch of at most `send_vector` ready buffers, unless a batch is
    /// already in flight.
    pub(crate) fn take_batch(&mut self) -> Option<Vec<Segment>> {
        if self.in_flight > 0 || self.ready.is_empty() {
            return None;
        }
        let n = self.vector.min(self.ready.len());
        let batch: Vec<Segment> = self.ready.drain(..n).collect();
        self.in_flight = batch.len();
        Some(batch)
    }

    /// Settle the in-flight batch after `sent` bytes went out. Fully sent
    /// buffers are returned for release; the rest go back to the front of
    /// the queue when `requeue`, else they are returned too.
    pub(crate) fn finish(
        &mut self,
        segments: Vec<Segment>,
        mut sent: usize,
        requeue: bool,
    ) -> Vec<Box<[u8]>> {
        self.in_flight = 0;
        let mut freed = Vec::new();
        let mut unsent = Vec::new();
        for mut seg in segments {
            if sent >= seg.len() {
                sent -= seg.len();
                freed.push(seg.into_buf());
            } else {
                seg.start += sent;
                sent = 0;
                if requeue {
                    unsent.push(seg);
                } else {
                    freed.push(seg.into_buf());
                }
            }
        }
        for seg in unsent.into_iter().rev() {
            self.ready.push_front(seg);
        }
        freed
    }

    /// Empty the queue; returns every buffer still owned here.
    pub(crate) fn clear(&mut self) -> Vec<Box<[u8]>> {
        let mut freed: Vec<Box<[u8]>> = self.ready.drain(..).map(Segment::into_buf).collect();
        if let Some((buf, _)) = self.partial.take() {
            freed.push(buf);
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backpressure_budget() {
        let pool = BufferPool::new();
        let mut outbox = Outbox::new(1024, 3, 2);

        assert!(outbox.fits(3000));
        outbox.push(&[7u8; 3000], &pool);
        assert_eq!(outbox.charged(), 2 * 1024 + 952);

        assert!(outbox.fits(1));
        outbox.push(&[1], &pool);
        assert!(!outbox.fits(100));
        assert!(outbox.fits(71));
    }

    #[test]
    fn test_two_buffer_budget_rejects_oversized_write() {
        let outbox = Outbox::new(1024, 2, 2);
        assert!(!outbox.fits(3000));
        assert!(outbox.fits(2048));
    }

    #[test]
    fn test_batches_respect_vector() {
        let pool = BufferPool::new();
        let mut outbox = Outbox::new(4, 8, 2);
        outbox.push(b"abcdefghijkl", &pool);
        assert!(!outbox.flush());

        let batch = outbox.take_batch().unwrap();
        assert_eq!(batch.len(), 2);
        // One batch at a time.
        assert!(outbox.take_batch().is_none());

        let freed = outbox.finish(batch, 8, true);
        assert_eq!(freed.len(), 2);
        let batch = outbox.take_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].as_slice(), b"ijkl");
    }

    #[test]
    fn test_partial_send_requeues_remainder() {
        let pool = BufferPool::new();
        let mut outbox = Outbox::new(4, 8, 4);
        outbox.push(b"abcdef", &pool);
        assert!(outbox.flush());

        let batch = outbox.take_batch().unwrap();
        let freed = outbox.finish(batch, 5, true);
        assert_eq!(freed.len(), 1);

        let batch = outbox.take_batch().unwrap();
        assert_eq!(batch[0].as_slice(), b"f");
    }

    #[test]
    fn test_in_flight_counts_against_budget() {
        let pool = BufferPool::new();
        let mut outbox = Outbox::new(4, 2, 2);
        outbox.push(b"abcdefgh", &pool);
        let batch = outbox.take_batch().unwrap();
        assert!(!outbox.fits(1));

        let freed = outbox.finish(batch, 8, true);
        assert_eq!(freed.len(), 2);
        assert!(outbox.fits(8));
    }

    #[test]
    fn test_clear_returns_everything() {
        let pool = BufferPool::new();
        let mut outbox = Outbox::new(4, 8, 2);
        outbox.push(b"abcdef", &pool);
        assert_eq!(outbox.clear().len(), 2);
        assert_eq!(outbox.charged(), 0);
    }
}
