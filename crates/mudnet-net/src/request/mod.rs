//! Incremental request consumers.
//!
//! A [`Request`] is fed whatever bytes the socket produced, in arbitrary
//! chunks. It reports how many it took and whether a message is now
//! complete; the session dispatches each complete message and hands the
//! remaining bytes to a fresh request. The result must not depend on how
//! the stream was split.

mod accumulator;
mod frame;
mod nul;

pub use accumulator::Accumulator;
pub use frame::LengthPrefixed;
pub use nul::NulTerminated;

use mudnet_core::ObjectPool;

use crate::error::RequestError;
use crate::session::Session;

/// Outcome of one `consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes taken from the input
    pub consumed: usize,
    /// A full message has been assembled
    pub complete: bool,
}

impl Progress {
    pub fn partial(consumed: usize) -> Self {
        Self { consumed, complete: false }
    }

    pub fn complete(consumed: usize) -> Self {
        Self { consumed, complete: true }
    }
}

pub trait Request: Default + Send + 'static {
    /// Take bytes from the front of `bytes`. Must consume at least one byte
    /// unless it completes a message.
    fn consume(&mut self, bytes: &[u8]) -> Result<Progress, RequestError>;

    /// Return to the empty state before going back to the pool.
    fn reset(&mut self);

    /// Serialize onto `session`. False when the session refused the bytes.
    fn send(&self, session: &Session<Self>) -> bool;
}

/// Feed `bytes` through the request in `slot`, calling `complete` for each
/// finished message. Partial state stays in `slot` for the next chunk.
pub(crate) fn feed<R, F>(
    slot: &mut Option<R>,
    pool: &ObjectPool<R>,
    mut bytes: &[u8],
    mut complete: F,
) -> Result<usize, RequestError>
where
    R: Request,
    F: FnMut(R),
{
    let mut finished = 0;
    while !bytes.is_empty() {
        let request = slot.get_or_insert_with(|| pool.acquire());
        let progress = request.consume(bytes)?;
        if progress.consumed > bytes.len() {
            return Err(RequestError::Malformed(format!(
                "consumed {} of {} bytes",
                progress.consumed,
                bytes.len()
            )));
        }
        bytes = &bytes[progress.consumed..];
        if progress.complete {
            if let Some(done) = slot.take() {
                finished += 1;
                complete(done);
            }
        } else if progress.consumed == 0 {
            return Err(RequestError::Malformed("consumer made no progress".into()));
        }
    }
    Ok(finished)
}
