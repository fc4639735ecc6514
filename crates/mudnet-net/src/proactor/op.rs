//! Operations and their completions.
//!
//! Each attempt is one nonblocking syscall. `try_op` hands the operation
//! back when the socket is not ready, so the driver can park it until the
//! next readiness edge.

use std::io::{self, IoSlice, Read};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use socket2::Socket;

use crate::session::outbox::Segment;

/// A socket registered with a proactor. Shared between the owner and every
/// operation in flight on it.
pub(crate) struct IoHandle {
    socket: Socket,
    cancelled: AtomicBool,
}

impl IoHandle {
    pub(crate) fn new(socket: Socket) -> Arc<Self> {
        Arc::new(Self {
            socket,
            cancelled: AtomicBool::new(false),
        })
    }

    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

pub(crate) enum Op {
    Accept,
    Recv(Box<[u8]>),
    Send(Vec<Segment>),
    Connect,
}

impl Op {
    /// Writes wait for EPOLLOUT, everything else for EPOLLIN.
    pub(crate) fn is_write(&self) -> bool {
        matches!(self, Op::Send(_) | Op::Connect)
    }
}

pub(crate) enum Completion {
    Accept(io::Result<(Socket, SocketAddr)>),
    Recv {
        buf: Box<[u8]>,
        result: io::Result<usize>,
    },
    Send {
        segments: Vec<Segment>,
        result: io::Result<usize>,
    },
    Connect(io::Result<()>),
}

pub(crate) type CompletionFn = Box<dyn FnOnce(Completion) + Send + 'static>;

pub(crate) fn cancelled_error() -> io::Error {
    io::Error::from_raw_os_error(libc::ECANCELED)
}

/// True for the error a cancelled operation completes with.
pub fn is_cancelled(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ECANCELED)
}

/// Completion for an operation that never reached the socket.
pub(crate) fn cancel(op: Op) -> Completion {
    fail(op, cancelled_error())
}

pub(crate) fn fail(op: Op, err: io::Error) -> Completion {
    match op {
        Op::Accept => Completion::Accept(Err(err)),
        Op::Recv(buf) => Completion::Recv { buf, result: Err(err) },
        Op::Send(segments) => Completion::Send { segments, result: Err(err) },
        Op::Connect => Completion::Connect(Err(err)),
    }
}

fn retry(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// Attempt `op` once. `Err(op)` means the socket is not ready yet.
pub(crate) fn try_op(handle: &IoHandle, op: Op) -> Result<Completion, Op> {
    let socket = handle.socket();
    match op {
        Op::Accept => loop {
            match socket.accept() {
                Ok((peer, addr)) => {
                    let result = addr.as_socket().map(|a| (peer, a)).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "accepted non-inet peer")
                    });
                    return Ok(Completion::Accept(result));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if retry(&e) => return Err(Op::Accept),
                Err(e) => return Ok(Completion::Accept(Err(e))),
            }
        },
        Op::Recv(mut buf) => loop {
            match (&*socket).read(&mut buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if retry(&e) => return Err(Op::Recv(buf)),
                result => return Ok(Completion::Recv { buf, result }),
            }
        },
        Op::Send(segments) => loop {
            let result = {
                let slices: Vec<IoSlice<'_>> =
                    segments.iter().map(|s| IoSlice::new(s.as_slice())).collect();
                socket.send_vectored_with_flags(&slices, libc::MSG_NOSIGNAL)
            };
            match result {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if retry(&e) => return Err(Op::Send(segments)),
                result => return Ok(Completion::Send { segments, result }),
            }
        },
        Op::Connect => match socket.peer_addr() {
            Ok(_) => Ok(Completion::Connect(Ok(()))),
            Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => match socket.take_error() {
                Ok(Some(err)) => Ok(Completion::Connect(Err(err))),
                Ok(None) => Err(Op::Connect),
                Err(err) => Ok(Completion::Connect(Err(err))),
            },
            Err(e) => Ok(Completion::Connect(Err(e))),
        },
    }
}
