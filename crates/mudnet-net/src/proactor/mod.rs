//! Completion-style I/O driver.
//!
//! Callers submit an operation together with a completion callback; a
//! dedicated thread performs it on readiness and invokes the callback
//! exactly once with the outcome. Readiness comes from one edge-triggered
//! epoll instance. Every operation is attempted at submit time and again on
//! each readiness edge until it stops returning `WouldBlock`.
//!
//! ```text
//!   submit()/cancel() ──► SegQueue ──► eventfd ──► driver thread
//!                                                    │ epoll_wait
//!                                                    ▼
//!                                   try_op ──► completion callback
//! ```
//!
//! `cancel` completes every pending operation on the handle with
//! `ECANCELED`, unregisters the fd, and makes later submissions on the same
//! handle complete cancelled immediately. Completion callbacks run on the
//! driver thread and must not block.
//!
//! Each pass applies only the submissions queued when it began, so a
//! callback that keeps resubmitting cannot keep the driver from polling.

mod op;
mod waker;

pub use op::is_cancelled;
pub(crate) use op::{Completion, IoHandle, Op};

use op::CompletionFn;
use waker::EventFdWaker;

use crossbeam_queue::SegQueue;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use mudnet_runtime::config::defaults;

const WAKER_TOKEN: u64 = u64::MAX;

const INTEREST: u32 = (libc::EPOLLIN | libc::EPOLLOUT | libc::EPOLLRDHUP | libc::EPOLLET) as u32;

static GLOBAL: OnceLock<Proactor> = OnceLock::new();

enum Submission {
    Op {
        handle: Arc<IoHandle>,
        op: Op,
        done: CompletionFn,
    },
    Cancel(Arc<IoHandle>),
}

struct Shared {
    epfd: OwnedFd,
    waker: EventFdWaker,
    queue: SegQueue<Submission>,
    shutdown: AtomicBool,
    outstanding: AtomicUsize,
}

struct Driver {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

/// Handle to a completion driver thread. Clones share the thread; it shuts
/// down when the last clone is dropped.
#[derive(Clone)]
pub struct Proactor {
    driver: Arc<Driver>,
}

impl Proactor {
    pub fn new() -> io::Result<Self> {
        Self::with_events(defaults::PROACTOR_EVENTS)
    }

    /// `events` bounds how many readiness events one `epoll_wait` returns.
    pub fn with_events(events: usize) -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_create1 just returned this descriptor.
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        let waker = EventFdWaker::create()?;
        epoll_add(epfd.as_raw_fd(), waker.fd(), libc::EPOLLIN as u32, WAKER_TOKEN)?;

        let shared = Arc::new(Shared {
            epfd,
            waker,
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
        });
        let thread_shared = Arc::clone(&shared);
        let batch = events.max(1);
        let thread = thread::Builder::new()
            .name("mud-proactor".into())
            .spawn(move || drive(thread_shared, batch))?;
        let thread_id = thread.thread().id();
        log::debug!("proactor started (batch {})", batch);

        Ok(Self {
            driver: Arc::new(Driver {
                shared,
                thread: Mutex::new(Some(thread)),
                thread_id,
            }),
        })
    }

    /// Process-wide driver used when no explicit proactor is supplied.
    pub fn global() -> io::Result<Proactor> {
        if let Some(p) = GLOBAL.get() {
            return Ok(p.clone());
        }
        let fresh = Proactor::new()?;
        Ok(GLOBAL.get_or_init(move || fresh).clone())
    }

    /// Operations submitted and not yet completed.
    pub fn outstanding(&self) -> usize {
        self.driver.shared.outstanding.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.driver.shared.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn submit<F>(&self, handle: &Arc<IoHandle>, op: Op, done: F)
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let shared = &self.driver.shared;
        if shared.shutdown.load(Ordering::Acquire) {
            done(op::cancel(op));
            return;
        }
        shared.outstanding.fetch_add(1, Ordering::Relaxed);
        shared.queue.push(Submission::Op {
            handle: Arc::clone(handle),
            op,
            done: Box::new(done),
        });
        shared.wake();
    }

    /// Cancel everything pending on `handle`. Idempotent.
    pub(crate) fn cancel(&self, handle: &Arc<IoHandle>) {
        handle.mark_cancelled();
        let shared = &self.driver.shared;
        shared.queue.push(Submission::Cancel(Arc::clone(handle)));
        shared.wake();
    }
}

impl Shared {
    fn wake(&self) {
        if let Err(e) = self.waker.notify() {
            log::error!("proactor wake failed: {}", e);
        }
    }

    fn complete(&self, done: CompletionFn, completion: Completion) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        done(completion);
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake();
        let thread = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(thread) = thread {
            // The last handle can be dropped inside a completion callback.
            if thread::current().id() != self.thread_id {
                let _ = thread.join();
            }
        }
    }
}

impl fmt::Debug for Proactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proactor")
            .field("outstanding", &self.outstanding())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn epoll_add(epfd: RawFd, fd: RawFd, events: u32, token: u64) -> io::Result<()> {
    let mut ev = libc::epoll_event { events, u64: token };
    if unsafe { libc::epoll_ctl(epfd, libc::EPOLL_CTL_ADD, fd, &mut ev) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn epoll_del(epfd: RawFd, fd: RawFd) {
    let mut ev = libc::epoll_event { events: 0, u64: 0 };
    unsafe {
        libc::epoll_ctl(epfd, libc::EPOLL_CTL_DEL, fd, &mut ev);
    }
}

struct Pending {
    op: Op,
    done: CompletionFn,
}

struct Registration {
    handle: Arc<IoHandle>,
    reads: VecDeque<Pending>,
    writes: VecDeque<Pending>,
}

type Registry = HashMap<RawFd, Registration>;

fn drive(shared: Arc<Shared>, batch: usize) {
    let mut registry: Registry = HashMap::new();
    let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; batch];
    let epfd = shared.epfd.as_raw_fd();

    loop {
        for _ in 0..shared.queue.len() {
            let Some(sub) = shared.queue.pop() else {
                break;
            };
            apply(&shared, &mut registry, sub);
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let wait_ms = if shared.queue.is_empty() { -1 } else { 0 };
        let n = unsafe {
            libc::epoll_wait(epfd, events.as_mut_ptr(), batch as libc::c_int, wait_ms)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log::error!("epoll_wait failed: {}", err);
            break;
        }

        for ev in &events[..n as usize] {
            let token = ev.u64;
            let flags = ev.events;
            if token == WAKER_TOKEN {
                shared.waker.drain();
                continue;
            }
            let Some(reg) = registry.get_mut(&(token as RawFd)) else {
                continue;
            };
            let broken = flags & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0;
            if broken || flags & (libc::EPOLLIN | libc::EPOLLRDHUP) as u32 != 0 {
                progress(&shared, &reg.handle, &mut reg.reads);
            }
            if broken || flags & libc::EPOLLOUT as u32 != 0 {
                progress(&shared, &reg.handle, &mut reg.writes);
            }
        }
    }

    // Shutdown: nothing may be left without its completion.
    shared.shutdown.store(true, Ordering::Release);
    while let Some(sub) = shared.queue.pop() {
        if let Submission::Op { op, done, .. } = sub {
            shared.complete(done, op::cancel(op));
        }
    }
    for (fd, reg) in registry.drain() {
        epoll_del(epfd, fd);
        for pending in reg.reads.into_iter().chain(reg.writes) {
            shared.complete(pending.done, op::cancel(pending.op));
        }
    }
    log::debug!("proactor stopped");
}

fn apply(shared: &Shared, registry: &mut Registry, sub: Submission) {
    let epfd = shared.epfd.as_raw_fd();
    match sub {
        Submission::Op { handle, op, done } => {
            if handle.is_cancelled() {
                shared.complete(done, op::cancel(op));
                return;
            }
            let fd = handle.fd();
            let reg = match registry.entry(fd) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => {
                    if let Err(err) = epoll_add(epfd, fd, INTEREST, fd as u64) {
                        shared.complete(done, op::fail(op, err));
                        return;
                    }
                    v.insert(Registration {
                        handle,
                        reads: VecDeque::new(),
                        writes: VecDeque::new(),
                    })
                }
            };
            let Registration { handle, reads, writes } = reg;
            let queue = if op.is_write() { writes } else { reads };
            queue.push_back(Pending { op, done });
            progress(shared, handle, queue);
        }
        Submission::Cancel(handle) => {
            let fd = handle.fd();
            let owned = registry
                .get(&fd)
                .is_some_and(|reg| Arc::ptr_eq(&reg.handle, &handle));
            if !owned {
                return;
            }
            if let Some(reg) = registry.remove(&fd) {
                epoll_del(epfd, fd);
                for pending in reg.reads.into_iter().chain(reg.writes) {
                    shared.complete(pending.done, op::cancel(pending.op));
                }
            }
        }
    }
}

/// Run queued operations in order until one would block.
fn progress(shared: &Shared, handle: &IoHandle, queue: &mut VecDeque<Pending>) {
    while let Some(Pending { op, done }) = queue.pop_front() {
        match op::try_op(handle, op) {
            Ok(completion) => shared.complete(done, completion),
            Err(op) => {
                queue.push_front(Pending { op, done });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::io::Write;
    use std::net::{SocketAddr, TcpStream};
    use std::sync::mpsc;
    use std::time::Duration;

    fn listener() -> (Arc<IoHandle>, SocketAddr) {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
        socket.set_nonblocking(true).unwrap();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        socket.bind(&addr.into()).unwrap();
        socket.listen(16).unwrap();
        let local = socket.local_addr().unwrap().as_socket().unwrap();
        (IoHandle::new(socket), local)
    }

    #[test]
    fn test_accept_then_recv() {
        let proactor = Proactor::new().unwrap();
        let (lst, addr) = listener();

        let (tx, rx) = mpsc::channel();
        proactor.submit(&lst, Op::Accept, move |c| {
            if let Completion::Accept(result) = c {
                tx.send(result.map(|(s, _)| s)).unwrap();
            }
        });

        let mut client = TcpStream::connect(addr).unwrap();
        let peer = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        peer.set_nonblocking(true).unwrap();
        let peer = IoHandle::new(peer);

        let (tx, rx) = mpsc::channel();
        proactor.submit(&peer, Op::Recv(vec![0u8; 64].into_boxed_slice()), move |c| {
            if let Completion::Recv { buf, result } = c {
                let n = result.unwrap();
                tx.send(buf[..n].to_vec()).unwrap();
            }
        });
        client.write_all(b"ping").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), b"ping");
        assert_eq!(proactor.outstanding(), 0);
    }

    #[test]
    fn test_cancel_completes_pending() {
        let proactor = Proactor::new().unwrap();
        let (lst, _) = listener();

        let (tx, rx) = mpsc::channel();
        for _ in 0..3 {
            let tx = tx.clone();
            proactor.submit(&lst, Op::Accept, move |c| {
                if let Completion::Accept(Err(e)) = c {
                    tx.send(is_cancelled(&e)).unwrap();
                }
            });
        }
        proactor.cancel(&lst);
        for _ in 0..3 {
            assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }

        // Submissions after cancel complete cancelled too.
        proactor.submit(&lst, Op::Accept, move |c| {
            if let Completion::Accept(Err(e)) = c {
                tx.send(is_cancelled(&e)).unwrap();
            }
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    fn connected_pair() -> (TcpStream, Arc<IoHandle>) {
        let lst = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(lst.local_addr().unwrap()).unwrap();
        let (server, _) = lst.accept().unwrap();
        let server = Socket::from(server);
        server.set_nonblocking(true).unwrap();
        (client, IoHandle::new(server))
    }

    /// Receive on a peer-closed socket and resubmit from the callback until
    /// told to stop. Every attempt completes at once with EOF.
    fn resubmit_forever(
        p: Proactor,
        h: Arc<IoHandle>,
        stop: Arc<AtomicBool>,
        n: Arc<AtomicUsize>,
    ) {
        let again = p.clone();
        let handle = Arc::clone(&h);
        p.submit(&h, Op::Recv(vec![0u8; 16].into_boxed_slice()), move |_| {
            n.fetch_add(1, Ordering::Relaxed);
            if !stop.load(Ordering::Relaxed) {
                resubmit_forever(again, handle, stop, n);
            }
        });
    }

    #[test]
    fn test_resubmitting_callback_does_not_starve_others() {
        let proactor = Proactor::new().unwrap();
        let (closed, eof) = connected_pair();
        drop(closed);
        let stop = Arc::new(AtomicBool::new(false));
        let spins = Arc::new(AtomicUsize::new(0));
        resubmit_forever(proactor.clone(), eof, Arc::clone(&stop), Arc::clone(&spins));

        let (mut client, peer) = connected_pair();
        let (tx, rx) = mpsc::channel();
        proactor.submit(&peer, Op::Recv(vec![0u8; 64].into_boxed_slice()), move |c| {
            if let Completion::Recv { buf, result } = c {
                let n = result.unwrap();
                tx.send(buf[..n].to_vec()).unwrap();
            }
        });
        client.write_all(b"ping").unwrap();

        let got = rx.recv_timeout(Duration::from_secs(5));
        stop.store(true, Ordering::Relaxed);
        assert_eq!(got.unwrap(), b"ping");
        assert!(spins.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_drop_cancels_outstanding() {
        let proactor = Proactor::new().unwrap();
        let (lst, _) = listener();
        let (tx, rx) = mpsc::channel();
        proactor.submit(&lst, Op::Accept, move |c| {
            if let Completion::Accept(Err(e)) = c {
                tx.send(is_cancelled(&e)).unwrap();
            }
        });
        drop(proactor);
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}
