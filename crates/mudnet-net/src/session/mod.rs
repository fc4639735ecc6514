//! TCP sessions.
//!
//! A session owns one connected socket. Receives are always outstanding
//! while it is open: each completion is fed to the incremental [`Request`]
//! consumer and the next receive is posted. Writes are copied into pooled
//! send buffers and go out as vectored sends, one batch at a time.
//!
//! Lifecycle bits (see [`state`]) decide who wins `start`, who may submit a
//! send, and who performs the single close. The owning loop is retained
//! from `start` until the close callback has run, so `Loop::run` keeps
//! going while sessions are open.
//!
//! With an idle timeout configured, a repeating timer checks the time of
//! the last activity (connect, received or sent bytes, write). When it fires
//! early it re-arms for exactly the remaining time.

pub(crate) mod outbox;
pub mod state;

use outbox::Outbox;
use state::{SessionState, CLOSED, INIT, SENDING};

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use mudnet_runtime::{Loop, Timer};

use crate::error::NetError;
use crate::proactor::{is_cancelled, Completion, IoHandle, Op, Proactor};
use crate::request::{self, Request};
use crate::settings::Settings;
use crate::socket;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cloneable handle; clones refer to the same connection.
///
/// A started session keeps itself alive through its outstanding receive, so
/// dropping every handle does not close it; it lives until `close`, peer
/// EOF, a disconnect error or the idle timeout. Only a session that was
/// never started is closed by dropping its last handle.
pub struct Session<R: Request> {
    inner: Arc<SessionInner<R>>,
}

pub(crate) struct SessionInner<R: Request> {
    id: u64,
    event_loop: Loop,
    proactor: Proactor,
    settings: Arc<Settings<R>>,
    io: Mutex<Option<Arc<IoHandle>>>,
    remote: SocketAddr,
    local: SocketAddr,
    state: SessionState,
    alive_us: AtomicU64,
    idle: Option<Timer>,
    outbox: Mutex<Outbox>,
    request: Mutex<Option<R>>,
}

#[derive(Clone, Copy)]
enum Direction {
    Read,
    Write,
}

impl<R: Request> Session<R> {
    /// Wrap a connected socket. The session does nothing until `start`.
    pub(crate) fn from_handle(
        lp: &Loop,
        proactor: &Proactor,
        settings: Arc<Settings<R>>,
        io: Arc<IoHandle>,
    ) -> io::Result<Self> {
        let (remote, local) = socket::peer_and_local(io.socket())?;
        let config = &settings.config;
        let outbox = Outbox::new(config.buffer_size, config.sum_sending, config.send_vector);
        let timeout = config.timeout;

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner<R>>| {
            let idle = timeout.map(|t| {
                let weak = weak.clone();
                Timer::with_callback(t, true, move |timer: &Timer| match weak.upgrade() {
                    Some(session) => session.check_idle(timer),
                    None => {
                        let _ = timer.stop();
                    }
                })
            });
            SessionInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                event_loop: lp.clone(),
                proactor: proactor.clone(),
                settings,
                io: Mutex::new(Some(io)),
                remote,
                local,
                state: SessionState::new(),
                alive_us: AtomicU64::new(0),
                idle,
                outbox: Mutex::new(outbox),
                request: Mutex::new(None),
            }
        });
        Ok(Self { inner })
    }

    /// Loop thread. Arms the idle timer and posts the first receive.
    /// False when the session was already started or closed.
    pub(crate) fn start(&self) -> bool {
        let inner = &self.inner;
        inner.event_loop.retain();
        if !inner.state.try_add(INIT, INIT | CLOSED) {
            inner.event_loop.release();
            return false;
        }
        inner.touch();
        if let Some(timer) = &inner.idle {
            if let Err(e) = timer.start(&inner.event_loop) {
                log::warn!("session {}: idle timer not armed: {}", inner.id, e);
            }
        }
        inner.post_receive();
        log::debug!("session {} started ({} -> {})", inner.id, inner.local, inner.remote);
        true
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Started and not closed.
    pub fn connected(&self) -> bool {
        let bits = self.inner.state.bits();
        bits & INIT != 0 && bits & CLOSED == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    pub fn remote(&self) -> SocketAddr {
        self.inner.remote
    }

    pub fn local(&self) -> SocketAddr {
        self.inner.local
    }

    pub fn event_loop(&self) -> &Loop {
        &self.inner.event_loop
    }

    pub fn settings(&self) -> &Arc<Settings<R>> {
        &self.inner.settings
    }

    /// Bytes queued or in flight, with full and in-flight buffers counted
    /// at the buffer size.
    pub fn queued_bytes(&self) -> usize {
        lock(&self.inner.outbox).charged()
    }

    /// Queue `bytes`. False, with nothing queued, when the session is closed
    /// or the send budget would be exceeded.
    ///
    /// Every buffer that fills is sent immediately, so bytes can reach the
    /// peer before `flush` is called. Only the trailing partial buffer waits
    /// for more bytes or `flush`.
    pub fn write(&self, bytes: &[u8]) -> bool {
        self.write_parts(&[bytes])
    }

    /// Queue several slices as one all-or-nothing write.
    pub fn write_parts(&self, parts: &[&[u8]]) -> bool {
        let inner = &self.inner;
        if inner.state.is_closed() {
            return false;
        }
        let total: usize = parts.iter().map(|p| p.len()).sum();
        if total == 0 {
            return true;
        }
        let full = {
            let mut outbox = lock(&inner.outbox);
            if !outbox.fits(total) {
                return false;
            }
            for part in parts {
                outbox.push(part, inner.settings.buffers);
            }
            outbox.has_ready()
        };
        inner.touch();
        if full {
            inner.pump();
        }
        true
    }

    pub fn write_byte(&self, byte: u8) -> bool {
        self.write(&[byte])
    }

    /// Queue `len` bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for the duration of the
    /// call.
    pub unsafe fn write_from_raw(&self, ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        self.write(std::slice::from_raw_parts(ptr, len))
    }

    /// Send everything queued, including a partially filled buffer.
    pub fn flush(&self) -> bool {
        let inner = &self.inner;
        if inner.state.is_closed() {
            return false;
        }
        lock(&inner.outbox).flush();
        inner.pump();
        true
    }

    /// Close once. Later calls, from any thread, return false.
    pub fn close(&self) -> bool {
        self.inner.close()
    }

    pub fn nodelay(&self) -> io::Result<bool> {
        self.inner.io()?.socket().nodelay()
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.io()?.socket().set_nodelay(nodelay)
    }

    pub fn ttl(&self) -> io::Result<u32> {
        self.inner.io()?.socket().ttl()
    }

    pub fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.inner.io()?.socket().set_ttl(ttl)
    }
}

impl<R: Request> SessionInner<R> {
    fn handle(self: &Arc<Self>) -> Session<R> {
        Session {
            inner: Arc::clone(self),
        }
    }

    fn io(&self) -> io::Result<Arc<IoHandle>> {
        lock(&self.io)
            .clone()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn touch(&self) {
        let now = self.event_loop.now().as_micros() as u64;
        self.alive_us.fetch_max(now, Ordering::AcqRel);
    }

    fn release_buffers(&self, bufs: impl IntoIterator<Item = Box<[u8]>>) {
        for buf in bufs {
            self.settings.buffers.release(buf);
        }
    }

    fn raise(self: &Arc<Self>, err: NetError) {
        let me = Arc::clone(self);
        self.event_loop
            .execute(move || me.settings.raise(Some(&me.handle()), &err));
    }

    fn recycle(&self, mut request: R) {
        request.reset();
        self.settings.requests.release(request);
    }

    fn close(self: &Arc<Self>) -> bool {
        let Some(prev) = self.state.close() else {
            return false;
        };
        if let Some(io) = lock(&self.io).take() {
            let _ = io.socket().shutdown(Shutdown::Both);
            self.proactor.cancel(&io);
        }
        let queued = lock(&self.outbox).clear();
        self.release_buffers(queued);
        log::debug!("session {} closing", self.id);

        let me = Arc::clone(self);
        self.event_loop.execute(move || {
            if let Some(timer) = &me.idle {
                if let Err(e) = timer.stop() {
                    log::warn!("session {}: idle timer stop failed: {}", me.id, e);
                }
            }
            if let Some(request) = lock(&me.request).take() {
                me.recycle(request);
            }
            if let Some(f) = &me.settings.on_close {
                f(&me.handle());
            }
            if prev & INIT != 0 {
                me.event_loop.release();
            }
        });
        true
    }

    fn check_idle(self: &Arc<Self>, timer: &Timer) {
        let Some(timeout) = self.settings.config.timeout else {
            return;
        };
        if self.state.is_closed() {
            let _ = timer.stop();
            return;
        }
        let alive = Duration::from_micros(self.alive_us.load(Ordering::Acquire));
        let idle = self.event_loop.now().saturating_sub(alive);
        if idle >= timeout {
            log::debug!("session {} idle for {:?}, closing", self.id, idle);
            self.close();
            return;
        }
        // Fire again exactly when the timeout would elapse.
        let _ = timer.stop();
        timer.set_interval(timeout - idle);
        if let Err(e) = timer.start(&self.event_loop) {
            log::warn!("session {}: idle timer re-arm failed: {}", self.id, e);
        }
    }

    fn post_receive(self: &Arc<Self>) {
        if self.state.is_closed() {
            return;
        }
        let Ok(io) = self.io() else {
            return;
        };
        let buf = self.settings.buffers.acquire(self.settings.config.buffer_size);
        let me = Arc::clone(self);
        self.proactor
            .submit(&io, Op::Recv(buf), move |c| me.on_receive(c));
    }

    fn on_receive(self: &Arc<Self>, completion: Completion) {
        let Completion::Recv { buf, result } = completion else {
            return;
        };
        match result {
            Ok(0) => {
                self.settings.buffers.release(buf);
                self.close();
            }
            Ok(n) => {
                self.touch();
                let parsed = self.feed(&buf[..n]);
                self.settings.buffers.release(buf);
                if let Err(e) = parsed {
                    self.raise(NetError::Request(e));
                    self.close();
                    return;
                }
                self.progress(Direction::Read, n);
                self.post_receive();
            }
            Err(e) => {
                self.settings.buffers.release(buf);
                if is_cancelled(&e) || socket::is_disconnect(&e) {
                    self.close();
                } else {
                    self.raise(NetError::Io(e));
                    self.post_receive();
                }
            }
        }
    }

    fn feed(self: &Arc<Self>, bytes: &[u8]) -> Result<(), crate::error::RequestError> {
        let mut slot = lock(&self.request);
        request::feed(&mut slot, &self.settings.requests, bytes, |req| {
            self.dispatch(req)
        })?;
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, req: R) {
        let me = Arc::clone(self);
        self.event_loop.execute(move || {
            if let Some(f) = &me.settings.on_request {
                f(&me.handle(), &req);
            }
            me.recycle(req);
        });
    }

    fn progress(self: &Arc<Self>, direction: Direction, n: usize) {
        let f = match direction {
            Direction::Read => self.settings.on_read.clone(),
            Direction::Write => self.settings.on_write.clone(),
        };
        if let Some(f) = f {
            let me = Arc::clone(self);
            self.event_loop.execute(move || f(&me.handle(), n));
        }
    }

    /// Submit the next batch unless a send is already in flight.
    fn pump(self: &Arc<Self>) {
        loop {
            if !self.state.try_add(SENDING, SENDING | CLOSED) {
                return;
            }
            let batch = lock(&self.outbox).take_batch();
            if let Some(segments) = batch {
                match self.io() {
                    Ok(io) => {
                        let me = Arc::clone(self);
                        self.proactor
                            .submit(&io, Op::Send(segments), move |c| me.on_sent(c));
                    }
                    Err(_) => {
                        let freed = lock(&self.outbox).finish(segments, 0, false);
                        self.release_buffers(freed);
                        self.state.remove(SENDING);
                    }
                }
                return;
            }
            self.state.remove(SENDING);
            // A writer may have queued between take_batch and remove.
            if !lock(&self.outbox).has_ready() {
                return;
            }
        }
    }

    fn on_sent(self: &Arc<Self>, completion: Completion) {
        let Completion::Send { segments, result } = completion else {
            return;
        };
        match result {
            Ok(n) => {
                let requeue = !self.state.is_closed();
                let freed = lock(&self.outbox).finish(segments, n, requeue);
                self.release_buffers(freed);
                self.touch();
                self.progress(Direction::Write, n);
                self.state.remove(SENDING);
                self.pump();
            }
            Err(e) if is_cancelled(&e) || socket::is_disconnect(&e) => {
                let freed = lock(&self.outbox).finish(segments, 0, false);
                self.release_buffers(freed);
                self.state.remove(SENDING);
                self.close();
            }
            Err(e) => {
                // Keep the batch queued; the next write or flush retries it.
                let requeue = !self.state.is_closed();
                let freed = lock(&self.outbox).finish(segments, 0, requeue);
                self.release_buffers(freed);
                self.state.remove(SENDING);
                self.raise(NetError::Io(e));
            }
        }
    }
}

impl<R: Request> Drop for SessionInner<R> {
    fn drop(&mut self) {
        let Some(prev) = self.state.close() else {
            return;
        };
        // Dropped without close: nothing else will release the socket.
        if let Some(io) = self.io.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = io.socket().shutdown(Shutdown::Both);
            self.proactor.cancel(&io);
        }
        let queued = self.outbox.get_mut().unwrap_or_else(|e| e.into_inner()).clear();
        for buf in queued {
            self.settings.buffers.release(buf);
        }
        if prev & INIT != 0 {
            self.event_loop.release();
        }
    }
}

impl<R: Request> Clone for Session<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Request> PartialEq for Session<R> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<R: Request> Eq for Session<R> {}

impl<R: Request> fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("remote", &self.inner.remote)
            .field("local", &self.inner.local)
            .field("state", &self.inner.state.bits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetConfig;
    use crate::request::NulTerminated;
    use mudnet_runtime::LoopConfig;
    use socket2::Socket;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct Fixture {
        lp: Loop,
        session: Session<NulTerminated>,
        peer: TcpStream,
        errors: Arc<AtomicUsize>,
        requests: Arc<AtomicUsize>,
    }

    fn started(config: NetConfig) -> Fixture {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let proactor = Proactor::new().unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));
        let (e, r) = (Arc::clone(&errors), Arc::clone(&requests));
        let settings = Settings::<NulTerminated>::new(config)
            .on_exception(move |_, _| {
                e.fetch_add(1, Ordering::SeqCst);
            })
            .on_request(move |_, _| {
                r.fetch_add(1, Ordering::SeqCst);
            });

        let lst = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = TcpStream::connect(lst.local_addr().unwrap()).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let (server, _) = lst.accept().unwrap();
        let server = Socket::from(server);
        socket::prepare_accepted(&server).unwrap();

        let session =
            Session::from_handle(&lp, &proactor, Arc::new(settings), IoHandle::new(server)).unwrap();
        assert!(session.start());
        Fixture { lp, session, peer, errors, requests }
    }

    fn pump_until(lp: &Loop, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            lp.update().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_send_error_requeues_and_stays_open() {
        let fx = started(NetConfig::new().buffer_size(64).sum_sending(4));
        assert!(fx.session.write(b"hello"));

        let inner = &fx.session.inner;
        let segments = {
            let mut outbox = lock(&inner.outbox);
            assert!(outbox.flush());
            outbox.take_batch().unwrap()
        };
        assert!(inner.state.try_add(SENDING, SENDING | CLOSED));
        inner.on_sent(Completion::Send {
            segments,
            result: Err(io::Error::from_raw_os_error(libc::ETIMEDOUT)),
        });

        pump_until(&fx.lp, || fx.errors.load(Ordering::SeqCst) == 1);
        assert!(fx.session.connected());
        assert!(!inner.state.contains(SENDING));
        assert_eq!(fx.session.queued_bytes(), 64);

        // The requeued bytes go out on the next flush.
        assert!(fx.session.flush());
        let mut got = [0u8; 5];
        let mut peer = &fx.peer;
        peer.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"hello");
    }

    #[test]
    fn test_disconnect_on_send_closes() {
        let fx = started(NetConfig::new().buffer_size(64));
        assert!(fx.session.write(b"bye"));
        let inner = &fx.session.inner;
        let segments = {
            let mut outbox = lock(&inner.outbox);
            outbox.flush();
            outbox.take_batch().unwrap()
        };
        assert!(inner.state.try_add(SENDING, SENDING | CLOSED));
        inner.on_sent(Completion::Send {
            segments,
            result: Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        });
        assert!(fx.session.is_closed());
        assert_eq!(fx.session.queued_bytes(), 0);
        fx.lp.update().unwrap();
        assert_eq!(fx.errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_receive_error_keeps_session_open() {
        let fx = started(NetConfig::new());
        fx.session.inner.on_receive(Completion::Recv {
            buf: vec![0u8; 16].into_boxed_slice(),
            result: Err(io::Error::from_raw_os_error(libc::EIO)),
        });

        pump_until(&fx.lp, || fx.errors.load(Ordering::SeqCst) == 1);
        assert!(fx.session.connected());

        let mut peer = &fx.peer;
        peer.write_all(b"still here\0").unwrap();
        pump_until(&fx.lp, || fx.requests.load(Ordering::SeqCst) == 1);
        assert!(fx.session.connected());
    }
}
