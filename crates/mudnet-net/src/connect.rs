//! Outbound connections.
//!
//! `Session::connect` resolves the configured host (off the loop thread,
//! preferring IPv4), starts a nonblocking connect and, when a timeout is
//! given, arms a one-shot timer on the loop. Whichever of success, failure
//! or timeout happens first settles the attempt; the others are ignored.
//! The loop is retained until the attempt settles.

use std::future::Future;
use std::net::{IpAddr, Shutdown, SocketAddr, ToSocketAddrs};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::oneshot;

use mudnet_core::BlockingPool;
use mudnet_runtime::{Loop, Timer};

use crate::error::NetError;
use crate::proactor::{is_cancelled, Completion, IoHandle, Op, Proactor};
use crate::request::Request;
use crate::session::Session;
use crate::settings::Settings;
use crate::socket;

type Outcome<R> = Result<Session<R>, NetError>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Resolves to the started session, or to why it could not be created.
#[must_use = "dropping the future closes the session it would yield"]
pub struct ConnectFuture<R: Request> {
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R: Request> ConnectFuture<R> {
    /// Non-blocking check, for callers driving the loop themselves.
    pub fn try_take(&mut self) -> Option<Outcome<R>> {
        match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Some(Err(NetError::Abandoned)),
        }
    }
}

impl<R: Request> Future for ConnectFuture<R> {
    type Output = Outcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(NetError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R: Request> Session<R> {
    /// Connect to `settings.config.ip:port` on the process-wide proactor.
    /// A zero `timeout` waits indefinitely.
    pub fn connect(
        lp: &Loop,
        settings: impl Into<Arc<Settings<R>>>,
        timeout: Duration,
    ) -> ConnectFuture<R> {
        connect(lp, None, settings.into(), timeout)
    }

    pub fn connect_with(
        lp: &Loop,
        proactor: &Proactor,
        settings: impl Into<Arc<Settings<R>>>,
        timeout: Duration,
    ) -> ConnectFuture<R> {
        connect(lp, Some(proactor.clone()), settings.into(), timeout)
    }
}

fn connect<R: Request>(
    lp: &Loop,
    proactor: Option<Proactor>,
    settings: Arc<Settings<R>>,
    timeout: Duration,
) -> ConnectFuture<R> {
    let (tx, rx) = oneshot::channel();
    let future = ConnectFuture { rx };

    let prepared = settings
        .config
        .validate()
        .map_err(NetError::from)
        .and_then(|()| match proactor {
            Some(p) => Ok(p),
            None => Proactor::global().map_err(NetError::from),
        });
    let proactor = match prepared {
        Ok(p) => p,
        Err(e) => {
            let _ = tx.send(Err(e));
            return future;
        }
    };

    lp.retain();
    let host = settings.config.ip.clone();
    let port = settings.config.port;
    let attempt = Arc::new(Attempt {
        event_loop: lp.clone(),
        proactor,
        settings,
        timeout,
        settled: AtomicBool::new(false),
        tx: Mutex::new(Some(tx)),
        io: Mutex::new(None),
        timer: Mutex::new(None),
    });

    match host.parse::<IpAddr>() {
        Ok(ip) => attempt.begin(SocketAddr::new(ip, port)),
        Err(_) => {
            let resolver = Arc::clone(&attempt);
            let spawned = BlockingPool::global().and_then(|pool| {
                pool.spawn(move || match resolve(&host, port) {
                    Ok(addr) => resolver.begin(addr),
                    Err(e) => resolver.fail(e),
                })
            });
            if let Err(e) = spawned {
                attempt.fail(NetError::Pool(e));
            }
        }
    }
    future
}

/// First IPv4 address for `host`, else the first address of any family.
pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetError> {
    let host = if host.is_empty() { "localhost" } else { host };
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| NetError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| NetError::NoAddress(host.to_string()))
}

struct Attempt<R: Request> {
    event_loop: Loop,
    proactor: Proactor,
    settings: Arc<Settings<R>>,
    timeout: Duration,
    settled: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Outcome<R>>>>,
    io: Mutex<Option<Arc<IoHandle>>>,
    timer: Mutex<Option<Timer>>,
}

impl<R: Request> Attempt<R> {
    /// True for the single caller allowed to finish the attempt.
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    fn begin(self: &Arc<Self>, addr: SocketAddr) {
        let socket = match socket::connect_socket(addr) {
            Ok(s) => s,
            Err(e) => return self.fail(NetError::Io(e)),
        };
        let io = IoHandle::new(socket);
        *lock(&self.io) = Some(Arc::clone(&io));
        log::debug!("connecting to {}", addr);

        if !self.timeout.is_zero() {
            let me = Arc::clone(self);
            self.event_loop.execute(move || me.arm_timer());
        }
        let me = Arc::clone(self);
        self.proactor
            .submit(&io, Op::Connect, move |c| me.on_connect(c));
    }

    /// Loop thread.
    fn arm_timer(self: &Arc<Self>) {
        if self.settled.load(Ordering::Acquire) {
            return;
        }
        let me = Arc::clone(self);
        let timer = Timer::with_callback(self.timeout, false, move |_: &Timer| me.expire());
        match timer.start(&self.event_loop) {
            Ok(()) => *lock(&self.timer) = Some(timer),
            Err(e) => log::warn!("connect timer not armed: {}", e),
        }
    }

    fn disarm(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            let _ = timer.stop();
        }
    }

    /// Loop thread, from the timer.
    fn expire(self: &Arc<Self>) {
        // Breaks the timer -> attempt -> timer cycle.
        lock(&self.timer).take();
        if !self.settle() {
            return;
        }
        if let Some(io) = lock(&self.io).take() {
            let _ = io.socket().shutdown(Shutdown::Both);
            self.proactor.cancel(&io);
        }
        log::debug!("connect timed out after {:?}", self.timeout);
        self.finish(Err(NetError::Timeout(self.timeout)));
    }

    /// Proactor thread.
    fn on_connect(self: &Arc<Self>, completion: Completion) {
        let Completion::Connect(result) = completion else {
            return;
        };
        match result {
            Ok(()) => {
                if !self.settle() {
                    return;
                }
                let me = Arc::clone(self);
                self.event_loop.execute(move || me.establish());
            }
            Err(e) if is_cancelled(&e) => self.fail(NetError::Cancelled),
            Err(e) => self.fail(NetError::Io(e)),
        }
    }

    /// Any thread.
    fn fail(self: &Arc<Self>, err: NetError) {
        if !self.settle() {
            return;
        }
        if let Some(io) = lock(&self.io).take() {
            self.proactor.cancel(&io);
        }
        let me = Arc::clone(self);
        self.event_loop.execute(move || {
            me.disarm();
            me.finish(Err(err));
        });
    }

    /// Loop thread, after a successful connect.
    fn establish(self: &Arc<Self>) {
        self.disarm();
        let outcome = match lock(&self.io).take() {
            None => Err(NetError::Cancelled),
            Some(io) => {
                match Session::from_handle(
                    &self.event_loop,
                    &self.proactor,
                    Arc::clone(&self.settings),
                    Arc::clone(&io),
                ) {
                    Ok(session) if session.start() => Ok(session),
                    Ok(_) => Err(NetError::Cancelled),
                    Err(e) => {
                        self.proactor.cancel(&io);
                        Err(NetError::Io(e))
                    }
                }
            }
        };
        self.finish(outcome);
    }

    /// Deliver the outcome and drop the loop reference. Runs once.
    fn finish(&self, outcome: Outcome<R>) {
        match lock(&self.tx).take() {
            Some(tx) => {
                if let Err(Ok(session)) = tx.send(outcome) {
                    // Nobody is waiting for it.
                    session.close();
                }
            }
            None => {
                if let Ok(session) = outcome {
                    session.close();
                }
            }
        }
        self.event_loop.release();
    }
}
