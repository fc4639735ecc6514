//! TCP listener with a fixed pool of outstanding accepts.
//!
//! A started listener keeps exactly `min(backlog, SOMAXCONN)` accept
//! operations posted. Each successful completion re-posts on the same slot
//! before the accepted connection is handed to the loop, so the pool never
//! shrinks while the listener runs. A failed accept (EMFILE and friends) is
//! reported on the loop and its slot retries from a one-shot loop timer
//! after `accept_backoff`. `stop` cancels the pool; completions from a
//! previous start are recognised by generation and dropped.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use socket2::Socket;

use mudnet_runtime::{Loop, Timer};

use crate::error::NetError;
use crate::proactor::{is_cancelled, Completion, IoHandle, Op, Proactor};
use crate::request::Request;
use crate::session::Session;
use crate::settings::Settings;
use crate::socket;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Generation a slot is armed for; 0 when idle.
struct AcceptSlot {
    armed: AtomicU64,
}

/// Cloneable handle. Dropping the last handle stops the listener.
pub struct Listener<R: Request> {
    inner: Arc<ListenerInner<R>>,
}

struct ListenerInner<R: Request> {
    event_loop: Loop,
    settings: Arc<Settings<R>>,
    proactor: Mutex<Option<Proactor>>,
    io: Mutex<Option<Arc<IoHandle>>>,
    local: Mutex<Option<SocketAddr>>,
    started: AtomicBool,
    generation: AtomicU64,
    slots: Box<[AcceptSlot]>,
}

impl<R: Request> Listener<R> {
    /// Listener on the process-wide proactor.
    pub fn new(lp: &Loop, settings: impl Into<Arc<Settings<R>>>) -> Self {
        Self::build(lp, settings.into(), None)
    }

    pub fn with_proactor(
        lp: &Loop,
        settings: impl Into<Arc<Settings<R>>>,
        proactor: &Proactor,
    ) -> Self {
        Self::build(lp, settings.into(), Some(proactor.clone()))
    }

    fn build(lp: &Loop, settings: Arc<Settings<R>>, proactor: Option<Proactor>) -> Self {
        let slots = (0..settings.config.accept_pool_size())
            .map(|_| AcceptSlot {
                armed: AtomicU64::new(0),
            })
            .collect();
        Self {
            inner: Arc::new(ListenerInner {
                event_loop: lp.clone(),
                settings,
                proactor: Mutex::new(proactor),
                io: Mutex::new(None),
                local: Mutex::new(None),
                started: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                slots,
            }),
        }
    }

    /// Bind, listen and post the accept pool. Idempotent while started.
    pub fn start(&self) -> Result<(), NetError> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = inner.settings.config.validate() {
            inner.started.store(false, Ordering::Release);
            return Err(e.into());
        }
        match inner.open() {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.started.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Cancel every outstanding accept and close the socket. Idempotent;
    /// the listener may be started again afterwards.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Bound address while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local)
    }

    /// Accept operations currently posted.
    pub fn pending_accepts(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|s| s.armed.load(Ordering::Acquire) != 0)
            .count()
    }

    pub fn accept_pool_size(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn settings(&self) -> &Arc<Settings<R>> {
        &self.inner.settings
    }
}

impl<R: Request> ListenerInner<R> {
    fn proactor(&self) -> io::Result<Proactor> {
        let mut slot = lock(&self.proactor);
        if let Some(p) = slot.as_ref() {
            return Ok(p.clone());
        }
        let p = Proactor::global()?;
        *slot = Some(p.clone());
        Ok(p)
    }

    fn open(self: &Arc<Self>) -> Result<(), NetError> {
        let proactor = self.proactor()?;
        let listener = socket::listen_socket(&self.settings.config)?;
        let local = listener.local_addr()?.as_socket();
        let io = IoHandle::new(listener);

        *lock(&self.local) = local;
        *lock(&self.io) = Some(Arc::clone(&io));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.event_loop.retain();

        for slot in 0..self.slots.len() {
            self.slots[slot].armed.store(generation, Ordering::Release);
            self.post(&proactor, &io, slot, generation);
        }
        log::debug!(
            "listening on {} ({} accepts posted)",
            local.map_or_else(|| "?".to_string(), |a| a.to_string()),
            self.slots.len()
        );
        Ok(())
    }

    fn post(
        self: &Arc<Self>,
        proactor: &Proactor,
        io: &Arc<IoHandle>,
        slot: usize,
        generation: u64,
    ) {
        let weak = Arc::downgrade(self);
        let next_io = Arc::clone(io);
        let next_proactor = proactor.clone();
        proactor.submit(io, Op::Accept, move |c| {
            Self::accepted(weak, next_proactor, next_io, slot, generation, c)
        });
    }

    /// Proactor thread.
    fn accepted(
        weak: Weak<Self>,
        proactor: Proactor,
        io: Arc<IoHandle>,
        slot: usize,
        generation: u64,
        completion: Completion,
    ) {
        let Completion::Accept(result) = completion else {
            return;
        };
        let Some(me) = weak.upgrade() else {
            return;
        };
        let cancelled = matches!(&result, Err(e) if is_cancelled(e));
        if !me.is_current(generation) || cancelled {
            me.disarm(slot, generation);
            return;
        }

        let target = Arc::clone(&me);
        match result {
            Ok((peer, _)) => {
                me.post(&proactor, &io, slot, generation);
                me.event_loop.execute(move || target.dispatch(&proactor, peer));
            }
            // No re-post here: a failure that persists would spin the driver.
            Err(e) => me
                .event_loop
                .execute(move || target.accept_failed(proactor, io, slot, generation, e)),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.started.load(Ordering::Acquire)
            && self.generation.load(Ordering::Acquire) == generation
    }

    /// Loop thread: report the failure, then retry the slot after the
    /// configured backoff.
    fn accept_failed(
        self: &Arc<Self>,
        proactor: Proactor,
        io: Arc<IoHandle>,
        slot: usize,
        generation: u64,
        err: io::Error,
    ) {
        self.settings.raise(None, &NetError::Io(err));
        if !self.is_current(generation) {
            self.disarm(slot, generation);
            return;
        }
        let weak = Arc::downgrade(self);
        let retry = Timer::with_callback(
            self.settings.config.accept_backoff,
            false,
            move |_: &Timer| {
                let Some(me) = weak.upgrade() else {
                    return;
                };
                if me.is_current(generation) {
                    me.post(&proactor, &io, slot, generation);
                } else {
                    me.disarm(slot, generation);
                }
            },
        );
        if let Err(e) = retry.start(&self.event_loop) {
            log::error!("accept slot {} retry not armed: {}", slot, e);
            self.disarm(slot, generation);
        }
    }

    fn disarm(&self, slot: usize, generation: u64) {
        let _ = self.slots[slot].armed.compare_exchange(
            generation,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Loop thread: turn an accepted socket into a started session.
    fn dispatch(&self, proactor: &Proactor, peer: Socket) {
        let session = socket::prepare_accepted(&peer).and_then(|()| {
            Session::from_handle(
                &self.event_loop,
                proactor,
                Arc::clone(&self.settings),
                IoHandle::new(peer),
            )
        });
        match session {
            Ok(session) => {
                if session.start() {
                    if let Some(f) = &self.settings.on_accept {
                        f(&session);
                    }
                }
            }
            Err(e) => self.settings.raise(None, &NetError::Io(e)),
        }
    }

    fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(io) = lock(&self.io).take() {
            match lock(&self.proactor).as_ref() {
                Some(p) => p.cancel(&io),
                None => io.mark_cancelled(),
            }
        }
        *lock(&self.local) = None;
        self.event_loop.release();
        log::debug!("listener stopped");
    }
}

impl<R: Request> Drop for ListenerInner<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<R: Request> Clone for Listener<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Request> fmt::Debug for Listener<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local", &self.local_addr())
            .field("started", &self.is_started())
            .field("pending_accepts", &self.pending_accepts())
            .finish()
    }
}
