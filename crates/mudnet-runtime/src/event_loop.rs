//! # Loop: the single-threaded cooperative scheduler
//!
//! A loop is bound to the thread that creates it. Only that thread runs
//! user callbacks (submitted actions, timer callbacks, event handlers) and
//! mutates the timer set and subscriber table. Other threads reach it
//! through [`Loop::execute`], which pushes onto a lock-free MPSC queue and
//! unparks the owner.
//!
//! ```text
//!   other threads                     owner thread (run)
//!   ─────────────                     ──────────────────
//!   execute(f) ──► actions queue ──►  (a) drain actions
//!   release()  ──► unpark             (b) liveness == 0 && no timers → exit
//!   link(..)   ──► pending changes    (c) fire expired timers, re-arm repeats
//!                                     (d) park until next deadline / wake
//! ```
//!
//! Panics escaping a callback are caught where the callback is invoked and
//! handed to the loop's failure handler (see [`crate::failure`]).

use crossbeam_queue::SegQueue;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::clock::{Clock, MonotonicClock};
use crate::config::LoopConfig;
use crate::error::{ConfigError, LoopError};
use crate::events::{EventHandler, EventRegistry, Payload, Subscription};
use crate::failure::{
    CallbackFailure, Disposition, ErrorPolicy, FailureHandler, FailureOrigin, RecentFailures,
};
use crate::parking::{new_parking, LoopParking};
use crate::timer::{interval_micros, Timer, TimerSet};

type Action = Box<dyn FnOnce() + Send + 'static>;

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct LoopShared {
    id: u64,
    name: String,
    owner: ThreadId,
    clock: Box<dyn Clock>,
    liveness: AtomicUsize,
    actions: SegQueue<Action>,
    parking: Box<dyn LoopParking>,
    pub(crate) timers: Mutex<TimerSet<Timer>>,
    events: EventRegistry,
    handler: Mutex<FailureHandler>,
    recent: Option<RecentFailures>,
    escalated: Mutex<Option<CallbackFailure>>,
    slow_pass: Duration,
}

impl LoopShared {
    #[inline]
    pub(crate) fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to an event loop. Cheap to clone and `Send`; every clone refers
/// to the same loop, still bound to the creating thread.
#[derive(Clone)]
pub struct Loop {
    pub(crate) shared: Arc<LoopShared>,
}

impl Loop {
    /// Loop on the calling thread, configured from the environment.
    ///
    /// An invalid environment configuration is logged and replaced by the
    /// compiled-in defaults.
    pub fn new() -> Self {
        let config = LoopConfig::from_env();
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("ignoring loop environment config: {}", e);
                LoopConfig::new()
            }
        };
        Self::build(config, Box::new(MonotonicClock::new()))
    }

    pub fn with_config(config: LoopConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, Box::new(MonotonicClock::new())))
    }

    /// Loop reading time from `clock`.
    pub fn with_clock<C: Clock>(config: LoopConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, Box::new(clock)))
    }

    fn build(config: LoopConfig, clock: Box<dyn Clock>) -> Self {
        let (policy, recent) = if config.fatal_errors {
            (ErrorPolicy::Fatal, None)
        } else if config.error_limit > 0 {
            let recent = RecentFailures::new(config.error_limit);
            (ErrorPolicy::Collect(recent.clone()), Some(recent))
        } else {
            (ErrorPolicy::LogAndContinue, None)
        };

        Self {
            shared: Arc::new(LoopShared {
                id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
                name: config.name,
                owner: thread::current().id(),
                clock,
                liveness: AtomicUsize::new(0),
                actions: SegQueue::new(),
                parking: new_parking(),
                timers: Mutex::new(TimerSet::new()),
                events: EventRegistry::new(),
                handler: Mutex::new(policy.into_handler()),
                recent,
                escalated: Mutex::new(None),
                slow_pass: config.slow_pass,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Process-unique loop id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Whether the calling thread owns this loop.
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.shared.is_owner()
    }

    /// Current reading of the loop clock.
    pub fn now(&self) -> Duration {
        self.shared.clock.now()
    }

    #[inline]
    pub(crate) fn now_micros(&self) -> u64 {
        self.now().as_micros() as u64
    }

    // ── Work submission ─────────────────────────────────────────────

    /// Run `action` on the loop thread.
    ///
    /// On the owner thread it runs synchronously, before `execute` returns.
    /// From any other thread it is queued (FIFO with other cross-thread
    /// submissions) and the loop is woken.
    pub fn execute<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_owner() {
            self.guarded(|| FailureOrigin::Action, action);
        } else {
            self.shared.actions.push(Box::new(action));
            self.shared.parking.unpark();
        }
    }

    /// Keep `run` from returning while the caller is active.
    pub fn retain(&self) {
        self.shared.liveness.fetch_add(1, Ordering::AcqRel);
    }

    /// Undo one `retain` and wake the loop so it can notice zero liveness.
    pub fn release(&self) {
        let prev = self
            .shared
            .liveness
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev.is_err() {
            log::warn!("loop `{}`: release without matching retain", self.shared.name);
        }
        self.shared.parking.unpark();
    }

    pub fn liveness(&self) -> usize {
        self.shared.liveness.load(Ordering::Acquire)
    }

    pub fn timer_count(&self) -> usize {
        lock(&self.shared.timers).len()
    }

    pub fn pending_actions(&self) -> usize {
        self.shared.actions.len()
    }

    // ── Driving ─────────────────────────────────────────────────────

    /// Drive the loop until liveness is zero and no timers are armed.
    pub fn run(&self) -> Result<(), LoopError> {
        self.check_owner()?;
        loop {
            let pass_start = Instant::now();
            self.drain_actions();
            self.take_escalation()?;

            if self.liveness() == 0 && self.timer_count() == 0 {
                return Ok(());
            }

            let next_deadline = self.fire_timers();
            self.take_escalation()?;
            self.warn_if_slow(pass_start);

            if !self.shared.actions.is_empty() {
                continue;
            }
            match next_deadline {
                Some(deadline) => {
                    let now = self.now_micros();
                    if deadline > now {
                        self.shared
                            .parking
                            .park(Some(Duration::from_micros(deadline - now)));
                    }
                }
                // Nothing armed: re-check liveness before sleeping forever.
                None if self.liveness() == 0 => continue,
                None => {
                    self.shared.parking.park(None);
                }
            }
        }
    }

    /// One non-blocking pass: drain actions, then fire expired timers.
    ///
    /// For embedding the loop in a foreign host loop.
    pub fn update(&self) -> Result<(), LoopError> {
        self.check_owner()?;
        self.drain_actions();
        self.take_escalation()?;
        self.fire_timers();
        self.take_escalation()
    }

    fn check_owner(&self) -> Result<(), LoopError> {
        if self.is_owner() {
            Ok(())
        } else {
            Err(LoopError::NotOwner {
                name: self.shared.name.clone(),
            })
        }
    }

    /// Run the actions queued at entry. Actions queued while draining wait
    /// for the next pass, so a busy producer cannot starve timers.
    fn drain_actions(&self) {
        let batch = self.shared.actions.len();
        for _ in 0..batch {
            match self.shared.actions.pop() {
                Some(action) => self.guarded(|| FailureOrigin::Action, action),
                None => break,
            }
        }
    }

    /// Fire every timer expired at pass start. Returns the next deadline.
    fn fire_timers(&self) -> Option<u64> {
        let now = self.now_micros();
        loop {
            let popped = lock(&self.shared.timers).pop_expired(now);
            let Some((key, timer)) = popped else {
                break;
            };

            let live = {
                let mut state = lock(&timer.inner.state);
                let live = matches!(&state.running, Some(r) if r.key == key);
                if live {
                    if state.repeat {
                        let next = key.rearm(interval_micros(state.interval));
                        if let Some(running) = state.running.as_mut() {
                            running.key = next;
                        }
                        lock(&self.shared.timers).insert(next, timer.clone());
                    } else {
                        state.running = None;
                    }
                }
                live
            };

            if live {
                if let Some(mut callback) = timer.take_callback() {
                    let index = timer.index();
                    self.guarded(|| FailureOrigin::Timer(index), || callback(&timer));
                    timer.restore_callback(callback);
                }
            }
        }
        lock(&self.shared.timers).next_deadline()
    }

    fn warn_if_slow(&self, pass_start: Instant) {
        let took = pass_start.elapsed();
        if took > self.shared.slow_pass {
            log::warn!(
                "loop `{}` overloaded: pass took {:?} ({} actions queued, {} timers)",
                self.shared.name,
                took,
                self.pending_actions(),
                self.timer_count()
            );
        }
    }

    // ── Failures ────────────────────────────────────────────────────

    /// Install the loop-scoped failure handler.
    pub fn catch<F>(&self, handler: F)
    where
        F: Fn(&CallbackFailure) -> Disposition + Send + Sync + 'static,
    {
        *lock(&self.shared.handler) = Arc::new(handler);
    }

    /// Failures kept by the `error_limit` policy, if configured.
    pub fn recent_failures(&self) -> Option<RecentFailures> {
        self.shared.recent.clone()
    }

    fn guarded<O, F>(&self, origin: O, f: F)
    where
        O: FnOnce() -> FailureOrigin,
        F: FnOnce(),
    {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
            self.report(CallbackFailure::from_panic(origin(), payload));
        }
    }

    fn report(&self, failure: CallbackFailure) {
        let handler = Arc::clone(&lock(&self.shared.handler));
        let disposition = match catch_unwind(AssertUnwindSafe(|| handler(&failure))) {
            Ok(d) => d,
            Err(_) => {
                log::error!("loop `{}`: failure handler panicked", self.shared.name);
                Disposition::Escalate
            }
        };
        if disposition == Disposition::Escalate {
            let mut slot = lock(&self.shared.escalated);
            if slot.is_none() {
                *slot = Some(failure);
            }
        }
    }

    fn take_escalation(&self) -> Result<(), LoopError> {
        match lock(&self.shared.escalated).take() {
            Some(failure) => Err(LoopError::Escalated(failure)),
            None => Ok(()),
        }
    }

    // ── Publish / subscribe ─────────────────────────────────────────

    /// Subscribe `handler` to `name`.
    ///
    /// From a non-owner thread the subscription is queued and takes effect
    /// before the next broadcast is dispatched.
    pub fn link<F>(&self, name: &str, handler: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let events = &self.shared.events;
        let sub = events.next_subscription();
        let handler: EventHandler = Arc::new(handler);
        if self.is_owner() {
            events.apply_pending();
            events.link_now(name.to_string(), sub, handler);
        } else {
            events.defer_link(name.to_string(), sub, handler);
        }
        sub
    }

    pub fn unlink(&self, name: &str, sub: Subscription) {
        let events = &self.shared.events;
        if self.is_owner() {
            events.apply_pending();
            events.unlink_now(name, sub);
        } else {
            events.defer_unlink(name.to_string(), sub);
        }
    }

    /// Deliver `payload` to every subscriber of `name` on the loop thread.
    ///
    /// Synchronous on the owner thread; queued through `execute` otherwise.
    pub fn broadcast(&self, name: &str, payload: Payload) {
        if !self.is_owner() {
            let lp = self.clone();
            let name = name.to_string();
            self.execute(move || lp.broadcast(&name, payload));
            return;
        }
        let events = &self.shared.events;
        events.apply_pending();
        for handler in events.handlers(name) {
            self.guarded(|| FailureOrigin::Event(name.to_string()), || handler(&payload));
        }
    }

    /// Subscribers currently applied for `name` (owner-side view).
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.shared.events.subscriber_count(name)
    }
}

impl Default for Loop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("liveness", &self.liveness())
            .field("timers", &self.timer_count())
            .field("pending_actions", &self.pending_actions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TimerError;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;

    fn manual_loop() -> (Loop, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let lp = Loop::with_clock(LoopConfig::new(), Arc::clone(&clock)).unwrap();
        (lp, clock)
    }

    #[test]
    fn test_execute_on_owner_is_synchronous() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        lp.execute(move || ran2.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(lp.pending_actions(), 0);
    }

    #[test]
    fn test_cross_thread_execute_is_fifo() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let remote = lp.clone();
        let order2 = Arc::clone(&order);
        thread::spawn(move || {
            for i in 0..100 {
                let order = Arc::clone(&order2);
                remote.execute(move || order.lock().unwrap().push(i));
            }
        })
        .join()
        .unwrap();

        assert_eq!(lp.pending_actions(), 100);
        lp.update().unwrap();
        assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_returns_when_idle() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        lp.run().unwrap();
    }

    #[test]
    fn test_run_from_other_thread_is_rejected() {
        let lp = Loop::with_config(LoopConfig::new().name("owned")).unwrap();
        let remote = lp.clone();
        let err = thread::spawn(move || remote.run()).join().unwrap();
        assert!(matches!(err, Err(LoopError::NotOwner { ref name }) if name == "owned"));
        let remote = lp.clone();
        assert!(thread::spawn(move || remote.update().is_err()).join().unwrap());
    }

    #[test]
    fn test_liveness_keeps_run_alive() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        lp.retain();

        let remote = lp.clone();
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            let tx = tx.clone();
            remote.execute(move || tx.send("ran").unwrap());
            // Retain before release: the loop must not exit in between.
            remote.retain();
            remote.release();
            thread::sleep(Duration::from_millis(30));
            remote.release();
        });

        lp.run().unwrap();
        worker.join().unwrap();
        assert_eq!(rx.try_recv(), Ok("ran"));
        assert_eq!(lp.liveness(), 0);
    }

    #[test]
    fn test_release_without_retain_saturates() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        lp.release();
        assert_eq!(lp.liveness(), 0);
    }

    #[test]
    fn test_run_exits_after_last_timer() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let timer = Timer::with_callback(Duration::from_millis(5), true, move |t| {
            if fired2.fetch_add(1, Ordering::SeqCst) == 2 {
                t.stop().unwrap();
            }
        });
        timer.start(&lp).unwrap();
        lp.run().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(lp.timer_count(), 0);
    }

    #[test]
    fn test_timers_fire_in_expiry_then_creation_order() {
        let (lp, clock) = manual_loop();
        let order = Arc::new(Mutex::new(Vec::new()));
        let specs = [("c", 30), ("a", 10), ("b1", 20), ("b2", 20), ("b3", 20)];
        let timers: Vec<Timer> = specs
            .iter()
            .map(|&(tag, ms)| {
                let order = Arc::clone(&order);
                Timer::with_callback(Duration::from_millis(ms), false, move |_| {
                    order.lock().unwrap().push(tag)
                })
            })
            .collect();
        for t in &timers {
            t.start(&lp).unwrap();
        }

        clock.advance(Duration::from_millis(50));
        lp.update().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b1", "b2", "b3", "c"]);
    }

    #[test]
    fn test_repeat_rearms_without_drift() {
        let (lp, clock) = manual_loop();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired2 = Arc::clone(&fired);
        let lp2 = lp.clone();
        let timer = Timer::with_callback(Duration::from_millis(10), true, move |_| {
            fired2.lock().unwrap().push(lp2.now().as_millis() as u64);
        });
        timer.start(&lp).unwrap();

        // Late by 7ms, then by 22ms: expiries stay on the 10ms grid and the
        // missed periods are caught up in one pass.
        clock.advance(Duration::from_millis(17));
        lp.update().unwrap();
        assert_eq!(timer.expiry(), Some(Duration::from_millis(20)));

        clock.advance(Duration::from_millis(25));
        lp.update().unwrap();
        assert_eq!(*fired.lock().unwrap(), vec![17, 42, 42, 42]);
        assert_eq!(timer.expiry(), Some(Duration::from_millis(50)));
        timer.stop().unwrap();
    }

    #[test]
    fn test_stopped_timer_does_not_fire() {
        let (lp, clock) = manual_loop();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        let timer = Timer::with_callback(Duration::from_millis(1), false, move |_| {
            fired2.store(true, Ordering::SeqCst)
        });
        timer.start(&lp).unwrap();
        timer.stop().unwrap();
        clock.advance(Duration::from_millis(5));
        lp.update().unwrap();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_timer_started_off_thread_is_usage_error() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let remote = lp.clone();
        let res = thread::spawn(move || Timer::new(Duration::from_millis(1), false).start(&remote))
            .join()
            .unwrap();
        assert_eq!(res, Err(TimerError::WrongThread));
        assert_eq!(lp.timer_count(), 0);
    }

    #[test]
    fn test_panicking_action_goes_to_handler() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        lp.catch(move |failure| {
            seen2.lock().unwrap().push(failure.clone());
            Disposition::Continue
        });

        let remote = lp.clone();
        thread::spawn(move || {
            remote.execute(|| panic!("first"));
            remote.execute(|| {});
        })
        .join()
        .unwrap();
        lp.update().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, FailureOrigin::Action);
        assert_eq!(seen[0].message, "first");
    }

    #[test]
    fn test_escalation_stops_run() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        lp.catch(|_| Disposition::Escalate);
        lp.retain();
        let remote = lp.clone();
        thread::spawn(move || remote.execute(|| panic!("fatal")))
            .join()
            .unwrap();
        match lp.run() {
            Err(LoopError::Escalated(f)) => assert_eq!(f.message, "fatal"),
            other => panic!("unexpected: {:?}", other),
        }
        lp.release();
    }

    #[test]
    fn test_timer_panic_reported_with_index() {
        let (lp, clock) = manual_loop();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        lp.catch(move |f| {
            *seen2.lock().unwrap() = Some(f.origin.clone());
            Disposition::Continue
        });
        let timer = Timer::with_callback(Duration::from_millis(1), false, |_| panic!("tick"));
        timer.start(&lp).unwrap();
        clock.advance(Duration::from_millis(1));
        lp.update().unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(FailureOrigin::Timer(timer.index())));
    }

    #[test]
    fn test_error_limit_policy() {
        let lp = Loop::with_config(LoopConfig::new().error_limit(2)).unwrap();
        for msg in ["a", "b", "c"] {
            lp.execute(move || panic!("{}", msg));
        }
        let recent = lp.recent_failures().unwrap();
        let kept: Vec<_> = recent.snapshot().into_iter().map(|f| f.message).collect();
        assert_eq!(kept, vec!["b", "c"]);
        lp.update().unwrap();
    }

    #[test]
    fn test_fatal_policy_escalates() {
        let lp = Loop::with_config(LoopConfig::new().fatal_errors(true)).unwrap();
        lp.execute(|| panic!("boom"));
        assert!(matches!(lp.update(), Err(LoopError::Escalated(_))));
        assert!(lp.update().is_ok());
    }

    #[test]
    fn test_broadcast_on_owner() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let got = Arc::new(Mutex::new(Vec::new()));
        let got2 = Arc::clone(&got);
        let sub = lp.link("score", move |p| {
            got2.lock().unwrap().push(*p.downcast_ref::<u32>().unwrap())
        });
        lp.broadcast("score", Arc::new(7u32));
        lp.broadcast("other", Arc::new(1u32));
        lp.unlink("score", sub);
        lp.broadcast("score", Arc::new(8u32));
        assert_eq!(*got.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_cross_thread_link_applies_before_next_broadcast() {
        let lp = Loop::with_config(LoopConfig::new()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let remote = lp.clone();
        let hits2 = Arc::clone(&hits);
        let sub = thread::spawn(move || {
            remote.link("tick", move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            })
        })
        .join()
        .unwrap();

        // Not applied yet from the owner's point of view.
        assert_eq!(lp.subscriber_count("tick"), 0);
        lp.broadcast("tick", Arc::new(()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let remote = lp.clone();
        thread::spawn(move || {
            remote.unlink("tick", sub);
            remote.broadcast("tick", Arc::new(()));
        })
        .join()
        .unwrap();
        lp.update().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let lp = Loop::with_config(LoopConfig::new().error_limit(4)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        lp.link("evt", |_| panic!("bad handler"));
        let hits2 = Arc::clone(&hits);
        lp.link("evt", move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        lp.broadcast("evt", Arc::new(()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let failures = lp.recent_failures().unwrap().snapshot();
        assert_eq!(failures[0].origin, FailureOrigin::Event("evt".into()));
    }
}
