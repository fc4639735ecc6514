//! A listener that cannot allocate descriptors for accepted connections
//! reports the failure and retries after its backoff, without spinning.
//!
//! Lowers RLIMIT_NOFILE for the whole process, so it is the only test in
//! this binary.

use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Socket, Type};

use mudnet_net::{Listener, NetConfig, NetError, NulTerminated, Proactor, Session, Settings};
use mudnet_runtime::{Loop, LoopConfig, ManualClock};

fn pump_until(lp: &Loop, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        lp.update().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
}

fn nofile() -> libc::rlimit {
    let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) }, 0);
    limit
}

fn set_nofile(limit: &libc::rlimit) {
    assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, limit) }, 0);
}

/// Number the next descriptor would get.
fn lowest_free_fd(any: &impl AsRawFd) -> libc::rlim_t {
    let fd = unsafe { libc::dup(any.as_raw_fd()) };
    assert!(fd >= 0);
    unsafe { libc::close(fd) };
    fd as libc::rlim_t
}

#[test]
fn test_accept_failure_backs_off() {
    let backoff = Duration::from_millis(100);
    let clock = Arc::new(ManualClock::new());
    let lp = Loop::with_clock(LoopConfig::new(), Arc::clone(&clock)).unwrap();
    let proactor = Proactor::new().unwrap();
    let failures = Arc::new(AtomicUsize::new(0));
    let accepted: Arc<Mutex<Option<Session<NulTerminated>>>> = Arc::new(Mutex::new(None));

    let (f, a) = (Arc::clone(&failures), Arc::clone(&accepted));
    let config = NetConfig::new().ip("127.0.0.1").port(0).backlog(1).accept_backoff(backoff);
    let settings = Settings::<NulTerminated>::new(config)
        .on_exception(move |sess, err| {
            assert!(sess.is_none());
            assert!(matches!(err, NetError::Io(_)), "{}", err);
            f.fetch_add(1, Ordering::SeqCst);
        })
        .on_accept(move |sess| *a.lock().unwrap() = Some(sess.clone()));
    let listener = Listener::with_proactor(&lp, settings, &proactor);
    listener.start().unwrap();
    assert_eq!(listener.pending_accepts(), 1);
    let addr = listener.local_addr().unwrap();

    // The peer's descriptor exists before the limit drops.
    let peer = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    let original = nofile();
    set_nofile(&libc::rlimit {
        rlim_cur: lowest_free_fd(&peer),
        rlim_max: original.rlim_max,
    });
    peer.connect(&addr.into()).unwrap();

    pump_until(&lp, || failures.load(Ordering::SeqCst) >= 1);
    // No retry until the loop clock reaches the backoff.
    for _ in 0..200 {
        lp.update().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(proactor.outstanding(), 0);
    assert_eq!(listener.pending_accepts(), 1);
    assert!(lp.pending_actions() < 4);

    // One more failure per backoff period.
    clock.advance(backoff);
    pump_until(&lp, || failures.load(Ordering::SeqCst) >= 2);
    thread::sleep(Duration::from_millis(50));
    lp.update().unwrap();
    assert_eq!(failures.load(Ordering::SeqCst), 2);

    // Descriptors available again: the next retry accepts.
    set_nofile(&original);
    clock.advance(backoff);
    pump_until(&lp, || accepted.lock().unwrap().is_some());
    let session = accepted.lock().unwrap().take().unwrap();
    assert!(session.connected());
    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert_eq!(listener.pending_accepts(), 1);

    session.close();
    listener.stop();
    lp.update().unwrap();
    assert_eq!(lp.liveness(), 0);
}
