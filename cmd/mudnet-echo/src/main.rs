//! mudnet echo server and client
//!
//! Messages are NUL-terminated UTF-8 text. The server answers each message
//! with "Echo " followed by the text.
//!
//! Usage:
//!     mudnet-echo server [port]
//!     mudnet-echo client <host> <port> <text>...
//!
//! Logging level comes from `MUD_LOG_LEVEL` (off, error, warn, info,
//! debug, trace or 0-5; default info). Every other knob is a `MUD_*` variable, see
//! `NetConfig::from_env`.
//!
//! Try it:
//!     mudnet-echo server 9999 &
//!     mudnet-echo client localhost 9999 hello world

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use mudnet::prelude::*;

fn init_logging() {
    let level = std::env::var("MUD_LOG_LEVEL")
        .ok()
        .and_then(|v| parse_level(v.trim()))
        .unwrap_or(LevelFilter::Info);
    let config = ConfigBuilder::new().set_thread_level(LevelFilter::Debug).build();
    if let Err(e) = TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("logger init failed: {}", e);
    }
}

/// Level name, or 0 (off) through 5 (trace).
fn parse_level(v: &str) -> Option<LevelFilter> {
    match v.parse::<usize>() {
        Ok(n) => [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
            LevelFilter::Trace,
        ]
        .get(n)
        .copied(),
        Err(_) => LevelFilter::from_str(v).ok(),
    }
}

fn usage() -> ExitCode {
    eprintln!("usage: mudnet-echo server [port]");
    eprintln!("       mudnet-echo client <host> <port> <text>...");
    ExitCode::from(2)
}

fn parse_port(arg: Option<&String>, default: u16) -> Option<u16> {
    match arg {
        Some(s) => s.parse().ok(),
        None => Some(default),
    }
}

fn serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let lp = Loop::new();
    let config = NetConfig::from_env().port(port);
    config.validate()?;

    let settings = Settings::<NulTerminated>::new(config)
        .on_accept(|session| log::info!("[{}] connected from {}", session.id(), session.remote()))
        .on_request(|session, req| {
            log::debug!("[{}] <- {:?}", session.id(), req.text());
            let reply = NulTerminated::new(format!("Echo {}", req.text()));
            if !reply.send(session) {
                log::warn!("[{}] send queue full, closing", session.id());
                session.close();
                return;
            }
            session.flush();
        })
        .on_close(|session| log::info!("[{}] closed", session.id()))
        .on_exception(|session, err| match session {
            Some(s) => log::warn!("[{}] {}", s.id(), err),
            None => log::warn!("listener: {}", err),
        });

    let listener = Listener::new(&lp, settings);
    listener.start()?;
    if let Some(addr) = listener.local_addr() {
        log::info!("echo server on {}", addr);
    }
    lp.run()?;
    Ok(())
}

fn client(host: &str, port: u16, texts: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let lp = Loop::new();
    let config = NetConfig::from_env().ip(host).port(port);
    let timeout = config.connect_timeout;
    let expected = texts.len();
    let replies = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&replies);
    let settings = Settings::<NulTerminated>::new(config)
        .on_request(move |session, req| {
            println!("{}", req.text());
            if seen.fetch_add(1, Ordering::SeqCst) + 1 == expected {
                session.close();
            }
        })
        .on_close(|_| log::debug!("client session closed"));

    let pending = Session::connect(&lp, settings, timeout);

    // Wait for the connect off the loop thread, then hop back to send.
    lp.retain();
    let remote = lp.clone();
    thread::spawn(move || {
        let outcome = futures::executor::block_on(pending);
        let done = remote.clone();
        remote.execute(move || {
            match outcome {
                Ok(session) => {
                    log::info!("connected to {}", session.remote());
                    for text in &texts {
                        if !NulTerminated::new(text.as_str()).send(&session) {
                            log::error!("send queue full");
                            session.close();
                            break;
                        }
                    }
                    session.flush();
                }
                Err(e) => log::error!("connect failed: {}", e),
            }
            done.release();
        });
    });

    lp.run()?;
    let received = replies.load(Ordering::SeqCst);
    if received < expected {
        return Err(format!("{} of {} replies received", received, expected).into());
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args: Vec<String> = std::env::args().collect();

    let result = match args.get(1).map(String::as_str) {
        Some("server") => match parse_port(args.get(2), 9999) {
            Some(port) => serve(port),
            None => return usage(),
        },
        Some("client") if args.len() >= 5 => match parse_port(args.get(3), 9999) {
            Some(port) => client(&args[2], port, args[4..].to_vec()),
            None => return usage(),
        },
        _ => return usage(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
