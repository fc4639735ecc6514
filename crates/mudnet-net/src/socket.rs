//! Socket construction helpers.

use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::NetConfig;

/// Bind address for a listener host string.
///
/// Empty means every interface through an IPv6 dual-stack socket;
/// "localhost" means the IPv6 loopback.
pub(crate) fn bind_addr(ip: &str, port: u16) -> io::Result<SocketAddr> {
    let ip = match ip {
        "" => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        "localhost" => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid listen address `{}`", other),
            )
        })?,
    };
    Ok(SocketAddr::new(ip, port))
}

pub(crate) fn listen_socket(config: &NetConfig) -> io::Result<Socket> {
    let addr = bind_addr(&config.ip, config.port)?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() && addr.ip().is_unspecified() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    let backlog = config.backlog.min(i32::MAX as usize) as i32;
    socket.listen(backlog)?;
    Ok(socket)
}

/// Nonblocking socket with a connect already in progress.
pub(crate) fn connect_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    socket.set_nodelay(true)?;
    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) => return Err(e),
    }
    Ok(socket)
}

/// Prepare an accepted socket for session use.
pub(crate) fn prepare_accepted(socket: &Socket) -> io::Result<()> {
    socket.set_nonblocking(true)?;
    socket.set_nodelay(true)
}

pub(crate) fn peer_and_local(socket: &Socket) -> io::Result<(SocketAddr, SocketAddr)> {
    let inet = |addr: socket2::SockAddr| {
        addr.as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-inet socket address"))
    };
    Ok((inet(socket.peer_addr()?)?, inet(socket.local_addr()?)?))
}

/// Errors that mean the peer is gone rather than that something broke.
pub(crate) fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
