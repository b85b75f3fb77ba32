//! Listening-socket bootstrap: textual port in, bound non-blocking listener
//! out, with every failure returned to the caller rather than ended here.

use std::ffi::CString;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

/// A bootstrap failure. There is no degraded mode before the listener exists,
/// so callers are expected to report these and exit; the distinction between
/// variants is for the diagnostic, not for recovery.
#[derive(Debug)]
pub enum BootstrapError {
    /// The port argument is neither a number nor a known service name.
    Resolve(String),
    /// No candidate address could be bound; holds the last bind error.
    Bind(io::Error),
    /// Bound, but could not switch the socket to non-blocking mode.
    Nonblock(io::Error),
    /// Bound, but could not start listening.
    Listen(io::Error),
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapError::Resolve(port) => {
                write!(f, "could not resolve port or service name {port:?}")
            }
            BootstrapError::Bind(err) => write!(f, "could not bind any candidate address: {err}"),
            BootstrapError::Nonblock(err) => {
                write!(f, "could not make the listener non-blocking: {err}")
            }
            BootstrapError::Listen(err) => write!(f, "could not listen: {err}"),
        }
    }
}

impl std::error::Error for BootstrapError {}

/// Resolve `port` and produce one bound, listening, non-blocking socket.
///
/// Candidates are the IPv6 and IPv4 wildcard addresses, in that order; the
/// first that binds wins. On Linux the IPv6 wildcard is dual-stack by
/// default, so a v6-capable host serves both families from one socket and a
/// v4-only host falls through to the second candidate.
pub fn bind(port: &str) -> Result<Socket, BootstrapError> {
    let port = resolve_port(port)?;
    let candidates = [
        SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port),
        SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port),
    ];

    let mut last_err = None;
    for addr in candidates {
        let socket = match Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        {
            Ok(socket) => socket,
            Err(err) => {
                last_err = Some(err);
                continue;
            }
        };
        if let Err(err) = socket.set_reuse_address(true) {
            last_err = Some(err);
            continue;
        }
        match socket.bind(&addr.into()) {
            Ok(()) => {
                socket
                    .set_nonblocking(true)
                    .map_err(BootstrapError::Nonblock)?;
                socket.listen(libc::SOMAXCONN).map_err(BootstrapError::Listen)?;
                return Ok(socket);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(BootstrapError::Bind(last_err.unwrap_or_else(|| {
        io::Error::from(io::ErrorKind::AddrNotAvailable)
    })))
}

/// A numeric port is used as-is; anything else goes through the system
/// services database.
fn resolve_port(text: &str) -> Result<u16, BootstrapError> {
    if let Ok(port) = text.parse::<u16>() {
        return Ok(port);
    }
    resolve_service(text).ok_or_else(|| BootstrapError::Resolve(text.to_string()))
}

/// `getservbyname` lookup for TCP. Returns the port in host byte order.
fn resolve_service(name: &str) -> Option<u16> {
    let name = CString::new(name).ok()?;
    let proto = CString::new("tcp").ok()?;
    // The returned record lives in static storage owned by libc; only the
    // port is read before anything else can call into the resolver.
    let ent = unsafe { libc::getservbyname(name.as_ptr(), proto.as_ptr()) };
    if ent.is_null() {
        return None;
    }
    let s_port = unsafe { (*ent).s_port };
    Some(u16::from_be(s_port as u16))
}
