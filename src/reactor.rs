//! The reactor core: one thread, one epoll instance, and two drain routines.
//!
//! Everything here is edge-triggered, so both routines loop until the kernel
//! says `WouldBlock`: the accept path must consume every pending connection
//! per wakeup, and the read path must consume every available byte, because
//! no further notification arrives for data that was already there.
//!
//! This variant only observes and logs what clients send; it never writes
//! back. The blocking server under `src/bin/` is the one that echoes.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::AsRawFd;

use slab::Slab;
use socket2::Socket;

use crate::config::{MAX_CONNECTIONS, MAX_EVENTS, READ_BUF_SIZE};
use crate::metrics::Stats;
use crate::poller::{Poller, Waker};

/// Operation tag carried in the high half of the epoll token; the low half is
/// the connection's slab key.
const OP_ACCEPT: u64 = 0;
const OP_READ: u64 = 1;
const OP_WAKE: u64 = 2;

fn encode_token(op: u64, key: u32) -> u64 {
    (op << 32) | key as u64
}

fn decode_token(token: u64) -> (u64, u32) {
    (token >> 32, token as u32)
}

/// One accepted connection. The slab entry is the sole owner of the stream:
/// removing it drops the descriptor, which closes it, which removes it from
/// the epoll interest list in the same motion.
struct Connection {
    stream: TcpStream,
    peer: String,
}

/// Stops a running reactor from another thread. The reactor binary never
/// fires this (the reference behavior is to serve until killed); it exists so
/// the loop can be embedded and stopped in-process.
pub struct ShutdownHandle {
    waker: Waker,
}

impl ShutdownHandle {
    /// Make `Reactor::run` return `Ok(())` after it finishes the current
    /// dispatch pass.
    pub fn shutdown(&self) {
        self.waker.wake();
    }
}

pub struct Reactor {
    listener: Socket,
    poller: Poller,
    waker: Waker,
    conns: Slab<Connection>,
    stats: Stats,
}

impl Reactor {
    /// Take ownership of a bound, listening, non-blocking socket (see
    /// `listener::bind`) and arm it and the shutdown eventfd with a fresh
    /// poller.
    pub fn new(listener: Socket) -> io::Result<(Self, ShutdownHandle)> {
        let poller = Poller::new()?;
        let waker = Waker::new()?;
        poller.register(listener.as_raw_fd(), encode_token(OP_ACCEPT, 0))?;
        poller.register(waker.as_raw_fd(), encode_token(OP_WAKE, 0))?;
        let handle = ShutdownHandle {
            waker: waker.try_clone()?,
        };
        let reactor = Self {
            listener,
            poller,
            waker,
            conns: Slab::with_capacity(MAX_CONNECTIONS),
            stats: Stats::new(),
        };
        Ok((reactor, handle))
    }

    /// The address actually bound, useful when the caller asked for port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr().and_then(|addr| {
            addr.as_socket()
                .ok_or_else(|| io::Error::other("listener address is not an inet address"))
        })
    }

    /// Counter handle. Clone one out before moving the reactor onto its
    /// thread.
    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }

    /// Wait for readiness, dispatch the whole batch, repeat. Returns `Ok` only
    /// when the shutdown handle fires; returns `Err` if waiting fails or the
    /// kernel flags the listening socket itself, since nothing can be served
    /// without it. Per-connection failures never propagate out of here.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Vec::with_capacity(MAX_EVENTS);
        loop {
            self.poller.wait(&mut events)?;
            self.stats.inc_wakeups();
            for event in &events {
                let (op, key) = decode_token(event.token);
                match op {
                    OP_WAKE => {
                        self.waker.drain();
                        return Ok(());
                    }
                    OP_ACCEPT => {
                        if event.is_error() {
                            return Err(io::Error::other("error event on the listening socket"));
                        }
                        self.accept_drain();
                    }
                    OP_READ if event.is_error() => {
                        // Nothing sensible to read once the kernel has flagged
                        // the descriptor; tear it down directly.
                        if let Some(conn) = self.conns.get(key as usize) {
                            eprintln!("error event on connection from {}", conn.peer);
                        }
                        self.close_conn(key as usize);
                    }
                    OP_READ => self.read_drain(key as usize),
                    _ => {}
                }
            }
        }
    }

    /// Accept every pending connection. A single readiness event may stand
    /// for any number of queued connections, so stopping before `WouldBlock`
    /// would strand the rest until the next client happens to arrive.
    fn accept_drain(&mut self) {
        loop {
            let (socket, addr) = match self.listener.accept() {
                Ok(pair) => pair,
                // All pending connections consumed.
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    eprintln!("accept: {err}");
                    self.stats.inc_accept_errors();
                    break;
                }
            };
            let peer = match addr.as_socket() {
                Some(addr) => addr.to_string(),
                None => String::from("<unknown>"),
            };
            if let Err(err) = socket.set_nonblocking(true) {
                eprintln!("set_nonblocking on connection from {peer}: {err}");
                continue;
            }
            if self.conns.len() == MAX_CONNECTIONS {
                eprintln!("connection table full, dropping connection from {peer}");
                continue;
            }
            let stream: TcpStream = socket.into();
            let fd = stream.as_raw_fd();
            let key = self.conns.insert(Connection { stream, peer });
            if let Err(err) = self.poller.register(fd, encode_token(OP_READ, key as u32)) {
                let conn = self.conns.remove(key);
                eprintln!("register connection from {}: {err}", conn.peer);
                continue;
            }
            println!(
                "accepted connection from {} on descriptor {fd}",
                self.conns[key].peer
            );
            self.stats.inc_accepted();
        }
    }

    /// Read until the kernel has nothing more for this connection. Leaving
    /// bytes behind would stall the connection: edge-triggered readiness will
    /// not fire again for data that was already available.
    fn read_drain(&mut self, key: usize) {
        let mut buf = [0u8; READ_BUF_SIZE];
        let teardown = loop {
            let Some(conn) = self.conns.get(key) else {
                return;
            };
            match (&conn.stream).read(&mut buf) {
                // End of stream: the peer closed its write side.
                Ok(0) => break true,
                Ok(n) => {
                    self.stats.add_bytes_read(n as u64);
                    println!(
                        "read {n} bytes from {}: {}",
                        conn.peer,
                        String::from_utf8_lossy(&buf[..n])
                    );
                }
                // Caught up with the kernel buffer; the connection stays
                // registered and we wait for the next edge.
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break false,
                Err(err) => {
                    eprintln!("read from {}: {err}", conn.peer);
                    self.stats.inc_read_errors();
                    break true;
                }
            }
        };
        if teardown {
            self.close_conn(key);
        }
    }

    fn close_conn(&mut self, key: usize) {
        if self.conns.contains(key) {
            let conn = self.conns.remove(key);
            println!("closed connection from {}", conn.peer);
            self.stats.inc_closed();
        }
    }
}
