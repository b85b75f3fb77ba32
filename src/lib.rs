//! Library crate for echoplex: a single-threaded edge-triggered TCP reactor,
//! plus the pieces it is built from (listener bootstrap, epoll poller, stats).
//!
//! The **binaries** are thin: `main.rs` wires a [`reactor::Reactor`] to a port
//! and runs it forever; the blocking echo pair under `src/bin/` shares nothing
//! with the reactor except the port convention. Everything with behavior worth
//! testing lives here so the integration tests can drive it in-process.

pub mod config;
pub mod listener;
pub mod metrics;
pub mod poller;
pub mod reactor;
