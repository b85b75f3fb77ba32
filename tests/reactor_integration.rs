//! End-to-end reactor tests over real sockets: bind an ephemeral port, run
//! the reactor on its own thread, drive it with blocking clients, observe
//! through the stats handle, stop through the shutdown handle.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use echoplex::listener;
use echoplex::metrics::{Stats, StatsSnapshot};
use echoplex::reactor::{Reactor, ShutdownHandle};

const DEADLINE: Duration = Duration::from_secs(5);

struct TestServer {
    addr: String,
    stats: Stats,
    shutdown: ShutdownHandle,
    thread: JoinHandle<io::Result<()>>,
}

fn start_server() -> TestServer {
    let listener = listener::bind("0").expect("bind ephemeral port");
    let (mut reactor, shutdown) = Reactor::new(listener).expect("reactor setup");
    let port = reactor.local_addr().expect("local addr").port();
    let stats = reactor.stats();
    let thread = thread::spawn(move || reactor.run());
    TestServer {
        addr: format!("127.0.0.1:{port}"),
        stats,
        shutdown,
        thread,
    }
}

impl TestServer {
    fn connect(&self) -> TcpStream {
        TcpStream::connect(&self.addr).expect("connect to reactor")
    }

    fn stop(self) {
        self.shutdown.shutdown();
        let result = self.thread.join().expect("reactor thread panicked");
        assert!(result.is_ok(), "reactor exited with error: {result:?}");
    }
}

/// Poll the stats handle until `cond` holds or the deadline passes.
fn wait_for(
    stats: &Stats,
    what: &str,
    cond: impl Fn(StatsSnapshot) -> bool,
) -> StatsSnapshot {
    let deadline = Instant::now() + DEADLINE;
    loop {
        let snap = stats.snapshot();
        if cond(snap) {
            return snap;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {what}; last snapshot: {snap:?}"
        );
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn shutdown_handle_stops_the_loop() {
    let server = start_server();
    server.stop();
}

#[test]
fn a_burst_of_clients_is_fully_accepted() {
    const N: usize = 32;
    let server = start_server();

    let clients: Vec<TcpStream> = (0..N).map(|_| server.connect()).collect();
    let snap = wait_for(&server.stats, "all clients accepted", |s| {
        s.connections_accepted == N as u64
    });
    assert_eq!(snap.connections_closed, 0);

    drop(clients);
    wait_for(&server.stats, "all clients torn down", |s| {
        s.connections_closed == N as u64
    });

    server.stop();
}

#[test]
fn fragmented_stream_is_observed_in_full() {
    let server = start_server();

    let mut client = server.connect();
    let fragments: [&[u8]; 3] = [b"hel", b"lo", b" world\n"];
    let total: u64 = fragments.iter().map(|f| f.len() as u64).sum();
    for fragment in fragments {
        client.write_all(fragment).expect("send fragment");
        client.flush().expect("flush");
        // Space the fragments out so the kernel is free to deliver them as
        // separate readiness edges (or coalesce them; the total must not
        // depend on it).
        thread::sleep(Duration::from_millis(20));
    }
    drop(client);

    let snap = wait_for(&server.stats, "connection torn down", |s| {
        s.connections_closed == 1
    });
    assert_eq!(snap.bytes_read, total);
    assert_eq!(snap.connections_accepted, 1);
    assert_eq!(snap.read_errors, 0);

    server.stop();
}

#[test]
fn hello_is_observed_as_exactly_six_bytes() {
    let server = start_server();

    let mut client = server.connect();
    client.write_all(b"hello\n").expect("send hello");
    client.shutdown(Shutdown::Write).expect("shutdown write");

    let snap = wait_for(&server.stats, "teardown after hello", |s| {
        s.connections_closed == 1
    });
    assert_eq!(snap.bytes_read, 6);
    assert_eq!(snap.connections_accepted, 1);

    server.stop();
}

#[test]
fn teardown_happens_exactly_once() {
    let server = start_server();

    let mut client = server.connect();
    client.write_all(b"one and done").expect("send");
    drop(client);

    wait_for(&server.stats, "first teardown", |s| s.connections_closed == 1);

    // Give a hypothetical double-close time to show up.
    thread::sleep(Duration::from_millis(100));
    let snap = server.stats.snapshot();
    assert_eq!(snap.connections_closed, 1);
    assert_eq!(snap.connections_accepted, 1);

    server.stop();
}

#[test]
fn empty_connection_closes_with_no_bytes_observed() {
    let server = start_server();

    let client = server.connect();
    client.shutdown(Shutdown::Write).expect("shutdown write");

    let snap = wait_for(&server.stats, "empty connection torn down", |s| {
        s.connections_closed == 1
    });
    assert_eq!(snap.bytes_read, 0);
    assert_eq!(snap.connections_accepted, 1);
    assert_eq!(snap.read_errors, 0);

    server.stop();
}

#[test]
fn reactor_keeps_serving_after_a_client_disconnects() {
    let server = start_server();

    let mut first = server.connect();
    first.write_all(b"first").expect("send");
    drop(first);
    wait_for(&server.stats, "first client torn down", |s| {
        s.connections_closed == 1
    });

    let mut second = server.connect();
    second.write_all(b"second!").expect("send");
    second.shutdown(Shutdown::Write).expect("shutdown write");
    let snap = wait_for(&server.stats, "second client torn down", |s| {
        s.connections_closed == 2
    });
    assert_eq!(snap.connections_accepted, 2);
    assert_eq!(snap.bytes_read, ("first".len() + "second!".len()) as u64);

    server.stop();
}

#[test]
fn concurrent_reactors_do_not_share_counters() {
    let one = start_server();
    let two = start_server();

    let mut client = one.connect();
    client.write_all(b"only for the first").expect("send");
    client.shutdown(Shutdown::Write).expect("shutdown write");

    wait_for(&one.stats, "first reactor teardown", |s| {
        s.connections_closed == 1
    });
    let other = two.stats.snapshot();
    assert_eq!(other.connections_accepted, 0);
    assert_eq!(other.bytes_read, 0);

    one.stop();
    two.stop();
}
