use clap::Parser;

use echoplex::listener;
use echoplex::metrics;
use echoplex::reactor::Reactor;

#[derive(Parser)]
#[command(about = "Edge-triggered single-threaded TCP server: accepts, reads, logs")]
struct Args {
    /// Port number or service name to listen on
    port: String,
}

fn main() {
    let args = Args::parse();

    let listener = match listener::bind(&args.port) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("echoplex: {err}");
            std::process::exit(1);
        }
    };

    // The shutdown handle is kept alive but never fired: this binary serves
    // until the process is killed.
    let (mut reactor, _shutdown) = match Reactor::new(listener) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("echoplex: {err}");
            std::process::exit(1);
        }
    };

    match reactor.local_addr() {
        Ok(addr) => eprintln!("echoplex: listening on {addr}"),
        Err(_) => eprintln!("echoplex: listening"),
    }
    metrics::spawn_reporter(reactor.stats());

    if let Err(err) = reactor.run() {
        eprintln!("echoplex: event loop failed: {err}");
        std::process::exit(1);
    }
}
