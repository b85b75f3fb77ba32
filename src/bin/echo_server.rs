//! Blocking echo server: bind, accept one connection, echo until EOF.
//!
//! Deliberately straight-line teaching code: every syscall either succeeds or
//! ends the process. Note the contrast with the reactor binary, which serves
//! many connections at once but never writes anything back.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::process::exit;

use clap::Parser;

#[derive(Parser)]
#[command(about = "Blocking echo server: one connection at a time, echoes bytes back")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,
}

fn main() {
    let args = Args::parse();

    let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, args.port)) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("bind: {err}");
            exit(1);
        }
    };
    println!("bound to port {}", args.port);

    let (mut stream, peer) = match listener.accept() {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("accept: {err}");
            exit(1);
        }
    };
    println!("accepted connection from {peer}");

    let mut buf = [0u8; 1024];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                println!("connection closed");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                eprintln!("read: {err}");
                exit(1);
            }
        };
        println!("read {n} bytes: {}", String::from_utf8_lossy(&buf[..n]));
        if let Err(err) = stream.write_all(&buf[..n]) {
            eprintln!("write: {err}");
            exit(1);
        }
    }
}
