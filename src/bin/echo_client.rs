//! Blocking echo client: send `hello\n`, print whatever comes back until EOF.

use std::io::{Read, Write, stdout};
use std::net::{Shutdown, TcpStream};
use std::process::exit;

use clap::Parser;

#[derive(Parser)]
#[command(about = "Blocking echo client: sends hello, prints the reply stream")]
struct Args {
    /// Server host or address
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 5000)]
    port: u16,
}

fn main() {
    let args = Args::parse();

    let mut stream = match TcpStream::connect((args.host.as_str(), args.port)) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("connect: {err}");
            exit(1);
        }
    };

    if let Err(err) = stream.write_all(b"hello\n") {
        eprintln!("write: {err}");
        exit(1);
    }
    // Nothing more to say; let the server see EOF once it has echoed.
    if let Err(err) = stream.shutdown(Shutdown::Write) {
        eprintln!("shutdown: {err}");
        exit(1);
    }

    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let mut out = stdout();
                if out.write_all(&buf[..n]).and_then(|_| out.flush()).is_err() {
                    exit(1);
                }
            }
            Err(err) => {
                eprintln!("read: {err}");
                exit(1);
            }
        }
    }
}
