//! Interactive stdin REPL over the line protocol in `mmapkv::server`.
//!
//! Connects to a running `mmapkv-server`, echoing each stdin line to the
//! socket and printing the single response line that comes back. Knows
//! nothing about the engine beyond the text protocol it speaks.

use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

fn main() -> io::Result<()> {
    let addr = env::args().nth(1).unwrap_or_else(|| "127.0.0.1:6379".to_owned());
    let stream = TcpStream::connect(&addr)?;
    println!("connected to {addr}. Type GET/SET/DEL commands, or `quit` to exit.");

    let mut writer = stream.try_clone()?;
    let mut responses = BufReader::new(stream);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }

        writeln!(writer, "{trimmed}")?;
        writer.flush()?;

        let mut response = String::new();
        if responses.read_line(&mut response)? == 0 {
            println!("server closed the connection");
            break;
        }
        print!("{response}");
    }

    Ok(())
}
