//! Loopback server for the integration tests.
//!
//! The server accepts one client, answers a fixed number of commands and
//! records what it parsed. `MockServer::finish` joins the thread, so a panic
//! on the server side fails the calling test.

#![allow(dead_code)]

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use respc_client::ClientConfig;
use tracing_subscriber::EnvFilter;

/// One parsed request: command name followed by its arguments.
pub type Command = Vec<Vec<u8>>;

/// Writes the reply for command number `idx`.
pub type Handler = fn(usize, &Command, &mut TcpStream);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct MockServer {
    addr: SocketAddr,
    commands: Receiver<Command>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub fn spawn(expected: usize, handler: Handler) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, commands) = mpsc::channel();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("read timeout");
            let mut frames = FrameReader::new(stream.try_clone().expect("clone"));
            for idx in 0..expected {
                let command = match frames.command() {
                    Ok(command) => command,
                    Err(_) => return,
                };
                handler(idx, &command, &mut stream);
                let _ = tx.send(command);
            }
            frames.drain();
        });

        MockServer {
            addr,
            commands,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            timeout_ms: 1000,
            connect_timeout_ms: Some(1000),
            ..ClientConfig::new(self.addr.ip().to_string(), self.addr.port())
        }
    }

    /// Joins the server and returns the commands it answered.
    ///
    /// The server keeps reading until the client hangs up, so drop the
    /// client before calling this.
    pub fn finish(self) -> Vec<Command> {
        if let Err(cause) = self.handle.join() {
            panic::resume_unwind(cause);
        }
        self.commands.try_iter().collect()
    }
}

/// Builds the expected `Command` from string literals.
pub fn command(parts: &[&str]) -> Command {
    parts.iter().map(|part| part.as_bytes().to_vec()).collect()
}

struct FrameReader {
    inner: BufReader<TcpStream>,
}

impl FrameReader {
    fn new(stream: TcpStream) -> Self {
        FrameReader {
            inner: BufReader::new(stream),
        }
    }

    fn command(&mut self) -> io::Result<Command> {
        let count = self.header(b'*')?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.header(b'$')?;
            let mut arg = vec![0u8; len + 2];
            self.inner.read_exact(&mut arg)?;
            if !arg.ends_with(b"\r\n") {
                return Err(invalid("argument without CRLF"));
            }
            arg.truncate(len);
            args.push(arg);
        }
        Ok(args)
    }

    /// Reads `<prefix><decimal>\r\n`.
    fn header(&mut self, prefix: u8) -> io::Result<usize> {
        let mut line = Vec::new();
        if self.inner.read_until(b'\n', &mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let digits = line
            .strip_prefix(&[prefix])
            .and_then(|rest| rest.strip_suffix(b"\r\n"))
            .ok_or_else(|| invalid("malformed header"))?;
        std::str::from_utf8(digits)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or_else(|| invalid("header is not a length"))
    }

    fn drain(&mut self) {
        let mut sink = [0u8; 64];
        while matches!(self.inner.read(&mut sink), Ok(n) if n > 0) {}
    }
}

fn invalid(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}

pub fn write_raw(stream: &mut TcpStream, data: &[u8]) {
    let _ = stream.write_all(data);
    let _ = stream.flush();
}

pub fn write_simple(stream: &mut TcpStream, msg: &str) {
    write_raw(stream, format!("+{}\r\n", msg).as_bytes());
}

pub fn write_error(stream: &mut TcpStream, msg: &str) {
    write_raw(stream, format!("-{}\r\n", msg).as_bytes());
}

pub fn write_integer(stream: &mut TcpStream, value: i64) {
    write_raw(stream, format!(":{}\r\n", value).as_bytes());
}

pub fn bulk_frame(data: &[u8]) -> Vec<u8> {
    let mut frame = format!("${}\r\n", data.len()).into_bytes();
    frame.extend_from_slice(data);
    frame.extend_from_slice(b"\r\n");
    frame
}

pub fn write_bulk(stream: &mut TcpStream, data: &[u8]) {
    write_raw(stream, &bulk_frame(data));
}

pub fn write_array(stream: &mut TcpStream, items: &[&[u8]]) {
    let mut frame = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        frame.extend_from_slice(&bulk_frame(item));
    }
    write_raw(stream, &frame);
}
