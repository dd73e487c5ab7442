//! # respc Sync Client
//!
//! Purpose: Provide a synchronous client for the RESP request/reply
//! protocol: one socket, one receive buffer, one request in flight.
//!
//! ## Design Principles
//! 1. **Blocking With Timeout**: Every syscall waits behind a bounded
//!    readiness check; nothing runs in the background.
//! 2. **Layered**: `Transport` moves bytes, `Session` decodes, `Connection`
//!    owns the lifecycle, `RespClient` speaks commands.
//! 3. **Typed Failures**: Every failure is a `RespError`.
//! 4. **Buffer Reuse**: Each connection keeps its receive buffer.
//!
//! ## Example
//!
//! ```no_run
//! use respc_client::{ClientConfig, Connection};
//! use respc_common::{Arg, ArrayKind};
//!
//! let mut conn = Connection::open(ClientConfig::new("127.0.0.1", 6379))?;
//! conn.send_status_command("SET", &[Arg::Str("k"), Arg::Str("v")])?;
//! let value = conn.send_bulk_command("GET", &[Arg::Str("k")])?;
//! let keys = conn.send_array_command("KEYS", &[Arg::Str("*")], ArrayKind::List)?;
//! # let _ = (value, keys);
//! # Ok::<(), respc_common::RespError>(())
//! ```

pub mod addr;
mod client;
pub mod config;
mod connection;
pub mod session;
pub mod transport;

pub use addr::{classify_host, resolve, HostKind, DEFAULT_HOST, DEFAULT_PORT};
pub use client::{KeyTtl, RespClient};
pub use config::ClientConfig;
pub use connection::Connection;
pub use session::Session;
pub use transport::{init_socket_subsystem, TcpTransport, Transport};

pub use respc_common::{
    Arg, ArrayKind, ArrayReply, ErrorKind, Reply, Request, RequestBuilder, RespError, RespResult,
};
