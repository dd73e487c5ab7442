//! # Connection Engine
//!
//! Purpose: One long-lived client handle: connect/disconnect lifecycle, the
//! four typed operate entry points, and the last-error slot.
//!
//! ## Design Principles
//! 1. **One Request In Flight**: Every operate call is reset, send, decode.
//! 2. **No Retries**: Failures are returned as they happen.
//! 3. **Error Memory**: The last failure (and server message) stays readable.
//! 4. **Not Shared**: `&mut self` everywhere; one handle per thread.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Ready --disconnect()--> Disconnected
//!                                 |
//!                                 +--err--> Disconnected
//! ```
//!
//! After `Timeout`, `ConnectFailure`, `Protocol` or `TooBig` the receive
//! buffer position is undefined; callers must reconnect before reuse.

use std::borrow::Cow;
use std::collections::HashSet;
use std::net::SocketAddr;

use bytes::Bytes;
use respc_common::{
    Arg, ArrayKind, ArrayReply, ErrorKind, Reply, Request, RespError, RespResult,
};
use tracing::debug;

use crate::addr::resolve;
use crate::config::ClientConfig;
use crate::session::Session;
use crate::transport::TcpTransport;

/// Synchronous connection to one server.
#[derive(Debug)]
pub struct Connection {
    config: ClientConfig,
    session: Option<Session<TcpTransport>>,
    last_error: Option<ErrorKind>,
    server_error: Option<Bytes>,
}

impl Connection {
    /// Creates a disconnected handle.
    pub fn new(config: ClientConfig) -> Self {
        Connection {
            config,
            session: None,
            last_error: None,
            server_error: None,
        }
    }

    /// Creates a handle and connects it to the configured host and port.
    pub fn open(config: ClientConfig) -> RespResult<Self> {
        let mut conn = Connection::new(config);
        let host = conn.config.host.clone();
        let port = conn.config.port;
        conn.connect(&host, port)?;
        Ok(conn)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects to `host`/`port`, dropping any previous session first.
    ///
    /// An empty host means `localhost`; port zero means 6379.
    pub fn connect(&mut self, host: &str, port: u16) -> RespResult<()> {
        self.disconnect();

        let result = resolve(host, port).and_then(|addr| {
            debug!(%addr, "connecting to server");
            TcpTransport::connect(addr, self.config.connect_timeout())
        });
        let transport = self.record(result)?;

        debug!(peer = %transport.peer_addr(), "connected to server");
        self.session = Some(Session::new(
            transport,
            self.config.effective_buffer_capacity(),
            self.config.effective_max_length(),
            self.config.timeout(),
        ));
        Ok(())
    }

    /// Closes the socket; a no-op when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(peer = %session.transport().peer_addr(), "disconnected from server");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.transport().peer_addr())
    }

    /// Kind of the most recent failure, cleared by the next success.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Message of the most recent server error reply, as sent.
    pub fn last_server_error(&self) -> Option<&[u8]> {
        self.server_error.as_deref()
    }

    /// Describes `kind`, using the server's own text for server errors.
    pub fn error_message(&self, kind: ErrorKind) -> Cow<'_, str> {
        match (kind, self.server_error.as_deref()) {
            (ErrorKind::Server, Some(message)) => String::from_utf8_lossy(message),
            _ => Cow::Borrowed(kind.description()),
        }
    }

    /// Writes `request` without reading a reply.
    ///
    /// The reply stays in the socket. Collect it with [`Connection::read_reply`]
    /// or reconnect; otherwise the next operate call decodes it as its own.
    pub fn send(&mut self, request: &Request) -> RespResult<()> {
        let result = match self.session.as_mut() {
            Some(session) => session.send_request(request),
            None => Err(RespError::NotConnected),
        };
        self.record(result)
    }

    /// Decodes one reply of any shape without sending anything first.
    pub fn read_reply(&mut self) -> RespResult<Reply> {
        let result = match self.session.as_mut() {
            Some(session) => session.read_reply(),
            None => Err(RespError::NotConnected),
        };
        self.record(result)
    }

    pub fn operate_status(&mut self, request: &Request) -> RespResult<Bytes> {
        self.operate(request, |s| s.read_status())
    }

    pub fn operate_integer(&mut self, request: &Request) -> RespResult<i64> {
        self.operate(request, |s| s.read_integer())
    }

    /// Bulk payload; `$-1` fails with [`RespError::NullOrAbsent`].
    pub fn operate_bulk(&mut self, request: &Request) -> RespResult<Bytes> {
        self.operate(request, |s| s.read_bulk())
    }

    pub fn operate_array(&mut self, request: &Request, kind: ArrayKind) -> RespResult<ArrayReply> {
        self.operate(request, |s| s.read_array(kind))
    }

    pub fn operate_list(&mut self, request: &Request) -> RespResult<Vec<Bytes>> {
        match self.operate_array(request, ArrayKind::List)? {
            ArrayReply::List(items) => Ok(items),
            ArrayReply::Set(items) => Ok(items.into_iter().collect()),
        }
    }

    pub fn operate_set(&mut self, request: &Request) -> RespResult<HashSet<Bytes>> {
        Ok(self.operate_array(request, ArrayKind::Set)?.into_set())
    }

    /// Decodes whatever shape the server sends.
    ///
    /// Error replies are returned as `Reply::Error`, not as `Err`.
    pub fn execute(&mut self, request: &Request) -> RespResult<Reply> {
        self.operate(request, |s| s.read_reply())
    }

    pub fn send_status_command(&mut self, name: &str, args: &[Arg<'_>]) -> RespResult<Bytes> {
        self.operate_status(&Request::command(name, args))
    }

    pub fn send_integer_command(&mut self, name: &str, args: &[Arg<'_>]) -> RespResult<i64> {
        self.operate_integer(&Request::command(name, args))
    }

    pub fn send_bulk_command(&mut self, name: &str, args: &[Arg<'_>]) -> RespResult<Bytes> {
        self.operate_bulk(&Request::command(name, args))
    }

    pub fn send_array_command(
        &mut self,
        name: &str,
        args: &[Arg<'_>],
        kind: ArrayKind,
    ) -> RespResult<ArrayReply> {
        self.operate_array(&Request::command(name, args), kind)
    }

    fn operate<R>(
        &mut self,
        request: &Request,
        decode: impl FnOnce(&mut Session<TcpTransport>) -> RespResult<R>,
    ) -> RespResult<R> {
        let result = match self.session.as_mut() {
            Some(session) => session.operate(request, decode),
            None => Err(RespError::NotConnected),
        };
        self.record(result)
    }

    fn record<R>(&mut self, result: RespResult<R>) -> RespResult<R> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => {
                self.last_error = Some(err.kind());
                if let RespError::Server(message) = err {
                    self.server_error = Some(message.clone());
                }
            }
        }
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
