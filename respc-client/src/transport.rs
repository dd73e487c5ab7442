//! # Socket Transport
//!
//! Purpose: Own one TCP socket and expose timeout-bounded send/receive, each
//! preceded by a `poll(2)` readiness check.
//!
//! ## Design Principles
//! 1. **Blocking Connect, Then Non-Blocking I/O**: The handshake completes
//!    before the socket switches mode and timeouts come into play.
//! 2. **Per-Syscall Window**: The timeout is re-armed before every syscall;
//!    a slow multi-chunk transfer never hits an aggregate deadline.
//! 3. **Strategy Pattern**: `Transport` lets the session run over anything
//!    that can move bytes, which keeps decoding testable without sockets.
//!
//! ## Failure Mapping
//!
//! ```text
//! poll() == 0            -> Timeout
//! poll() <  0            -> ConnectFailure
//! send()/recv() <= 0     -> ConnectFailure
//! socket() fails         -> NoFileDescriptor
//! connect() fails        -> ConnectFailure (socket closed)
//! ```

use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::Once;
use std::time::Duration;

use respc_common::{RespError, RespResult};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, trace};

static SOCKET_SUBSYSTEM: Once = Once::new();

/// Performs process-wide socket setup exactly once.
///
/// Returns `true` only for the call that ran the setup.
pub fn init_socket_subsystem() -> bool {
    let mut first = false;
    SOCKET_SUBSYSTEM.call_once(|| {
        // Unix needs no explicit startup; the hook keeps the once-only
        // contract in one place.
        debug!("socket subsystem initialized");
        first = true;
    });
    first
}

/// Moves bytes with a bounded wait before every syscall.
///
/// # Safety
///
/// `recv_some` must initialize the first `n` bytes of `buf` before it
/// returns `Ok(n)`, and `n` must not exceed `buf.len()`. The session hands
/// out uninitialized spare capacity and trusts that count.
pub unsafe trait Transport {
    /// Waits up to `timeout` for writability, then sends once.
    ///
    /// Returns the number of bytes written, always greater than zero.
    fn send_some(&mut self, buf: &[u8], timeout: Duration) -> RespResult<usize>;

    /// Waits up to `timeout` for readability, then receives once.
    ///
    /// Returns the number of bytes read, always greater than zero.
    fn recv_some(&mut self, buf: &mut [MaybeUninit<u8>], timeout: Duration) -> RespResult<usize>;
}

/// Connected TCP socket.
#[derive(Debug)]
pub struct TcpTransport {
    socket: Socket,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Opens a stream socket for `addr`'s family and connects it.
    pub fn connect(addr: SocketAddr, connect_timeout: Option<Duration>) -> RespResult<Self> {
        init_socket_subsystem();

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|err| {
                debug!(%addr, error = %err, "fail to open socket");
                RespError::NoFileDescriptor(err)
            })?;

        let target = SockAddr::from(addr);
        let connected = match connect_timeout {
            Some(timeout) => socket.connect_timeout(&target, timeout),
            None => socket.connect(&target),
        };
        if let Err(err) = connected {
            // Dropping `socket` closes the descriptor.
            debug!(%addr, error = %err, "fail to connect server");
            return Err(RespError::ConnectFailure(err));
        }

        socket.set_keepalive(true)?;
        socket.set_nodelay(true)?;
        #[cfg(target_vendor = "apple")]
        socket.set_nosigpipe(true)?;
        socket.set_nonblocking(true)?;

        Ok(TcpTransport { socket, peer: addr })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn wait_ready(&self, events: libc::c_short, timeout: Duration) -> RespResult<()> {
        let mut pfd = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events,
            revents: 0,
        };
        let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        loop {
            // SAFETY: `pfd` is a single valid pollfd that outlives the call.
            let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
            if rc > 0 {
                return Ok(());
            }
            if rc == 0 {
                debug!(peer = %self.peer, events, "readiness check timed out");
                return Err(RespError::Timeout);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            debug!(peer = %self.peer, error = %err, "readiness check failed");
            return Err(RespError::ConnectFailure(err));
        }
    }
}

// SAFETY: `Socket::recv` initializes exactly the bytes it reports.
unsafe impl Transport for TcpTransport {
    fn send_some(&mut self, buf: &[u8], timeout: Duration) -> RespResult<usize> {
        loop {
            self.wait_ready(libc::POLLOUT, timeout)?;
            match self.socket.send(buf) {
                Ok(0) => {
                    return Err(RespError::ConnectFailure(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "server accepted no bytes",
                    )))
                }
                Ok(n) => return Ok(n),
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::Interrupted =>
                {
                    continue
                }
                Err(err) => {
                    debug!(peer = %self.peer, error = %err, "fail to write to server");
                    return Err(RespError::ConnectFailure(err));
                }
            }
        }
    }

    fn recv_some(&mut self, buf: &mut [MaybeUninit<u8>], timeout: Duration) -> RespResult<usize> {
        loop {
            self.wait_ready(libc::POLLIN, timeout)?;
            match self.socket.recv(buf) {
                Ok(0) => {
                    debug!(peer = %self.peer, "server closed connection");
                    return Err(RespError::ConnectFailure(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed connection",
                    )));
                }
                Ok(n) => {
                    trace!(peer = %self.peer, bytes = n, "recv");
                    return Ok(n);
                }
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::Interrupted =>
                {
                    continue
                }
                Err(err) => {
                    debug!(peer = %self.peer, error = %err, "fail to read from server");
                    return Err(RespError::ConnectFailure(err));
                }
            }
        }
    }
}
