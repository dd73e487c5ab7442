//! # Buffered Session
//!
//! Purpose: Pair one transport with a fixed-capacity receive buffer and
//! decode exactly one reply per request from it.
//!
//! ## Design Principles
//! 1. **Refill Only When Drained**: The socket is read only after every
//!    buffered byte has been consumed; nothing is discarded to make room.
//!    Refills land in spare capacity, never in a zeroed copy.
//! 2. **Left-to-Right Consumption**: Bytes leave the buffer through
//!    `advance`/`split_to`, so there are no hand-kept head/tail indices.
//! 3. **Bounded Accumulation**: Lines and fixed reads stop at `max_length`.
//! 4. **Request Alignment**: `operate` clears the buffer before each send.
//!
//! ## Reply Grammar
//!
//! ```text
//! +<line>\r\n              status
//! -<line>\r\n              error  -> RespError::Server
//! :<int>\r\n               integer
//! $<len>\r\n<len bytes>\r\n bulk   ($-1 = no value)
//! *<count>\r\n<bulk>...     array  (*-1 = no value)
//! ```

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use respc_common::reply::{PREFIX_ARRAY, PREFIX_BULK, PREFIX_ERROR, PREFIX_INTEGER, PREFIX_STATUS};
use respc_common::{
    parse_integer, parse_length, ArrayKind, ArrayReply, Reply, Request, RespError, RespResult,
};
use tracing::{debug, trace, warn};

use crate::transport::Transport;

/// Transport plus receive buffer for one connected socket.
#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    // Unread bytes of the current refill window.
    buffer: BytesMut,
    capacity: usize,
    max_length: usize,
    timeout: Duration,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, capacity: usize, max_length: usize, timeout: Duration) -> Self {
        Session {
            transport,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            max_length,
            timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Bytes received but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any unread bytes so the next reply starts at a clean buffer.
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            debug!(discarded = self.buffer.len(), "dropping unread reply bytes");
        }
        self.buffer.clear();
    }

    /// Sends the whole request, one readiness-checked chunk at a time.
    pub fn send_request(&mut self, request: &Request) -> RespResult<()> {
        let bytes = request.as_bytes();
        trace!(bytes = bytes.len(), "send request");
        let mut offset = 0;
        while offset < bytes.len() {
            offset += self.transport.send_some(&bytes[offset..], self.timeout)?;
        }
        Ok(())
    }

    /// Reset, send, then decode exactly one reply with `decode`.
    pub fn operate<R>(
        &mut self,
        request: &Request,
        decode: impl FnOnce(&mut Self) -> RespResult<R>,
    ) -> RespResult<R> {
        self.reset();
        self.send_request(request)?;
        decode(self)
    }

    fn refill(&mut self) -> RespResult<()> {
        debug_assert!(self.buffer.is_empty(), "refill with unread bytes");
        self.buffer.clear();
        self.buffer.reserve(self.capacity);
        let window = &mut self.buffer.spare_capacity_mut()[..self.capacity];
        let n = self.transport.recv_some(window, self.timeout)?;
        debug_assert!(n <= self.capacity);
        // SAFETY: `Transport` implementors initialize the first `n` bytes of
        // the window they were handed, and `n` never exceeds its length.
        unsafe { self.buffer.set_len(n) };
        Ok(())
    }

    fn fill_if_empty(&mut self) -> RespResult<()> {
        if self.buffer.is_empty() {
            self.refill()?;
        }
        Ok(())
    }

    /// Next single byte.
    pub fn read_prefix(&mut self) -> RespResult<u8> {
        self.fill_if_empty()?;
        Ok(self.buffer.get_u8())
    }

    /// Consumes exactly `\r\n`.
    pub fn read_crlf(&mut self) -> RespResult<()> {
        for expected in [b'\r', b'\n'] {
            self.fill_if_empty()?;
            let found = self.buffer.get_u8();
            if found != expected {
                debug!(found, expected, "illegal line terminator");
                return Err(RespError::protocol(format!(
                    "expected {:?}, found {:?}",
                    expected as char, found as char
                )));
            }
        }
        Ok(())
    }

    /// Bytes up to, not including, the next `\r`.
    pub fn read_line(&mut self) -> RespResult<BytesMut> {
        let mut line = BytesMut::new();
        loop {
            self.fill_if_empty()?;
            match self.buffer.iter().position(|&b| b == b'\r') {
                Some(pos) => {
                    if line.len() + pos > self.max_length {
                        return Err(self.too_big());
                    }
                    line.extend_from_slice(&self.buffer[..pos]);
                    self.buffer.advance(pos);
                    return Ok(line);
                }
                None => {
                    line.extend_from_slice(&self.buffer);
                    self.buffer.clear();
                    if line.len() > self.max_length {
                        return Err(self.too_big());
                    }
                }
            }
        }
    }

    /// Exactly `len` bytes, across as many refills as needed.
    pub fn read_fixed(&mut self, len: usize) -> RespResult<Bytes> {
        if len > self.max_length {
            return Err(self.too_big());
        }
        if self.buffer.len() >= len {
            return Ok(self.buffer.split_to(len).freeze());
        }

        let mut out = BytesMut::with_capacity(len);
        while out.len() < len {
            self.fill_if_empty()?;
            let take = (len - out.len()).min(self.buffer.len());
            out.extend_from_slice(&self.buffer[..take]);
            self.buffer.advance(take);
        }
        Ok(out.freeze())
    }

    fn too_big(&self) -> RespError {
        debug!(limit = self.max_length, "reply exceeds length bound");
        RespError::TooBig {
            limit: self.max_length,
        }
    }

    fn read_header(&mut self) -> RespResult<BytesMut> {
        let line = self.read_line()?;
        self.read_crlf()?;
        Ok(line)
    }

    fn read_server_error(&mut self) -> RespError {
        match self.read_header() {
            Ok(line) => {
                let message = line.freeze();
                warn!(message = %String::from_utf8_lossy(&message), "server error");
                RespError::Server(message)
            }
            Err(err) => err,
        }
    }

    /// Reads the prefix and checks it, turning `-` into a server error.
    fn expect_prefix(&mut self, expected: u8) -> RespResult<()> {
        let prefix = self.read_prefix()?;
        if prefix == expected {
            return Ok(());
        }
        if prefix == PREFIX_ERROR {
            return Err(self.read_server_error());
        }
        debug!(prefix, expected, "illegal reply prefix");
        Err(RespError::protocol(format!(
            "unexpected prefix {:?}, wanted {:?}",
            prefix as char, expected as char
        )))
    }

    /// Status line bytes, not required to be UTF-8.
    pub fn read_status(&mut self) -> RespResult<Bytes> {
        self.expect_prefix(PREFIX_STATUS)?;
        Ok(self.read_header()?.freeze())
    }

    pub fn read_integer(&mut self) -> RespResult<i64> {
        self.expect_prefix(PREFIX_INTEGER)?;
        let line = self.read_header()?;
        parse_integer(&line)
    }

    /// Bulk payload; `NullOrAbsent` for `$-1`.
    pub fn read_bulk(&mut self) -> RespResult<Bytes> {
        self.read_optional_bulk()?.ok_or(RespError::NullOrAbsent)
    }

    fn read_optional_bulk(&mut self) -> RespResult<Option<Bytes>> {
        self.expect_prefix(PREFIX_BULK)?;
        self.read_bulk_body()
    }

    fn read_bulk_body(&mut self) -> RespResult<Option<Bytes>> {
        let header = self.read_header()?;
        let len = match parse_length(&header)? {
            Some(len) => len,
            None => return Ok(None),
        };
        let payload = self.read_fixed(len)?;
        self.read_crlf()?;
        Ok(Some(payload))
    }

    /// Array of bulks collected per `kind`; `NullOrAbsent` for `*-1`.
    ///
    /// A null element is reported only after the whole array has been
    /// consumed, so the session stays request-aligned.
    pub fn read_array(&mut self, kind: ArrayKind) -> RespResult<ArrayReply> {
        self.expect_prefix(PREFIX_ARRAY)?;
        let header = self.read_header()?;
        let count = parse_length(&header)?.ok_or(RespError::NullOrAbsent)?;

        let mut items = ArrayReply::new(kind, count.min(1024));
        let mut saw_null = false;
        for _ in 0..count {
            match self.read_optional_bulk()? {
                Some(item) => items.push(item),
                None => saw_null = true,
            }
        }
        if saw_null {
            return Err(RespError::NullOrAbsent);
        }
        Ok(items)
    }

    /// Any reply shape; error replies come back as `Reply::Error`.
    pub fn read_reply(&mut self) -> RespResult<Reply> {
        let prefix = self.read_prefix()?;
        match prefix {
            PREFIX_STATUS => Ok(Reply::Status(self.read_header()?.freeze())),
            PREFIX_ERROR => Ok(Reply::Error(self.read_header()?.freeze())),
            PREFIX_INTEGER => {
                let line = self.read_header()?;
                Ok(Reply::Integer(parse_integer(&line)?))
            }
            PREFIX_BULK => Ok(Reply::Bulk(self.read_bulk_body()?)),
            PREFIX_ARRAY => {
                let header = self.read_header()?;
                let count = match parse_length(&header)? {
                    Some(count) => count,
                    None => return Ok(Reply::Array(None)),
                };
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let prefix = self.read_prefix()?;
                    if prefix != PREFIX_BULK {
                        return Err(RespError::protocol(format!(
                            "array element prefix {:?}",
                            prefix as char
                        )));
                    }
                    items.push(self.read_bulk_body()?);
                }
                Ok(Reply::Array(Some(items)))
            }
            other => {
                debug!(prefix = other, "illegal reply prefix");
                Err(RespError::protocol(format!(
                    "unknown reply prefix {:?}",
                    other as char
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::mem::MaybeUninit;

    /// Scripted transport: replays chunks, at most `max_chunk` bytes per
    /// receive, and times out once the script is exhausted.
    struct ScriptedTransport {
        inbound: VecDeque<u8>,
        max_chunk: usize,
        sent: Vec<u8>,
        recv_calls: usize,
        offered: Vec<usize>,
    }

    impl ScriptedTransport {
        fn new(inbound: &[u8], max_chunk: usize) -> Self {
            ScriptedTransport {
                inbound: inbound.iter().copied().collect(),
                max_chunk,
                sent: Vec::new(),
                recv_calls: 0,
                offered: Vec::new(),
            }
        }
    }

    // SAFETY: `recv_some` writes every byte it reports.
    unsafe impl Transport for ScriptedTransport {
        fn send_some(&mut self, buf: &[u8], _timeout: Duration) -> RespResult<usize> {
            // Accept at most three bytes to exercise partial writes.
            let n = buf.len().min(3);
            self.sent.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn recv_some(
            &mut self,
            buf: &mut [MaybeUninit<u8>],
            _timeout: Duration,
        ) -> RespResult<usize> {
            self.offered.push(buf.len());
            if self.inbound.is_empty() {
                return Err(RespError::Timeout);
            }
            self.recv_calls += 1;
            let n = buf.len().min(self.max_chunk).min(self.inbound.len());
            for slot in buf.iter_mut().take(n) {
                slot.write(self.inbound.pop_front().expect("scripted byte"));
            }
            Ok(n)
        }
    }

    fn session(inbound: &[u8], max_chunk: usize) -> Session<ScriptedTransport> {
        Session::new(
            ScriptedTransport::new(inbound, max_chunk),
            1024,
            64_000,
            Duration::from_millis(100),
        )
    }

    fn bulk_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = format!("${}\r\n", payload.len()).into_bytes();
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\r\n");
        frame
    }

    #[test]
    fn sends_whole_request_in_chunks() {
        let mut session = session(b"+OK\r\n", 1024);
        let request = Request::from_args(&[b"SET", b"k", b"v"]);
        let status = session.operate(&request, |s| s.read_status()).unwrap();
        assert_eq!(status, "OK");
        assert_eq!(session.transport().sent, request.as_bytes());
    }

    #[test]
    fn bulk_decodes_identically_regardless_of_chunking() {
        let payload: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
        let frame = bulk_frame(&payload);

        let mut single = session(&frame, usize::MAX);
        let mut trickle = session(&frame, 1);
        let a = single.read_bulk().unwrap();
        let b = trickle.read_bulk().unwrap();
        assert_eq!(a, payload);
        assert_eq!(a, b);
        assert_eq!(single.transport().recv_calls, 1);
        assert_eq!(trickle.transport().recv_calls, frame.len());
        assert_eq!(trickle.pending(), 0);
    }

    #[test]
    fn large_bulk_spans_refills_and_consumes_trailer() {
        let payload = vec![b'x'; 5000];
        let mut frame = bulk_frame(&payload);
        frame.extend_from_slice(b":7\r\n");

        let mut session = session(&frame, usize::MAX);
        let bulk = session.read_bulk().unwrap();
        assert_eq!(bulk.len(), 5000);
        assert!(session.transport().recv_calls >= 5);
        // The trailing CRLF was consumed; the next reply starts cleanly.
        assert_eq!(session.read_integer().unwrap(), 7);
    }

    #[test]
    fn null_bulk_is_absent_without_waiting_for_payload() {
        let mut session = session(b"$-1\r\n", 1024);
        let err = session.read_bulk().unwrap_err();
        assert!(err.is_null());
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn empty_bulk_is_valid() {
        let mut session = session(b"$0\r\n\r\n", 1024);
        assert_eq!(session.read_bulk().unwrap(), Bytes::new());
    }

    #[test]
    fn negative_bulk_length_is_protocol_error() {
        let mut session = session(b"$-5\r\n", 1024);
        assert!(matches!(session.read_bulk(), Err(RespError::Protocol(_))));
    }

    #[test]
    fn error_reply_short_circuits_every_shape() {
        let frame = b"-ERR wrong type\r\n";
        let mut s = session(frame, 1024);
        assert!(matches!(s.read_status(), Err(RespError::Server(ref m)) if m == "ERR wrong type"));
        let mut s = session(frame, 1024);
        assert!(matches!(s.read_integer(), Err(RespError::Server(_))));
        let mut s = session(frame, 1024);
        assert!(matches!(s.read_bulk(), Err(RespError::Server(_))));
        let mut s = session(frame, 1024);
        assert!(matches!(s.read_array(ArrayKind::List), Err(RespError::Server(_))));
    }

    #[test]
    fn status_and_error_text_keep_raw_bytes() {
        let mut s = session(b"-ERR \xffbad\r\n", 1024);
        let err = s.read_status().unwrap_err();
        assert!(matches!(err, RespError::Server(ref m) if m == &b"ERR \xffbad"[..]));

        let mut s = session(b"+\xfe\x00ok\r\n-\xc3\x28\r\n", 1024);
        assert_eq!(s.read_status().unwrap(), &b"\xfe\x00ok"[..]);
        assert_eq!(
            s.read_reply().unwrap(),
            Reply::Error(Bytes::from_static(b"\xc3\x28"))
        );
    }

    #[test]
    fn unknown_prefix_is_protocol_error() {
        for prefix in [b'!', b'A', b'\r', b'0', b'%'] {
            let frame = [prefix, b'1', b'\r', b'\n'];
            let mut s = session(&frame, 1024);
            assert!(matches!(s.read_reply(), Err(RespError::Protocol(_))));
            let mut s = session(&frame, 1024);
            assert!(matches!(s.read_status(), Err(RespError::Protocol(_))));
        }
    }

    #[test]
    fn mismatched_shape_is_protocol_error() {
        let mut s = session(b":1\r\n", 1024);
        assert!(matches!(s.read_status(), Err(RespError::Protocol(_))));
    }

    #[test]
    fn bad_terminator_is_protocol_error() {
        let mut s = session(b"+OK\rX", 1024);
        assert!(matches!(s.read_status(), Err(RespError::Protocol(_))));
    }

    #[test]
    fn array_keeps_order_and_duplicates() {
        let frame = b"*3\r\n$1\r\nb\r\n$1\r\na\r\n$1\r\nb\r\n";
        let mut s = session(frame, 2);
        let list = s.read_array(ArrayKind::List).unwrap().into_list().unwrap();
        assert_eq!(list, vec![Bytes::from("b"), Bytes::from("a"), Bytes::from("b")]);

        let mut s = session(frame, 2);
        let set = s.read_array(ArrayKind::Set).unwrap().into_set();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn array_sentinels() {
        let mut s = session(b"*0\r\n", 1024);
        assert!(s.read_array(ArrayKind::List).unwrap().is_empty());

        let mut s = session(b"*-1\r\n", 1024);
        assert!(s.read_array(ArrayKind::List).unwrap_err().is_null());

        let mut s = session(b"*-3\r\n", 1024);
        assert!(matches!(s.read_array(ArrayKind::Set), Err(RespError::Protocol(_))));
    }

    #[test]
    fn null_array_element_consumes_whole_reply() {
        let mut s = session(b"*2\r\n$-1\r\n$1\r\na\r\n:5\r\n", 1024);
        assert!(s.read_array(ArrayKind::List).unwrap_err().is_null());
        assert_eq!(s.read_integer().unwrap(), 5);
    }

    #[test]
    fn generic_reply_keeps_positional_nulls() {
        let mut s = session(b"*3\r\n$1\r\na\r\n$-1\r\n$0\r\n\r\n", 1);
        let reply = s.read_reply().unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![Some(Bytes::from("a")), None, Some(Bytes::new())]))
        );
    }

    #[test]
    fn generic_reply_shapes() {
        let mut s = session(b"+PONG\r\n-ERR x\r\n:-3\r\n$-1\r\n*-1\r\n", 4);
        assert_eq!(s.read_reply().unwrap(), Reply::Status("PONG".into()));
        assert_eq!(s.read_reply().unwrap(), Reply::Error("ERR x".into()));
        assert_eq!(s.read_reply().unwrap(), Reply::Integer(-3));
        assert_eq!(s.read_reply().unwrap(), Reply::Bulk(None));
        assert_eq!(s.read_reply().unwrap(), Reply::Array(None));
    }

    #[test]
    fn line_longer_than_bound_is_too_big() {
        let mut long = b"+".to_vec();
        long.extend(std::iter::repeat(b'a').take(300));
        long.extend_from_slice(b"\r\n");
        let mut s = Session::new(
            ScriptedTransport::new(&long, 64),
            64,
            100,
            Duration::from_millis(10),
        );
        assert!(matches!(s.read_status(), Err(RespError::TooBig { limit: 100 })));
    }

    #[test]
    fn fixed_read_longer_than_bound_is_too_big() {
        let mut s = Session::new(
            ScriptedTransport::new(&bulk_frame(&[0u8; 200]), 64),
            64,
            100,
            Duration::from_millis(10),
        );
        assert!(matches!(s.read_bulk(), Err(RespError::TooBig { limit: 100 })));
    }

    #[test]
    fn every_refill_offers_the_configured_window() {
        let payload = vec![b'y'; 3000];
        let mut frame = bulk_frame(&payload);
        frame.extend_from_slice(b"+OK\r\n");

        let mut s = session(&frame, 700);
        assert_eq!(s.read_bulk().unwrap().len(), 3000);
        assert_eq!(s.read_status().unwrap(), "OK");
        let offered = &s.transport().offered;
        assert!(offered.len() >= 5);
        assert!(offered.iter().all(|&len| len == 1024));
    }

    #[test]
    fn exhausted_peer_times_out() {
        let mut s = session(b"$10\r\nabc", 1024);
        assert!(matches!(s.read_bulk(), Err(RespError::Timeout)));
    }

    #[test]
    fn operate_discards_leftover_bytes() {
        let mut s = session(b":1\r\n:2\r\n", 1024);
        let request = Request::from_args(&[b"INCR", b"n"]);
        assert_eq!(s.operate(&request, |s| s.read_integer()).unwrap(), 1);
        assert_eq!(s.pending(), 4);
        s.reset();
        assert_eq!(s.pending(), 0);
    }
}
