//! # Request Encoder
//!
//! Purpose: Serialize one command invocation into the array-of-bulk-strings
//! envelope, once, into an immutable buffer.
//!
//! ## Design Principles
//! 1. **Builder Pattern**: Declare the count, then append arguments in order.
//! 2. **Caller Contract**: The declared count is trusted; nothing verifies it.
//! 3. **Binary-Safe**: Arguments are raw bytes; only lengths are textual.
//! 4. **Freeze Once**: `build()` hands out a cheaply clonable `Bytes`.
//!
//! ## Wire Shape
//!
//! ```text
//! *<count>\r\n
//! $<len(arg_0)>\r\n<arg_0>\r\n
//! ...
//! $<len(arg_n)>\r\n<arg_n>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Fractional digits used for floating-point arguments.
pub const FLOAT_PRECISION: usize = 6;

/// One already-serialized command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    bytes: Bytes,
}

impl Request {
    /// Starts a request that will carry `arg_count` arguments (command name included).
    pub fn builder(arg_count: usize) -> RequestBuilder {
        RequestBuilder::new(arg_count)
    }

    /// Encodes a request whose count is the slice length.
    pub fn from_args(args: &[&[u8]]) -> Self {
        let mut builder = RequestBuilder::new(args.len());
        for arg in args {
            builder.push_bytes(arg);
        }
        builder.build()
    }

    /// Encodes `name` followed by typed arguments.
    pub fn command(name: &str, args: &[Arg<'_>]) -> Self {
        let mut builder = RequestBuilder::new(args.len() + 1);
        builder.push_str(name);
        for arg in args {
            builder.push_arg(arg);
        }
        builder.build()
    }

    /// Serialized bytes, ready for the socket.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the request, returning the frozen buffer.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// A typed argument accepted by the consumer-facing command calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Bytes(&'a [u8]),
    Str(&'a str),
    Int(i64),
    Float(f64),
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(value: &'a [u8]) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Arg<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Str(value)
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(value: &'a String) -> Self {
        Arg::Str(value.as_str())
    }
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg<'_> {
    fn from(value: i32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<f64> for Arg<'_> {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

/// Incremental encoder behind [`Request::builder`].
#[derive(Debug)]
pub struct RequestBuilder {
    buf: BytesMut,
}

impl RequestBuilder {
    fn new(arg_count: usize) -> Self {
        let mut buf = BytesMut::with_capacity(16 + arg_count * 16);
        buf.put_u8(b'*');
        push_decimal(&mut buf, arg_count as u64, false);
        buf.put_slice(b"\r\n");
        RequestBuilder { buf }
    }

    /// Appends a binary-safe argument.
    pub fn push_bytes(&mut self, arg: &[u8]) -> &mut Self {
        self.buf.reserve(arg.len() + 16);
        self.buf.put_u8(b'$');
        push_decimal(&mut self.buf, arg.len() as u64, false);
        self.buf.put_slice(b"\r\n");
        self.buf.put_slice(arg);
        self.buf.put_slice(b"\r\n");
        self
    }

    pub fn push_str(&mut self, arg: &str) -> &mut Self {
        self.push_bytes(arg.as_bytes())
    }

    /// Appends a base-10 integer with a leading `-` when negative.
    pub fn push_int(&mut self, arg: i64) -> &mut Self {
        let mut digits = BytesMut::with_capacity(20);
        push_decimal(&mut digits, arg.unsigned_abs(), arg < 0);
        self.push_bytes(&digits)
    }

    pub fn push_uint(&mut self, arg: u64) -> &mut Self {
        let mut digits = BytesMut::with_capacity(20);
        push_decimal(&mut digits, arg, false);
        self.push_bytes(&digits)
    }

    /// Appends a fixed-point float with [`FLOAT_PRECISION`] fractional digits.
    pub fn push_float(&mut self, arg: f64) -> &mut Self {
        let text = format_float(arg);
        self.push_bytes(text.as_bytes())
    }

    pub fn push_arg(&mut self, arg: &Arg<'_>) -> &mut Self {
        match *arg {
            Arg::Bytes(bytes) => self.push_bytes(bytes),
            Arg::Str(text) => self.push_str(text),
            Arg::Int(value) => self.push_int(value),
            Arg::Float(value) => self.push_float(value),
        }
    }

    /// Freezes the buffer into a [`Request`].
    pub fn build(&mut self) -> Request {
        Request {
            bytes: self.buf.split().freeze(),
        }
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        format!("{:.*}", FLOAT_PRECISION, value)
    }
}

fn push_decimal(out: &mut BytesMut, mut value: u64, negative: bool) {
    // Digits are produced in reverse into a stack buffer.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    if negative {
        out.put_u8(b'-');
    }
    for idx in (0..len).rev() {
        out.put_u8(buf[idx]);
    }
}
