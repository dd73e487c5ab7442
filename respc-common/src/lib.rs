//! # respc Common
//!
//! Purpose: Protocol-level building blocks shared by the synchronous client:
//! the error taxonomy, the request encoder, and the reply model.
//!
//! ## Design Principles
//! 1. **Socket-Free**: Nothing here touches the network.
//! 2. **Typed Failures**: Every failure is a `RespError` variant.
//! 3. **Bit-Exact Framing**: Requests are always `*N` arrays of `$len` bulks.

pub mod error;
pub mod reply;
pub mod request;

pub use error::{ErrorKind, RespError, RespResult};
pub use reply::{parse_integer, parse_length, ArrayKind, ArrayReply, Reply};
pub use request::{Arg, Request, RequestBuilder};
