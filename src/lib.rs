//! # wsgate
//! Server-side implementation of the WebSocket protocol (RFC 6455) designed to live inside an
//! existing HTTP request pipeline.
//!
//! The HTTP engine keeps ownership of the sockets. `wsgate` plugs into it as an interceptor:
//! it recognises opening-handshake requests, answers them with `101 Switching Protocols`,
//! and from then on parses the WebSocket framing protocol out of whatever byte chunks the
//! engine hands over, dispatching complete frames to the application.
//!
//! The crate is sans-io. No socket is ever read or written directly; every write goes through
//! the [`ResponseWriter`] the engine supplies when a connection is prepared.
//!
//! # Features
//! The crate provides several optional features that can be enabled in your `Cargo.toml`:
//!
//! - `logging`: Routes diagnostics to the global `log` facade when no logger has been injected
//!   through [`Options::with_logger`].
//!
//! - `simd`: Uses `simdutf8` to validate text payloads when [`Options::with_utf8`] is set.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use wsgate::{Callbacks, Frame, Options, WebSocketInterceptor};
//!
//! let handler = Callbacks::new()
//!     .with_message(|client, frame| {
//!         // echo everything back
//!         client
//!             .send_frame(&Frame::new(true, frame.opcode(), frame.payload().clone()))
//!             .is_ok()
//!     })
//!     .with_close(|client| println!("{} left", client.remote()));
//!
//! let interceptor = Arc::new(WebSocketInterceptor::new(handler, Options::default()));
//! # let _ = interceptor;
//! ```
//!
//! # Memory Safety
//! - Payload lengths are checked against a configurable limit (default 1 MiB) before any
//!   buffer is reserved for them.
//! - Payload buffers only grow with the bytes that actually arrived.
//! - Frames with reserved bits, reserved opcodes or fragmented control frames are rejected.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod close;
pub mod codec;
pub mod frame;
pub mod handshake;
pub mod parser;

mod client;
mod handler;
mod interceptor;
mod logging;
mod mask;
mod options;
mod registry;

use http::StatusCode;
use thiserror::Error;

pub use client::{ResponseWriter, WebSocketClient};
pub use frame::{Frame, FrameHeader, OpCode};
pub use handler::{Callbacks, Handler};
pub use interceptor::{DataOutcome, HttpInterceptor, WebSocketInterceptor};
pub use options::Options;
pub use parser::{FrameParser, ParseStatus};
pub use registry::{ConnectionId, ConnectionRegistry};

/// The maximum allowed payload size for reading, set to 1 MiB.
///
/// Frames declaring a larger payload are rejected as soon as their length field is decoded,
/// before any memory is reserved for them.
pub const MAX_PAYLOAD_READ: usize = 1024 * 1024;

/// A result type for WebSocket operations, using `WebSocketError` as the error type.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Represents errors that can occur while upgrading or serving a WebSocket connection.
///
/// The errors fall in three groups:
///
/// - Frame errors, produced by the [`FrameParser`] when a peer sends something RFC 6455 forbids.
///   Any of them is fatal for the connection.
/// - Handshake and registry errors, produced while setting up or looking up a connection.
/// - Transport errors bubbled up from the engine's [`ResponseWriter`].
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Indicates that reserved bits in the WebSocket frame header are set. No extension is ever
    /// negotiated by this crate, so RSV1-3 must always be 0.
    #[error("Reserved bits are not zero")]
    ReservedBitsNotZero,

    /// Indicates receipt of a frame with a reserved opcode (0x3-0x7 or 0xB-0xF).
    #[error("Invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// Occurs when a control frame (ping, pong, or close) is received with the FIN bit
    /// not set. RFC 6455 requires that control frames must not be fragmented.
    #[error("Control frame must not be fragmented")]
    ControlFrameFragmented,

    /// A control frame, received or about to be sent, has a payload larger than 125 bytes.
    #[error("Control frame too large")]
    ControlFrameTooLarge,

    /// The 64-bit extended length had its most significant bit set.
    #[error("Invalid payload length")]
    InvalidPayloadLength,

    /// Occurs when a received frame's payload length exceeds the maximum configured size.
    /// This helps prevent memory exhaustion attacks.
    #[error("Frame too large")]
    FrameTooLarge,

    /// A client sent a frame without a masking key while masking is enforced.
    #[error("Client frame is not masked")]
    UnmaskedFrame,

    /// Indicates that a text frame contains invalid UTF-8 data.
    #[error("Invalid UTF-8")]
    InvalidUTF8,

    /// Occurs during handshake when the required "Sec-WebSocket-Key" header is missing from
    /// the client request.
    #[error("Sec-WebSocket-Key header is missing")]
    MissingSecWebSocketKey,

    /// Returned when attempting to send on a connection after a Close frame was sent on it.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// The engine reported activity for a connection that is not (or no longer) registered.
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// A connection identity was prepared twice.
    #[error("Connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// Wraps standard I/O errors returned by the engine's writer.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Wraps errors from the `http` crate raised while building the handshake response.
    #[error(transparent)]
    HTTPError(#[from] http::Error),
}

/// Error handed to [`Handler::on_error`] when the engine reports a transport failure.
///
/// It carries the HTTP status code the engine attached to the failure and its description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ConnectionError {
    /// Status code reported by the engine.
    pub code: StatusCode,
    /// Human readable description of `code`.
    pub message: String,
}

impl From<StatusCode> for ConnectionError {
    fn from(code: StatusCode) -> Self {
        Self {
            code,
            message: code.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_from_status() {
        let err = ConnectionError::from(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal Server Error");
        assert_eq!(err.to_string(), "500 Internal Server Error: Internal Server Error");
    }

    #[test]
    fn test_connection_error_unknown_reason() {
        let code = StatusCode::from_u16(599).unwrap();
        let err = ConnectionError::from(code);
        assert_eq!(err.message, "Unknown");
    }
}
