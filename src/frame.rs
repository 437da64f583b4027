//! # Frame
//!
//! The `frame` module implements WebSocket frames as defined in [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2).
//!
//! ### Frame Binary Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! :                     Payload Data continued ...                :
//! +---------------------------------------------------------------+
//! ```
//!
//! Incoming frames are produced by the [`FrameParser`](crate::FrameParser) with their payload
//! already unmasked. Outgoing frames are built with the constructors on [`Frame`] and written
//! unmasked, as RFC 6455 requires for server-to-client traffic.
//!
//! ```rust
//! use wsgate::frame::Frame;
//! use wsgate::close::CloseCode;
//!
//! let text = Frame::text("Hello, WebSocket!");
//! let ping = Frame::ping("are you there?");
//! let close = Frame::close(CloseCode::Normal, b"bye");
//! ```
use bytes::Bytes;

use crate::{close::CloseCode, WebSocketError};

/// Largest possible header: 2 fixed bytes, 8 bytes of extended length and a 4 byte mask.
pub(crate) const MAX_HEAD_SIZE: usize = 14;

/// Largest payload a control frame may carry.
pub(crate) const MAX_CONTROL_PAYLOAD: u64 = 125;

/// WebSocket operation code (OpCode) that determines the semantic meaning and handling of a frame.
///
/// # Data Frame OpCodes
/// - `Continuation`: Continues a fragmented message started by another data frame
/// - `Text`: Contains UTF-8 encoded text data
/// - `Binary`: Contains raw binary data
///
/// # Control Frame OpCodes
/// - `Close`: Initiates or confirms connection closure
/// - `Ping`: Tests connection liveness, requiring a `Pong` response
/// - `Pong`: Responds to a `Ping` frame
///
/// The ranges 0x3-0x7 and 0xB-0xF are reserved. Frames using them are rejected with
/// [`WebSocketError::InvalidOpCode`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Returns `true` if the `OpCode` represents a control frame (`Close`, `Ping`, or `Pong`).
    ///
    /// Control frames cannot be fragmented and carry at most 125 bytes of payload.
    pub fn is_control(&self) -> bool {
        matches!(*self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WebSocketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(WebSocketError::InvalidOpCode(value)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// Decoded header of a WebSocket frame.
///
/// The reserved bits are not represented: a header with any of them set never gets this far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Indicates if this is the final fragment in a message.
    pub fin: bool,
    /// The operation code of the frame.
    pub opcode: OpCode,
    /// The masking key sent by the client, if the MASK bit was set.
    pub mask: Option<[u8; 4]>,
    /// Declared length of the payload, in bytes.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Returns whether the MASK bit was set.
    #[inline]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Writes the wire representation of this header into `head` and returns its size.
    ///
    /// The shortest length encoding able to hold `payload_len` is used.
    ///
    /// # Panics
    /// Panics if `head` is shorter than the encoded header (at most [`MAX_HEAD_SIZE`]).
    pub(crate) fn encode(&self, head: &mut [u8]) -> usize {
        head[0] = (self.fin as u8) << 7 | u8::from(self.opcode);

        let len = self.payload_len;
        let size = if len < 126 {
            head[1] = len as u8;
            2
        } else if len < 65536 {
            head[1] = 126;
            head[2..4].copy_from_slice(&(len as u16).to_be_bytes());
            4
        } else {
            head[1] = 127;
            head[2..10].copy_from_slice(&len.to_be_bytes());
            10
        };

        if let Some(mask) = self.mask {
            head[1] |= 0x80;
            head[size..size + 4].copy_from_slice(&mask);
            size + 4
        } else {
            size
        }
    }
}

/// Represents a WebSocket frame: its header and its (unmasked) payload.
///
/// Frames handed to [`Handler::on_message`](crate::Handler::on_message) come straight out of
/// the parser. Frames sent to a client are usually built with the helper constructors:
///
/// ```rust
/// use wsgate::frame::{Frame, OpCode};
///
/// let text = Frame::text("Hello");
/// let binary = Frame::binary(vec![1, 2, 3]);
/// let fragment = Frame::new(false, OpCode::Text, "Hel");
/// assert!(!fragment.is_fin());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    /// Creates an unmasked frame.
    ///
    /// # Parameters
    /// - `fin`: Indicates if this frame is the final fragment in a message.
    /// - `opcode`: The operation code of the frame, defining its type (e.g., Text, Binary, Close).
    /// - `payload`: The frame payload data.
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader {
                fin,
                opcode,
                mask: None,
                payload_len: payload.len() as u64,
            },
            payload,
        }
    }

    pub(crate) fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Sets the masking key used when this frame is encoded.
    ///
    /// Servers never mask their frames. This exists to produce client traffic, for instance
    /// when feeding a parser in tests or when proxying.
    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.header.mask = Some(mask);
        self
    }

    /// Creates a final text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    /// Creates a final binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    /// Creates a ping frame.
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    /// Creates a pong frame, usually echoing the payload of a ping.
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    /// Creates a close frame with a close code and reason.
    pub fn close(code: CloseCode, reason: impl AsRef<[u8]>) -> Self {
        let code16 = u16::from(code);
        let reason: &[u8] = reason.as_ref();
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code16.to_be_bytes());
        payload.extend_from_slice(reason);

        Self::new(true, OpCode::Close, payload)
    }

    /// Creates a close frame with a raw payload.
    ///
    /// This method does not validate if `payload` is a valid close frame payload.
    pub fn close_raw(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Close, payload)
    }

    /// The decoded header.
    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.header.fin
    }

    /// The unmasked payload.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Checks if the frame payload is valid UTF-8.
    #[inline]
    pub fn is_utf8(&self) -> bool {
        #[cfg(feature = "simd")]
        {
            simdutf8::basic::from_utf8(&self.payload).is_ok()
        }
        #[cfg(not(feature = "simd"))]
        {
            std::str::from_utf8(&self.payload).is_ok()
        }
    }

    /// Returns the payload as a string slice, or `None` if it is not valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Extracts the close code from a Close frame's payload.
    ///
    /// Returns `None` if the payload is too short to contain a close code.
    pub fn close_code(&self) -> Option<CloseCode> {
        let code = CloseCode::from(u16::from_be_bytes(self.payload.get(0..2)?.try_into().ok()?));
        Some(code)
    }

    /// Extracts the close reason from a Close frame's payload.
    ///
    /// Returns `None` if there is no reason or it is not valid UTF-8.
    pub fn close_reason(&self) -> Option<&str> {
        std::str::from_utf8(self.payload.get(2..)?).ok()
    }

    /// Formats the frame header into `head` and returns its size.
    pub(crate) fn fmt_head(&self, head: &mut [u8]) -> usize {
        let header = FrameHeader {
            payload_len: self.payload.len() as u64,
            ..self.header
        };
        header.encode(head)
    }
}
