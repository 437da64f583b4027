//! Resumable WebSocket frame parser.
//!
//! [`FrameParser`] turns a stream of arbitrarily sized byte chunks into frames. It keeps every
//! partial piece of state between calls, so the same frame can be delivered whole, one byte at
//! a time, or split at any offset, and the result is identical.
//!
//! A parser instance handles exactly one frame. Once it reports [`ParseStatus::Completed`] or
//! [`ParseStatus::Error`] it stops consuming input until the frame is taken or the parser is
//! reset.
//!
//! ```rust
//! use wsgate::{FrameParser, ParseStatus, OpCode};
//!
//! // "Hello" sent by a client, masked with key 37 fa 21 3d
//! let wire = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
//!
//! let mut parser = FrameParser::default();
//! assert_eq!(parser.process(&wire[..3]), 3);
//! assert_eq!(parser.status(), ParseStatus::Parsing);
//! assert_eq!(parser.process(&wire[3..]), 8);
//! assert_eq!(parser.status(), ParseStatus::Completed);
//!
//! let frame = parser.take_frame().unwrap();
//! assert_eq!(frame.opcode(), OpCode::Text);
//! assert_eq!(frame.payload().as_ref(), b"Hello");
//! ```
use bytes::BytesMut;

use crate::{
    frame::{Frame, FrameHeader, OpCode, MAX_CONTROL_PAYLOAD, MAX_HEAD_SIZE},
    mask::apply_mask_at,
    Options, WebSocketError, MAX_PAYLOAD_READ,
};

/// Progress of a [`FrameParser`] on its current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// Fewer than 2 header bytes received so far.
    Prepare,
    /// The header or the payload is still incomplete.
    Parsing,
    /// A full frame is available.
    Completed,
    /// The frame is malformed. The connection must be torn down.
    Error,
}

/// Represents the reading state of a WebSocket frame.
enum ReadState {
    /// Accumulating header bytes in `head`.
    Header,
    /// Header decoded, accumulating payload bytes.
    Payload(FrameHeader),
    /// Header and payload are both complete.
    Completed(FrameHeader),
    /// The frame was rejected.
    Error(WebSocketError),
}

/// Single-frame, resumable parser for client-to-server WebSocket traffic.
///
/// Validation performed while parsing:
/// - RSV1-3 must be zero, since no extension is ever negotiated
/// - the opcode must not be reserved
/// - control frames must have FIN set and carry at most 125 bytes
/// - the 64-bit length must have its most significant bit clear
/// - the declared length must not exceed the configured maximum
/// - frames must be masked, unless unmasked frames are accepted
///
/// Lengths are checked as soon as they are decoded, so nothing is ever allocated for an
/// oversized payload. The payload buffer grows with the bytes actually received and is
/// unmasked as it fills.
pub struct FrameParser {
    state: ReadState,
    /// Raw header bytes received so far.
    head: [u8; MAX_HEAD_SIZE],
    head_len: usize,
    /// Unmasked payload bytes received so far.
    payload: BytesMut,
    /// Maximum allowed payload size for a frame.
    max_payload_read: usize,
    /// Reject frames without a masking key.
    require_mask: bool,
}

impl Default for FrameParser {
    /// A parser enforcing masking, with a payload limit of [`MAX_PAYLOAD_READ`].
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_READ, true)
    }
}

impl FrameParser {
    /// Creates a new `FrameParser`.
    ///
    /// # Parameters
    /// - `max_payload_read`: The maximum allowed payload size, in bytes.
    /// - `require_mask`: Whether frames without a masking key are a protocol error.
    pub fn new(max_payload_read: usize, require_mask: bool) -> Self {
        Self {
            state: ReadState::Header,
            head: [0; MAX_HEAD_SIZE],
            head_len: 0,
            payload: BytesMut::new(),
            max_payload_read,
            require_mask,
        }
    }

    /// Creates a parser configured from `options`.
    pub fn from_options(options: &Options) -> Self {
        Self::new(options.payload_limit(), !options.accept_unmasked)
    }

    /// Feeds `chunk` to the parser and returns how many of its bytes were consumed.
    ///
    /// Bytes are consumed up to the end of the current frame. When a frame completes in the
    /// middle of `chunk`, the remaining bytes belong to the next frame and must be submitted
    /// again, to a fresh (or reset) parser. Nothing is consumed once the status is
    /// [`ParseStatus::Completed`] or [`ParseStatus::Error`].
    pub fn process(&mut self, chunk: &[u8]) -> usize {
        let mut consumed = 0;

        loop {
            match self.state {
                ReadState::Header => {
                    if self.head_len < 2 {
                        consumed += self.fill_head(2, &chunk[consumed..]);
                        if self.head_len < 2 {
                            return consumed;
                        }
                        if let Err(err) = self.check_prefix() {
                            self.state = ReadState::Error(err);
                            return consumed;
                        }
                    }

                    let size = self.header_size();
                    consumed += self.fill_head(size, &chunk[consumed..]);
                    if self.head_len < size {
                        return consumed;
                    }

                    self.state = match self.decode_header() {
                        Ok(header) if header.payload_len == 0 => ReadState::Completed(header),
                        Ok(header) => ReadState::Payload(header),
                        Err(err) => ReadState::Error(err),
                    };
                }
                ReadState::Payload(header) => {
                    // payload_len was checked against max_payload_read, it fits in usize
                    let remaining = header.payload_len as usize - self.payload.len();
                    let take = remaining.min(chunk.len() - consumed);

                    let start = self.payload.len();
                    self.payload
                        .extend_from_slice(&chunk[consumed..consumed + take]);
                    if let Some(mask) = header.mask {
                        apply_mask_at(&mut self.payload[start..], mask, start);
                    }
                    consumed += take;

                    if take == remaining {
                        self.state = ReadState::Completed(header);
                    }
                    return consumed;
                }
                ReadState::Completed(_) | ReadState::Error(_) => return consumed,
            }
        }
    }

    /// Returns the progress made on the current frame.
    pub fn status(&self) -> ParseStatus {
        match self.state {
            ReadState::Header if self.head_len < 2 => ParseStatus::Prepare,
            ReadState::Header | ReadState::Payload(_) => ParseStatus::Parsing,
            ReadState::Completed(_) => ParseStatus::Completed,
            ReadState::Error(_) => ParseStatus::Error,
        }
    }

    /// The decoded header, available as soon as all header bytes have arrived.
    pub fn header(&self) -> Option<&FrameHeader> {
        match &self.state {
            ReadState::Payload(header) | ReadState::Completed(header) => Some(header),
            _ => None,
        }
    }

    /// The unmasked payload, available once the frame is completed.
    pub fn payload(&self) -> Option<&[u8]> {
        match self.state {
            ReadState::Completed(_) => Some(&self.payload),
            _ => None,
        }
    }

    /// The reason the frame was rejected, when the status is [`ParseStatus::Error`].
    pub fn error(&self) -> Option<&WebSocketError> {
        match &self.state {
            ReadState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Takes the reason the frame was rejected out of the parser, leaving it reset.
    ///
    /// Returns `None`, and changes nothing, if the status is not [`ParseStatus::Error`].
    pub fn take_error(&mut self) -> Option<WebSocketError> {
        match std::mem::replace(&mut self.state, ReadState::Header) {
            ReadState::Error(err) => {
                self.reset();
                Some(err)
            }
            state => {
                self.state = state;
                None
            }
        }
    }

    /// Takes the completed frame out of the parser, leaving it ready for the next frame.
    ///
    /// Returns `None` if no frame is completed.
    pub fn take_frame(&mut self) -> Option<Frame> {
        let ReadState::Completed(header) = self.state else {
            return None;
        };

        let payload = self.payload.split().freeze();
        self.reset();

        Some(Frame::from_parts(header, payload))
    }

    /// Consumes the parser, returning the completed frame if there is one.
    pub fn into_frame(mut self) -> Option<Frame> {
        self.take_frame()
    }

    /// Discards any progress, including a pending error.
    pub fn reset(&mut self) {
        self.state = ReadState::Header;
        self.head_len = 0;
        self.payload.clear();
    }

    /// Copies bytes from `input` into the header buffer until it holds `target` bytes.
    fn fill_head(&mut self, target: usize, input: &[u8]) -> usize {
        let take = target.saturating_sub(self.head_len).min(input.len());
        self.head[self.head_len..self.head_len + take].copy_from_slice(&input[..take]);
        self.head_len += take;
        take
    }

    /// Total header size, known once the first two bytes are in.
    fn header_size(&self) -> usize {
        let extra = match self.head[1] & 0x7F {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let masked = self.head[1] & 0x80 != 0;
        2 + extra + masked as usize * 4
    }

    /// Validates everything the first two bytes can tell.
    fn check_prefix(&self) -> Result<(), WebSocketError> {
        let fin = self.head[0] & 0b1000_0000 != 0;

        if self.head[0] & 0b0111_0000 != 0 {
            return Err(WebSocketError::ReservedBitsNotZero);
        }

        let opcode = OpCode::try_from(self.head[0] & 0b0000_1111)?;
        let masked = self.head[1] & 0b1000_0000 != 0;
        let length_code = self.head[1] & 0x7F;

        if opcode.is_control() {
            if !fin {
                return Err(WebSocketError::ControlFrameFragmented);
            }
            if u64::from(length_code) > MAX_CONTROL_PAYLOAD {
                return Err(WebSocketError::ControlFrameTooLarge);
            }
        }

        if self.require_mask && !masked {
            return Err(WebSocketError::UnmaskedFrame);
        }

        Ok(())
    }

    /// Decodes the complete header held in `head`.
    fn decode_header(&self) -> Result<FrameHeader, WebSocketError> {
        let fin = self.head[0] & 0b1000_0000 != 0;
        let opcode = OpCode::try_from(self.head[0] & 0b0000_1111)?;
        let masked = self.head[1] & 0b1000_0000 != 0;

        let (payload_len, offset) = match self.head[1] & 0x7F {
            126 => (u64::from(u16::from_be_bytes([self.head[2], self.head[3]])), 4),
            127 => {
                let mut len = [0u8; 8];
                len.copy_from_slice(&self.head[2..10]);
                (u64::from_be_bytes(len), 10)
            }
            code => (u64::from(code), 2),
        };

        if payload_len & (1 << 63) != 0 {
            return Err(WebSocketError::InvalidPayloadLength);
        }
        if payload_len > self.max_payload_read as u64 {
            return Err(WebSocketError::FrameTooLarge);
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            key.copy_from_slice(&self.head[offset..offset + 4]);
            Some(key)
        } else {
            None
        };

        Ok(FrameHeader {
            fin,
            opcode,
            mask,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::apply_mask;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn encode(frame: &Frame) -> Vec<u8> {
        let mut head = [0u8; MAX_HEAD_SIZE];
        let size = frame.fmt_head(&mut head);
        let mut out = head[..size].to_vec();
        let mut payload = frame.payload().to_vec();
        if let Some(mask) = frame.header().mask {
            apply_mask(&mut payload, mask);
        }
        out.extend_from_slice(&payload);
        out
    }

    fn payload_of(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn lenient() -> FrameParser {
        FrameParser::new(MAX_PAYLOAD_READ, false)
    }

    fn feed_bytewise(parser: &mut FrameParser, wire: &[u8]) -> usize {
        let mut total = 0;
        for byte in wire {
            total += parser.process(std::slice::from_ref(byte));
        }
        total
    }

    #[test]
    fn test_rfc_masked_hello() {
        let wire = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let mut parser = FrameParser::default();

        assert_eq!(parser.process(&wire), wire.len());
        assert_eq!(parser.status(), ParseStatus::Completed);
        assert_eq!(parser.payload(), Some(&b"Hello"[..]));

        let header = parser.header().unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, OpCode::Text);
        assert_eq!(header.mask, Some(MASK));
        assert_eq!(header.payload_len, 5);

        let frame = parser.into_frame().unwrap();
        assert_eq!(frame.as_str(), Some("Hello"));
    }

    #[test]
    fn test_into_frame_incomplete() {
        let mut parser = FrameParser::default();
        parser.process(&[0x81, 0x85, 0x37]);
        assert!(parser.into_frame().is_none());
    }

    #[test]
    fn test_rfc_unmasked_fragments() {
        // "Hel" + "lo", unmasked, as in RFC 6455 section 5.7
        let first = [0x01, 0x03, 0x48, 0x65, 0x6c];
        let second = [0x80, 0x02, 0x6c, 0x6f];

        let mut parser = lenient();
        assert_eq!(parser.process(&first), 5);
        let frame = parser.take_frame().unwrap();
        assert!(!frame.is_fin());
        assert_eq!(frame.opcode(), OpCode::Text);
        assert_eq!(frame.payload().as_ref(), b"Hel");

        assert_eq!(parser.process(&second), 4);
        let frame = parser.take_frame().unwrap();
        assert!(frame.is_fin());
        assert_eq!(frame.opcode(), OpCode::Continuation);
        assert_eq!(frame.payload().as_ref(), b"lo");
    }

    #[test]
    fn test_byte_at_a_time_across_length_encodings() {
        let sizes = [0, 1, 125, 126, 127, 65535, 65536, 70000];

        for &len in &sizes {
            for masked in [true, false] {
                let mut frame = Frame::binary(payload_of(len));
                if masked {
                    frame = frame.with_mask(MASK);
                }
                let wire = encode(&frame);

                let mut parser = lenient();
                assert_eq!(parser.status(), ParseStatus::Prepare);
                assert_eq!(feed_bytewise(&mut parser, &wire), wire.len());
                assert_eq!(parser.status(), ParseStatus::Completed, "len {len}");

                let parsed = parser.take_frame().unwrap();
                assert_eq!(parsed.opcode(), OpCode::Binary);
                assert_eq!(parsed.header().payload_len, len as u64);
                assert_eq!(parsed.header().is_masked(), masked);
                assert_eq!(parsed.payload().as_ref(), &payload_of(len)[..], "len {len}");
            }
        }
    }

    #[test]
    fn test_control_frames_byte_at_a_time() {
        for frame in [
            Frame::ping("ping"),
            Frame::pong(""),
            Frame::close(crate::close::CloseCode::Away, "bye"),
        ] {
            let wire = encode(&frame.clone().with_mask(MASK));
            let mut parser = FrameParser::default();
            assert_eq!(feed_bytewise(&mut parser, &wire), wire.len());

            let parsed = parser.take_frame().unwrap();
            assert_eq!(parsed.opcode(), frame.opcode());
            assert_eq!(parsed.payload(), frame.payload());
        }
    }

    #[test]
    fn test_split_at_every_offset() {
        let frame = Frame::text(payload_of(300)).with_mask(MASK);
        let wire = encode(&frame);

        let mut whole = FrameParser::default();
        assert_eq!(whole.process(&wire), wire.len());
        let expected = whole.take_frame().unwrap();

        for split in 0..=wire.len() {
            let mut parser = FrameParser::default();
            let mut consumed = 0;
            if split > 0 {
                consumed += parser.process(&wire[..split]);
            }
            if split < wire.len() {
                consumed += parser.process(&wire[split..]);
            }
            assert_eq!(consumed, wire.len(), "split at {split}");
            assert_eq!(parser.status(), ParseStatus::Completed, "split at {split}");
            assert_eq!(parser.take_frame().unwrap(), expected, "split at {split}");
        }
    }

    #[test]
    fn test_stops_at_frame_boundary() {
        let first = encode(&Frame::text("one").with_mask(MASK));
        let second = encode(&Frame::binary("two").with_mask(MASK));
        let mut chunk = first.clone();
        chunk.extend_from_slice(&second);

        let mut parser = FrameParser::default();
        assert_eq!(parser.process(&chunk), first.len());
        assert_eq!(parser.status(), ParseStatus::Completed);

        // completed parsers do not consume
        assert_eq!(parser.process(&chunk[first.len()..]), 0);

        assert_eq!(parser.take_frame().unwrap().payload().as_ref(), b"one");
        assert_eq!(parser.status(), ParseStatus::Prepare);
        assert_eq!(parser.process(&chunk[first.len()..]), second.len());
        assert_eq!(parser.take_frame().unwrap().payload().as_ref(), b"two");
    }

    #[test]
    fn test_status_progression() {
        let wire = encode(&Frame::text("abc").with_mask(MASK));
        let mut parser = FrameParser::default();

        assert_eq!(parser.process(&wire[..1]), 1);
        assert_eq!(parser.status(), ParseStatus::Prepare);
        assert!(parser.header().is_none());

        assert_eq!(parser.process(&wire[1..4]), 3);
        assert_eq!(parser.status(), ParseStatus::Parsing);
        assert!(parser.header().is_none());

        assert_eq!(parser.process(&wire[4..7]), 3);
        assert_eq!(parser.status(), ParseStatus::Parsing);
        assert_eq!(parser.header().map(|h| h.payload_len), Some(3));
        assert!(parser.payload().is_none());

        assert_eq!(parser.process(&wire[7..]), 2);
        assert_eq!(parser.status(), ParseStatus::Completed);
        assert_eq!(parser.payload(), Some(&b"abc"[..]));
    }

    fn assert_rejects(parser: &mut FrameParser, wire: &[u8], check: fn(&WebSocketError) -> bool) {
        parser.process(wire);
        assert_eq!(parser.status(), ParseStatus::Error);
        assert!(check(parser.error().unwrap()), "got {:?}", parser.error());
        assert!(parser.payload().is_none());

        // stays in error whatever comes next
        assert_eq!(parser.process(&[0x81, 0x80, 0, 0, 0, 0]), 0);
        assert_eq!(parser.status(), ParseStatus::Error);
    }

    #[test]
    fn test_reserved_bits_rejected() {
        for rsv in [0x40, 0x20, 0x10, 0x70] {
            let wire: [u8; 6] = [0x81 | rsv, 0x80, 1, 2, 3, 4];
            assert_rejects(&mut FrameParser::default(), &wire, |e| {
                matches!(e, WebSocketError::ReservedBitsNotZero)
            });
        }
    }

    #[test]
    fn test_reserved_opcodes_rejected() {
        for opcode in [0x3, 0x7, 0xB, 0xF] {
            let wire: [u8; 6] = [0x80 | opcode, 0x80, 1, 2, 3, 4];
            assert_rejects(&mut FrameParser::default(), &wire, |e| {
                matches!(e, WebSocketError::InvalidOpCode(_))
            });
        }
    }

    #[test]
    fn test_fragmented_control_rejected() {
        // ping without FIN
        let wire = [0x09, 0x80, 1, 2, 3, 4];
        assert_rejects(&mut FrameParser::default(), &wire, |e| {
            matches!(e, WebSocketError::ControlFrameFragmented)
        });
    }

    #[test]
    fn test_large_control_rejected() {
        let wire = [0x88, 0x80 | 126, 0x00, 0x80];
        assert_rejects(&mut FrameParser::default(), &wire, |e| {
            matches!(e, WebSocketError::ControlFrameTooLarge)
        });
    }

    #[test]
    fn test_length_msb_rejected() {
        let mut wire = vec![0x82, 0x80 | 127];
        wire.extend_from_slice(&(1u64 << 63).to_be_bytes());
        wire.extend_from_slice(&MASK);
        assert_rejects(&mut FrameParser::default(), &wire, |e| {
            matches!(e, WebSocketError::InvalidPayloadLength)
        });
    }

    #[test]
    fn test_oversized_payload_rejected_before_payload() {
        let mut parser = FrameParser::new(1024, true);
        let mut wire = vec![0x82, 0x80 | 127];
        wire.extend_from_slice(&(u32::MAX as u64).to_be_bytes());
        wire.extend_from_slice(&MASK);

        // only the header is sent
        assert_rejects(&mut parser, &wire, |e| matches!(e, WebSocketError::FrameTooLarge));
    }

    #[test]
    fn test_payload_at_limit_accepted() {
        let mut parser = FrameParser::new(200, true);
        let wire = encode(&Frame::binary(payload_of(200)).with_mask(MASK));
        assert_eq!(parser.process(&wire), wire.len());
        assert_eq!(parser.status(), ParseStatus::Completed);

        let mut parser = FrameParser::new(199, true);
        parser.process(&wire);
        assert!(matches!(parser.error(), Some(WebSocketError::FrameTooLarge)));
    }

    #[test]
    fn test_unmasked_rejected_when_required() {
        let wire = encode(&Frame::text("plain"));
        assert_rejects(&mut FrameParser::default(), &wire, |e| {
            matches!(e, WebSocketError::UnmaskedFrame)
        });

        let mut parser = FrameParser::from_options(&Options::default().with_unmasked_frames());
        assert_eq!(parser.process(&wire), wire.len());
        assert_eq!(parser.payload(), Some(&b"plain"[..]));
    }

    #[test]
    fn test_reset_clears_error() {
        let mut parser = FrameParser::default();
        parser.process(&[0xF1, 0x80]);
        assert_eq!(parser.status(), ParseStatus::Error);

        parser.reset();
        assert_eq!(parser.status(), ParseStatus::Prepare);
        let wire = encode(&Frame::text("ok").with_mask(MASK));
        assert_eq!(parser.process(&wire), wire.len());
        assert_eq!(parser.status(), ParseStatus::Completed);
    }

    #[test]
    fn test_take_error() {
        let mut parser = FrameParser::default();
        parser.process(&[0x83, 0x80]);
        assert!(matches!(
            parser.take_error(),
            Some(WebSocketError::InvalidOpCode(3))
        ));
        assert_eq!(parser.status(), ParseStatus::Prepare);

        // a parser in progress keeps its state
        let mut parser = FrameParser::default();
        parser.process(&[0x81]);
        assert!(parser.take_error().is_none());
        assert_eq!(parser.process(&[0x80, 1, 2, 3, 4]), 5);
        assert_eq!(parser.status(), ParseStatus::Completed);
    }
}
