//! `tokio_util` codec adapters.
//!
//! Engines that drive their sockets through [`tokio_util::codec::Framed`] can decode client
//! frames with [`Decoder`] and write server frames with [`Encoder`], instead of feeding a
//! [`FrameParser`] by hand. Both sides share the parser's validation rules.
use bytes::{Buf, BytesMut};
use tokio_util::codec;

use crate::{
    frame::{Frame, MAX_HEAD_SIZE},
    mask::apply_mask,
    parser::{FrameParser, ParseStatus},
    Options, WebSocketError,
};

/// A combined codec that provides both encoding and decoding functionality for WebSocket frames.
pub struct Codec {
    decoder: Decoder,
    encoder: Encoder,
}

impl Codec {
    /// Creates a codec whose decoder is configured from `options`.
    pub fn new(options: &Options) -> Self {
        Self {
            decoder: Decoder::new(FrameParser::from_options(options)),
            encoder: Encoder,
        }
    }
}

impl From<(Decoder, Encoder)> for Codec {
    fn from((decoder, encoder): (Decoder, Encoder)) -> Self {
        Self { decoder, encoder }
    }
}

impl codec::Decoder for Codec {
    type Item = <Decoder as codec::Decoder>::Item;
    type Error = <Decoder as codec::Decoder>::Error;

    #[inline]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }
}

impl codec::Encoder<Frame> for Codec {
    type Error = <Encoder as codec::Encoder<Frame>>::Error;

    #[inline]
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encoder.encode(item, dst)
    }
}

/// A decoder for WebSocket frames.
///
/// Bytes are moved out of the source buffer as soon as the parser consumes them, so a partially
/// received frame lives in the parser rather than in the `Framed` read buffer.
pub struct Decoder {
    parser: FrameParser,
}

impl Decoder {
    pub fn new(parser: FrameParser) -> Self {
        Self { parser }
    }
}

impl codec::Decoder for Decoder {
    type Item = Frame;
    type Error = WebSocketError;

    /// Decodes at most one frame from `src`.
    ///
    /// # Returns
    /// - `Ok(Some(Frame))`: a frame was completed, with its payload unmasked.
    /// - `Ok(None)`: more data is needed.
    /// - `Err(WebSocketError)`: the frame violates the protocol.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let consumed = self.parser.process(src);
        src.advance(consumed);

        match self.parser.status() {
            ParseStatus::Prepare | ParseStatus::Parsing => Ok(None),
            ParseStatus::Completed => Ok(self.parser.take_frame()),
            ParseStatus::Error => Err(self
                .parser
                .take_error()
                .unwrap_or(WebSocketError::ConnectionClosed)),
        }
    }
}

/// WebSocket frame encoder.
///
/// Writes the header followed by the payload. Server frames carry no mask; a frame built with
/// [`Frame::with_mask`] has its payload masked on the way out.
pub struct Encoder;

impl codec::Encoder<Frame> for Encoder {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&frame, dst);
        Ok(())
    }
}

/// Appends the wire representation of `frame` to `dst`.
pub(crate) fn encode_into(frame: &Frame, dst: &mut BytesMut) {
    let mut header = [0; MAX_HEAD_SIZE];
    let size = frame.fmt_head(&mut header[..]);

    dst.reserve(size + frame.payload().len());
    dst.extend_from_slice(&header[..size]);

    let start = dst.len();
    dst.extend_from_slice(frame.payload());
    if let Some(mask) = frame.header().mask {
        apply_mask(&mut dst[start..], mask);
    }
}
