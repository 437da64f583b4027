use std::{
    io,
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
};

use bytes::{Bytes, BytesMut};
use http::{Request, Response};

use crate::{
    close::CloseCode,
    codec::encode_into,
    frame::{Frame, MAX_CONTROL_PAYLOAD},
    registry::ConnectionId,
    Result, WebSocketError,
};

/// Write side of a connection, implemented by the HTTP engine.
///
/// The engine owns the socket; `wsgate` never writes to it directly.
pub trait ResponseWriter: Send + Sync {
    /// Writes the response head and keeps the connection open afterwards.
    fn send_response(&self, response: Response<()>) -> io::Result<()>;

    /// Writes raw bytes on the connection.
    fn send_data(&self, data: Bytes) -> io::Result<()>;
}

/// A client connected over WebSocket.
///
/// Handlers receive a reference to the client for the duration of a callback. The client
/// can write server frames, which are never masked, through the engine's [`ResponseWriter`].
pub struct WebSocketClient {
    id: ConnectionId,
    remote: SocketAddr,
    request: Request<()>,
    writer: Box<dyn ResponseWriter>,
    /// Set once a Close frame has been sent.
    closed: AtomicBool,
}

impl WebSocketClient {
    pub(crate) fn new(
        id: ConnectionId,
        remote: SocketAddr,
        request: Request<()>,
        writer: Box<dyn ResponseWriter>,
    ) -> Self {
        Self {
            id,
            remote,
            request,
            writer,
            closed: AtomicBool::new(false),
        }
    }

    /// Identity of the connection, as assigned by the engine.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the peer.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// The upgrade request the connection was opened with.
    pub fn request(&self) -> &Request<()> {
        &self.request
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Serializes `frame` and writes it on the connection.
    ///
    /// A masking key on `frame`, as found on frames received from the client, is ignored.
    ///
    /// # Errors
    /// - [`WebSocketError::ControlFrameTooLarge`] if `frame` is a control frame with more than
    ///   125 bytes of payload. Nothing is written.
    /// - [`WebSocketError::ConnectionClosed`] if a Close frame was already sent.
    /// - [`WebSocketError::IoError`] if the engine fails to write.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        check_control_payload(frame)?;
        if self.is_closed() {
            return Err(WebSocketError::ConnectionClosed);
        }
        self.write_frame(frame)
    }

    /// Sends a text message.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_frame(&Frame::text(text.into()))
    }

    /// Sends a binary message.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send_frame(&Frame::binary(data))
    }

    /// Sends a Ping frame. The payload must not exceed 125 bytes.
    pub fn send_ping(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send_frame(&Frame::ping(data))
    }

    /// Sends a Pong frame, usually echoing the payload of a received Ping. The payload must
    /// not exceed 125 bytes.
    pub fn send_pong(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send_frame(&Frame::pong(data))
    }

    /// Sends a Close frame carrying `code` and `reason`.
    ///
    /// Only the first call writes anything; later ones return
    /// [`WebSocketError::ConnectionClosed`], as does any send that follows. Tearing down the
    /// socket is left to the engine, once the peer answers or the connection drops.
    ///
    /// A `reason` longer than 123 bytes is refused with
    /// [`WebSocketError::ControlFrameTooLarge`] and leaves the client open.
    pub fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        let frame = Frame::close(code, reason);
        check_control_payload(&frame)?;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(WebSocketError::ConnectionClosed);
        }
        self.write_frame(&frame)
    }

    /// Writes the handshake response through the engine.
    pub(crate) fn send_response(&self, response: Response<()>) -> Result<()> {
        self.writer.send_response(response)?;
        Ok(())
    }

    fn write_frame(&self, frame: &Frame) -> Result<()> {
        let mut buf = BytesMut::new();
        if frame.header().is_masked() {
            let unmasked = Frame::new(frame.is_fin(), frame.opcode(), frame.payload().clone());
            encode_into(&unmasked, &mut buf);
        } else {
            encode_into(frame, &mut buf);
        }
        self.writer.send_data(buf.freeze())?;
        Ok(())
    }
}

fn check_control_payload(frame: &Frame) -> Result<()> {
    if frame.opcode().is_control() && frame.payload().len() as u64 > MAX_CONTROL_PAYLOAD {
        return Err(WebSocketError::ControlFrameTooLarge);
    }
    Ok(())
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("uri", self.request.uri())
            .field("closed", &self.is_closed())
            .finish()
    }
}
