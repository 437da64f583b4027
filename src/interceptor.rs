//! The bridge between an HTTP engine and the WebSocket protocol.
//!
//! The engine routes a request to [`WebSocketInterceptor`] when
//! [`HttpInterceptor::is_interceptor_for_request`] accepts it, then reports every event of the
//! connection through the other [`HttpInterceptor`] methods:
//!
//! 1. [`on_prepare`](HttpInterceptor::on_prepare) once, to answer the handshake;
//! 2. [`on_data`](HttpInterceptor::on_data) for each chunk of bytes read from the socket;
//! 3. exactly one of [`on_error`](HttpInterceptor::on_error) or
//!    [`on_closed`](HttpInterceptor::on_closed) when the connection ends.
use std::net::SocketAddr;

use http::{Request, StatusCode};

use crate::{
    client::{ResponseWriter, WebSocketClient},
    frame::OpCode,
    handler::Handler,
    handshake::{build_handshake_response, is_upgrade_request},
    logging::{debug, error, warning},
    parser::{FrameParser, ParseStatus},
    registry::{ConnectionId, ConnectionRegistry, EntryHandle},
    ConnectionError, Options, Result, WebSocketError,
};

/// What the engine should do with the connection after [`HttpInterceptor::on_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    /// Keep reading.
    Continue,
    /// Close the connection. The peer sent a Close frame or the application asked for it.
    Close,
}

/// Contract between an HTTP engine and a protocol taking over its connections.
///
/// All methods are synchronous and never block on I/O. An `Err` from
/// [`on_prepare`](Self::on_prepare) or [`on_data`](Self::on_data) means the connection cannot
/// go on; the engine should close it and report the closure.
pub trait HttpInterceptor: Send + Sync {
    /// Returns `true` if this interceptor takes over `request`.
    fn is_interceptor_for_request(&self, request: &Request<()>) -> bool;

    /// Answers the request and registers the connection.
    ///
    /// Returns `Ok(false)` if the application rejected the connection.
    fn on_prepare(
        &self,
        id: ConnectionId,
        remote: SocketAddr,
        request: Request<()>,
        writer: Box<dyn ResponseWriter>,
    ) -> Result<bool>;

    /// Processes bytes received on the connection.
    fn on_data(&self, id: ConnectionId, chunk: &[u8]) -> Result<DataOutcome>;

    /// The connection failed with `status`. No further events follow for `id`.
    fn on_error(&self, id: ConnectionId, status: StatusCode) -> Result<()>;

    /// The connection was closed. No further events follow for `id`.
    fn on_closed(&self, id: ConnectionId) -> Result<()>;
}

/// Serves WebSocket connections on behalf of an HTTP engine.
///
/// The interceptor owns every live connection in its [`ConnectionRegistry`]. Handlers are
/// given a reference to the connection's client for the duration of a callback only.
///
/// Complete frames are dispatched one at a time, fragments included: messages split over
/// several frames are not reassembled. Pings are passed to the handler like any other frame
/// and answering them is up to the application.
pub struct WebSocketInterceptor<H> {
    handler: H,
    options: Options,
    registry: ConnectionRegistry,
}

impl<H: Handler> WebSocketInterceptor<H> {
    pub fn new(handler: H, options: Options) -> Self {
        Self {
            registry: ConnectionRegistry::new(options.logger.clone()),
            handler,
            options,
        }
    }

    /// The live connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Finds the entry for `id`. An engine reporting events for an unknown connection is a
    /// bug on its side, logged as an error.
    fn resolve(&self, id: ConnectionId, event: &str) -> Result<EntryHandle> {
        self.registry.lookup(id).ok_or_else(|| {
            error!(
                self.options.logger,
                "{event}: connection {id} is not registered"
            );
            WebSocketError::UnknownConnection(id)
        })
    }

    /// Takes the entry for `id` out of the registry. Only the caller that gets it may notify
    /// the handler; locking it afterwards waits for a callback still running on the entry.
    fn take(&self, id: ConnectionId) -> Result<EntryHandle> {
        self.registry
            .remove(id)
            .ok_or(WebSocketError::UnknownConnection(id))
    }
}

impl<H: Handler> HttpInterceptor for WebSocketInterceptor<H> {
    fn is_interceptor_for_request(&self, request: &Request<()>) -> bool {
        let accepted = is_upgrade_request(request);
        debug!(
            self.options.logger,
            "{} {} is {}a websocket request",
            request.method(),
            request.uri(),
            if accepted { "" } else { "not " }
        );
        accepted
    }

    fn on_prepare(
        &self,
        id: ConnectionId,
        remote: SocketAddr,
        request: Request<()>,
        writer: Box<dyn ResponseWriter>,
    ) -> Result<bool> {
        let response = build_handshake_response(&request)?;

        // registered before the 101 is written: a duplicate id is never answered
        let handle = self
            .registry
            .register(WebSocketClient::new(id, remote, request, writer))?;
        let entry = handle.lock();

        if let Err(err) = entry.client.send_response(response) {
            warning!(self.options.logger, "connection {id}: handshake failed: {err}");
            drop(entry);
            drop(handle);
            self.registry.unregister(id);
            return Err(err);
        }

        debug!(
            self.options.logger,
            "connection {id} from {remote} upgraded on {}",
            entry.client.request().uri()
        );
        let accepted = self.handler.on_connect(&entry.client);
        if !accepted {
            debug!(self.options.logger, "connection {id} rejected by handler");
        }

        Ok(accepted)
    }

    fn on_data(&self, id: ConnectionId, chunk: &[u8]) -> Result<DataOutcome> {
        if chunk.is_empty() {
            return Ok(DataOutcome::Continue);
        }

        let handle = self.resolve(id, "on_data")?;
        let mut entry = handle.lock();
        let entry = &mut *entry;

        // torn down while this call waited for the lock
        if entry.removed {
            error!(
                self.options.logger,
                "on_data: connection {id} is not registered"
            );
            return Err(WebSocketError::UnknownConnection(id));
        }

        let mut rest = chunk;
        loop {
            let parser = entry
                .parser
                .get_or_insert_with(|| FrameParser::from_options(&self.options));
            let consumed = parser.process(rest);
            rest = &rest[consumed..];

            match parser.status() {
                ParseStatus::Prepare | ParseStatus::Parsing => return Ok(DataOutcome::Continue),
                ParseStatus::Error => {
                    let err = parser
                        .take_error()
                        .unwrap_or(WebSocketError::ConnectionClosed);
                    entry.parser = None;
                    warning!(self.options.logger, "connection {id}: {err}");
                    return Err(err);
                }
                ParseStatus::Completed => {
                    let frame = parser.take_frame();
                    entry.parser = None;
                    let Some(frame) = frame else {
                        return Ok(DataOutcome::Continue);
                    };

                    if frame.opcode() == OpCode::Close {
                        debug!(
                            self.options.logger,
                            "connection {id}: peer closed ({:?}, {:?})",
                            frame.close_code(),
                            frame.close_reason()
                        );
                        return Ok(DataOutcome::Close);
                    }

                    if self.options.check_utf8
                        && frame.opcode() == OpCode::Text
                        && frame.is_fin()
                        && !frame.is_utf8()
                    {
                        warning!(self.options.logger, "connection {id}: invalid UTF-8 text");
                        return Err(WebSocketError::InvalidUTF8);
                    }

                    debug!(
                        self.options.logger,
                        "connection {id}: {:?} frame, fin={}, {} bytes",
                        frame.opcode(),
                        frame.is_fin(),
                        frame.payload().len()
                    );

                    if !frame.payload().is_empty()
                        && !self.handler.on_message(&entry.client, &frame)
                    {
                        return Ok(DataOutcome::Close);
                    }

                    if rest.is_empty() {
                        return Ok(DataOutcome::Continue);
                    }
                }
            }
        }
    }

    fn on_error(&self, id: ConnectionId, status: StatusCode) -> Result<()> {
        let handle = self.take(id)?;
        let error = ConnectionError::from(status);
        debug!(self.options.logger, "connection {id} failed: {error}");

        let mut entry = handle.lock();
        entry.removed = true;
        entry.parser = None;
        self.handler.on_error(&entry.client, &error);
        Ok(())
    }

    fn on_closed(&self, id: ConnectionId) -> Result<()> {
        let handle = self.take(id)?;
        debug!(self.options.logger, "connection {id} closed");

        let mut entry = handle.lock();
        entry.removed = true;
        entry.parser = None;
        self.handler.on_close(&entry.client);
        Ok(())
    }
}
