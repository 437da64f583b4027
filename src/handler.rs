use crate::{client::WebSocketClient, frame::Frame, ConnectionError};

/// Application callbacks for WebSocket connections.
///
/// Every method has a default that does nothing, so an implementation only overrides what it
/// needs. Callbacks run synchronously on the engine's thread, and the callbacks of one
/// connection never run concurrently. The client reference is only valid for the call.
pub trait Handler: Send + Sync {
    /// Called once the `101 Switching Protocols` response has been sent.
    ///
    /// Returning `false` rejects the connection; the engine is expected to tear it down.
    fn on_connect(&self, client: &WebSocketClient) -> bool {
        let _ = client;
        true
    }

    /// Called for every complete non-Close frame with a non-empty payload.
    ///
    /// Fragments are delivered one frame at a time, as they arrive. Returning `false` asks
    /// the engine to close the connection.
    fn on_message(&self, client: &WebSocketClient, frame: &Frame) -> bool {
        let _ = (client, frame);
        true
    }

    /// Called once when the engine reports a transport failure. The connection is gone
    /// afterwards.
    fn on_error(&self, client: &WebSocketClient, error: &ConnectionError) {
        let _ = (client, error);
    }

    /// Called once when the engine reports the connection closed.
    fn on_close(&self, client: &WebSocketClient) {
        let _ = client;
    }
}

type ConnectFn = Box<dyn Fn(&WebSocketClient) -> bool + Send + Sync>;
type MessageFn = Box<dyn Fn(&WebSocketClient, &Frame) -> bool + Send + Sync>;
type ErrorFn = Box<dyn Fn(&WebSocketClient, &ConnectionError) + Send + Sync>;
type CloseFn = Box<dyn Fn(&WebSocketClient) + Send + Sync>;

/// A [`Handler`] built from closures.
///
/// Unset callbacks behave like the trait defaults. Setting the same callback twice keeps the
/// last one. Once handed to a [`WebSocketInterceptor`](crate::WebSocketInterceptor) the set
/// can no longer change.
///
/// # Example
/// ```rust
/// use wsgate::Callbacks;
///
/// let handler = Callbacks::new()
///     .with_connect(|client| client.request().uri().path() == "/chat")
///     .with_message(|client, frame| {
///         println!("{}: {:?}", client.remote(), frame.as_str());
///         true
///     });
/// ```
#[derive(Default)]
pub struct Callbacks {
    connect: Option<ConnectFn>,
    message: Option<MessageFn>,
    error: Option<ErrorFn>,
    close: Option<CloseFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback run after the handshake. Returning `false` rejects the connection.
    pub fn with_connect<F>(self, f: F) -> Self
    where
        F: Fn(&WebSocketClient) -> bool + Send + Sync + 'static,
    {
        Self {
            connect: Some(Box::new(f)),
            ..self
        }
    }

    /// Sets the callback run for each received frame. Returning `false` closes the connection.
    pub fn with_message<F>(self, f: F) -> Self
    where
        F: Fn(&WebSocketClient, &Frame) -> bool + Send + Sync + 'static,
    {
        Self {
            message: Some(Box::new(f)),
            ..self
        }
    }

    /// Sets the callback run when the connection fails.
    pub fn with_error<F>(self, f: F) -> Self
    where
        F: Fn(&WebSocketClient, &ConnectionError) + Send + Sync + 'static,
    {
        Self {
            error: Some(Box::new(f)),
            ..self
        }
    }

    /// Sets the callback run when the connection is closed.
    pub fn with_close<F>(self, f: F) -> Self
    where
        F: Fn(&WebSocketClient) + Send + Sync + 'static,
    {
        Self {
            close: Some(Box::new(f)),
            ..self
        }
    }
}

impl Handler for Callbacks {
    fn on_connect(&self, client: &WebSocketClient) -> bool {
        self.connect.as_ref().map_or(true, |f| f(client))
    }

    fn on_message(&self, client: &WebSocketClient, frame: &Frame) -> bool {
        self.message.as_ref().map_or(true, |f| f(client, frame))
    }

    fn on_error(&self, client: &WebSocketClient, error: &ConnectionError) {
        if let Some(f) = &self.error {
            f(client, error);
        }
    }

    fn on_close(&self, client: &WebSocketClient) {
        if let Some(f) = &self.close {
            f(client);
        }
    }
}
