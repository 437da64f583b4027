//! Live WebSocket connections, keyed by the identity the engine assigns them.
//!
//! ## Semantics
//!
//! - An identity can only be registered once at a time.
//! - An entry exists from a successful handshake until the connection is reported closed or
//!   failed, and is removed exactly once.
//! - Lookups hand out the entry itself, so the map lock is never held while a handler runs.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    client::WebSocketClient,
    logging::{debug, error, Logger},
    parser::FrameParser,
    Result, WebSocketError,
};

/// Opaque identity of a connection.
///
/// Identities are chosen by the engine. [`ConnectionId::next`] hands out process-wide unique
/// values for engines that have no identity of their own.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw value of the identity.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Per-connection state.
pub(crate) struct Entry {
    pub(crate) client: WebSocketClient,
    /// Parser for the frame in flight. Created on the first bytes of a frame and dropped once
    /// the frame is complete.
    pub(crate) parser: Option<FrameParser>,
    /// Set under the entry lock once the connection has been torn down. A caller that looked
    /// the entry up before the removal finds it set after acquiring the lock.
    pub(crate) removed: bool,
}

/// Shared handle to an entry. Locking it serializes the callbacks of one connection.
pub(crate) type EntryHandle = Arc<Mutex<Entry>>;

/// Registry of live connections.
///
/// Distinct connections can be looked up and served concurrently; each entry has its own lock.
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, EntryHandle>>,
    logger: Logger,
}

impl ConnectionRegistry {
    pub(crate) fn new(logger: Logger) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            logger,
        }
    }

    /// Registers `client` under its identity, with no parser, and returns the new entry.
    ///
    /// Returns [`WebSocketError::AlreadyRegistered`] if the identity is taken. Of several
    /// concurrent calls for the same identity, exactly one succeeds.
    pub(crate) fn register(&self, client: WebSocketClient) -> Result<EntryHandle> {
        let id = client.id();
        let mut entries = self.entries.write();

        if entries.contains_key(&id) {
            return Err(WebSocketError::AlreadyRegistered(id));
        }

        let handle = Arc::new(Mutex::new(Entry {
            client,
            parser: None,
            removed: false,
        }));
        entries.insert(id, handle.clone());
        debug!(self.logger, "registered connection {id}");

        Ok(handle)
    }

    /// Returns the entry for `id`, if registered.
    pub(crate) fn lookup(&self, id: ConnectionId) -> Option<EntryHandle> {
        self.entries.read().get(&id).cloned()
    }

    /// Takes the entry for `id` out of the map and returns it.
    ///
    /// Of several concurrent calls for the same identity, exactly one gets the entry. The
    /// others, like any call for an unknown identity, get `None` and log an error.
    pub(crate) fn remove(&self, id: ConnectionId) -> Option<EntryHandle> {
        let Some(handle) = self.entries.write().remove(&id) else {
            error!(self.logger, "unregister: connection {id} is not registered");
            return None;
        };
        debug!(self.logger, "unregistered connection {id}");
        Some(handle)
    }

    /// Removes the entry for `id` and returns its client.
    ///
    /// Removing an unknown identity is logged and returns `None`. If a callback of the
    /// connection is still running on another thread, the entry is dropped when it finishes
    /// and `None` is returned.
    pub(crate) fn unregister(&self, id: ConnectionId) -> Option<WebSocketClient> {
        let handle = self.remove(id)?;
        handle.lock().removed = true;

        Arc::try_unwrap(handle)
            .ok()
            .map(|entry| entry.into_inner().client)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.read().contains_key(&id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(Logger::default())
    }
}
