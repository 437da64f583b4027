use std::sync::Arc;

use crate::{logging::Logger, MAX_PAYLOAD_READ};

/// Configuration options for a [`WebSocketInterceptor`](crate::WebSocketInterceptor).
///
/// `Options` governs how incoming frames are validated and where diagnostics go.
///
/// # Example
/// ```rust
/// use wsgate::Options;
///
/// let options = Options::default()
///     .with_max_payload_read(64 * 1024)
///     .with_utf8();
/// ```
#[derive(Clone, Default)]
pub struct Options {
    /// Maximum allowed payload size for incoming frames, in bytes.
    ///
    /// A frame declaring a longer payload fails to parse as soon as its length is known, and the
    /// connection is torn down. Nothing is allocated for the oversized payload.
    ///
    /// Default: 1 MiB (1,048,576 bytes) as defined in [`MAX_PAYLOAD_READ`]
    pub max_payload_read: Option<usize>,

    /// Accept frames without a masking key.
    ///
    /// RFC 6455 requires every client-to-server frame to be masked, and by default an unmasked
    /// frame is a protocol error. Some non-browser peers skip masking; enable this to accept them.
    ///
    /// Default: `false`
    pub accept_unmasked: bool,

    /// Flag to determine whether incoming text frames should be validated for UTF-8 encoding.
    ///
    /// Only complete (FIN) text frames are checked, since a fragment may split a code point.
    ///
    /// Default: `false`
    pub check_utf8: bool,

    pub(crate) logger: Logger,
}

impl Options {
    /// Sets the maximum allowed payload size for incoming frames.
    ///
    /// # Parameters
    /// - `size`: The maximum payload size in bytes.
    pub fn with_max_payload_read(self, size: usize) -> Self {
        Self {
            max_payload_read: Some(size),
            ..self
        }
    }

    /// Accepts client frames that carry no masking key.
    pub fn with_unmasked_frames(self) -> Self {
        Self {
            accept_unmasked: true,
            ..self
        }
    }

    /// Enables UTF-8 validation for incoming text frames.
    ///
    /// A text frame with invalid UTF-8 is then treated like a malformed frame and the
    /// connection is closed.
    pub fn with_utf8(self) -> Self {
        Self {
            check_utf8: true,
            ..self
        }
    }

    /// Sends the crate's diagnostics to `logger` instead of the global `log` facade.
    ///
    /// # Example
    /// ```rust
    /// use std::sync::Arc;
    /// use log::{Log, Metadata, Record};
    /// use wsgate::Options;
    ///
    /// struct Stderr;
    ///
    /// impl Log for Stderr {
    ///     fn enabled(&self, _: &Metadata) -> bool { true }
    ///     fn log(&self, record: &Record) { eprintln!("{}: {}", record.level(), record.args()) }
    ///     fn flush(&self) {}
    /// }
    ///
    /// let options = Options::default().with_logger(Arc::new(Stderr));
    /// ```
    pub fn with_logger(self, logger: Arc<dyn log::Log>) -> Self {
        Self {
            logger: Logger::new(logger),
            ..self
        }
    }

    pub(crate) fn payload_limit(&self) -> usize {
        self.max_payload_read.unwrap_or(MAX_PAYLOAD_READ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.payload_limit(), MAX_PAYLOAD_READ);
        assert!(!options.accept_unmasked);
        assert!(!options.check_utf8);
    }

    #[test]
    fn test_builders() {
        let options = Options::default()
            .with_max_payload_read(10)
            .with_unmasked_frames()
            .with_utf8();
        assert_eq!(options.payload_limit(), 10);
        assert!(options.accept_unmasked);
        assert!(options.check_utf8);
    }
}
