use std::{fmt, sync::Arc};

use log::{Level, Log, Record};

const TARGET: &str = "wsgate";

/// Destination for the crate's diagnostics.
///
/// Records go to the injected [`Log`] implementation. Without one, they reach the global
/// `log` facade only when the `logging` feature is enabled, and are dropped otherwise.
#[derive(Clone, Default)]
pub(crate) struct Logger {
    inner: Option<Arc<dyn Log>>,
}

impl Logger {
    pub(crate) fn new(inner: Arc<dyn Log>) -> Self {
        Self { inner: Some(inner) }
    }

    pub(crate) fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(TARGET)
            .module_path_static(Some(module_path!()))
            .build();

        match &self.inner {
            Some(logger) => {
                if logger.enabled(record.metadata()) {
                    logger.log(&record);
                }
            }
            None => {
                #[cfg(feature = "logging")]
                if level <= log::max_level() && log::logger().enabled(record.metadata()) {
                    log::logger().log(&record);
                }
            }
        }
    }
}

macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(log::Level::Debug, format_args!($($arg)+))
    };
}

macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(log::Level::Warn, format_args!($($arg)+))
    };
}

macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(log::Level::Error, format_args!($($arg)+))
    };
}

pub(crate) use {debug, error, warning};

#[cfg(test)]
pub(crate) mod capture {
    use std::sync::Arc;

    use log::{Level, Log, Metadata, Record};
    use parking_lot::Mutex;

    /// Logger keeping every record in memory, for assertions.
    #[derive(Default)]
    pub(crate) struct CaptureLogger {
        records: Mutex<Vec<(Level, String)>>,
    }

    impl CaptureLogger {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn records(&self, level: Level) -> Vec<String> {
            self.records
                .lock()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, msg)| msg.clone())
                .collect()
        }
    }

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.records
                .lock()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }
}
