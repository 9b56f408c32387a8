//! Logging capability injected into the engine
//!
//! The engine never writes to process-wide logging state. Each
//! [`Database`](crate::Database) receives a [`Logger`] through its options and
//! reports progress and failures through it.

use std::sync::Arc;

/// Capability set the engine needs for reporting
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to `tracing` events, with independent switches for each level
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    info_enabled: bool,
    error_enabled: bool,
}

impl TracingLogger {
    pub fn new(info_enabled: bool, error_enabled: bool) -> Self {
        Self {
            info_enabled,
            error_enabled,
        }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        if self.info_enabled {
            tracing::info!(target: "sqlpatch", "{}", message);
        }
    }

    fn error(&self, message: &str) {
        if self.error_enabled {
            tracing::error!(target: "sqlpatch", "{}", message);
        }
    }
}

/// Discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Shared logger handle used across the engine's components
pub type SharedLogger = Arc<dyn Logger>;

#[cfg(test)]
pub(crate) mod testing {
    use super::Logger;
    use std::sync::Mutex;

    /// Captures messages so tests can assert on what was reported
    #[derive(Default)]
    pub struct RecordingLogger {
        pub infos: Mutex<Vec<String>>,
        pub errors: Mutex<Vec<String>>,
    }

    impl RecordingLogger {
        pub fn infos(&self) -> Vec<String> {
            self.infos.lock().unwrap().clone()
        }

        pub fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl Logger for RecordingLogger {
        fn info(&self, message: &str) {
            self.infos.lock().unwrap().push(message.to_string());
        }

        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }
}
