//! Progress/audit sink.
//!
//! Operators audit sync runs through this line-oriented trace; every
//! meaningful state transition must emit exactly one line.  This is a
//! required output of the engine, separate from diagnostic logging.

use std::sync::Mutex;

use tracing::{info, warn};

/// Line-oriented progress sink for one sync run.
pub trait SyncTrace: Send + Sync {
    /// One meaningful action or state transition.
    fn line(&self, message: &str);

    /// A non-fatal problem the operator should see.
    fn error(&self, message: &str);
}

/// Trace that forwards to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingTrace;

impl SyncTrace for TracingTrace {
    fn line(&self, message: &str) {
        info!(target: "sisync::audit", "{message}");
    }

    fn error(&self, message: &str) {
        warn!(target: "sisync::audit", "{message}");
    }
}

/// Trace that discards everything.
#[derive(Debug, Default)]
pub struct NullTrace;

impl SyncTrace for NullTrace {
    fn line(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}

/// Trace that collects lines in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct BufferTrace {
    lines: Mutex<Vec<String>>,
}

impl BufferTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    fn push(&self, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message.to_string());
    }
}

impl SyncTrace for BufferTrace {
    fn line(&self, message: &str) {
        self.push(message);
    }

    fn error(&self, message: &str) {
        self.push(&format!("error: {message}"));
    }
}
