//! Operator-visible diagnostics.
//!
//! The completion client never propagates provider failures into the run
//! loop.  Instead it reports them through a [`Diagnostics`] sink so the
//! person at the terminal sees what went wrong while the loop keeps going.

use std::io::{self, Write};
use std::sync::Mutex;

/// A sink for human-readable diagnostic messages.
///
/// # Example
///
/// ```rust
/// use mindterm::{Diagnostics, MemoryDiagnostics};
///
/// let sink = MemoryDiagnostics::default();
/// sink.report("Error getting completion: connection refused");
/// assert_eq!(sink.messages().len(), 1);
/// ```
pub trait Diagnostics: Send + Sync {
    /// Report one diagnostic message.
    fn report(&self, message: &str);
}

/// Writes each diagnostic as one line on standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrDiagnostics;

impl Diagnostics for StderrDiagnostics {
    fn report(&self, message: &str) {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{message}");
        let _ = stderr.flush();
    }
}

/// Keeps diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    messages: Mutex<Vec<String>>,
}

impl MemoryDiagnostics {
    /// Returns a copy of every message reported so far.
    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn report(&self, message: &str) {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message.to_string()),
            Err(poisoned) => poisoned.into_inner().push(message.to_string()),
        }
    }
}
