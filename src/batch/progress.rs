//! Progress reporting for batch runs

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::Classification;

/// Receives one tick and one status line per finished organization.
///
/// The engine calls both from a single place, one organization at a time, so
/// implementations never see two organizations' updates interleaved.
pub trait ProgressSink: Send + Sync {
    /// Advance the indicator by one organization
    fn on_tick(&self);

    /// Report the status line for the organization just ticked
    fn on_line(&self, classification: Classification, message: &str);
}

/// Prints status lines to stdout, prefixed with a `[done/total]` counter
pub struct ConsoleProgress {
    total: usize,
    done: AtomicUsize,
}

impl ConsoleProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
        }
    }

    fn prefix(&self) -> String {
        let width = self.total.to_string().len();
        format!(
            "[{:>width$}/{}]",
            self.done.load(Ordering::SeqCst),
            self.total
        )
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_tick(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn on_line(&self, classification: Classification, message: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not abort the batch
        let _ = writeln!(
            stdout,
            "{} {} {}",
            self.prefix(),
            classification.glyph(),
            message
        );
    }
}

/// Keeps every tick and line in memory
#[derive(Default)]
pub struct RecordingProgress {
    ticks: AtomicUsize,
    lines: Mutex<Vec<(Classification, String)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn lines(&self) -> Vec<(Classification, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_line(&self, classification: Classification, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((classification, message.to_string()));
    }
}
