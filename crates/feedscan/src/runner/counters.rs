//! Aggregate counters shared between the runner, its tickers and the
//! result aggregator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::info;

use crate::fragment::{FirstError, FragmentResult};

/// Monotonically nondecreasing per-job counters. Results reduce by plain
/// addition, so completion order does not matter.
#[derive(Debug, Default)]
pub struct JobCounters {
    processed_lines: AtomicU64,
    processed_bytes: AtomicU64,
    error_lines: AtomicU64,
    fragments_emitted: AtomicU64,
    fragments_done: AtomicU64,
    first_error: Mutex<Option<FirstError>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub processed_lines: u64,
    pub processed_bytes: u64,
    pub error_lines: u64,
    pub fragments_emitted: u64,
    pub fragments_done: u64,
}

impl JobCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_fragment_emitted(&self) {
        self.fragments_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds one worker result in. Keeps whichever first-error sample
    /// arrives first; under parallelism that choice is non-deterministic.
    pub fn record(&self, result: &FragmentResult) {
        self.processed_lines
            .fetch_add(result.processed_lines, Ordering::Relaxed);
        self.processed_bytes
            .fetch_add(result.processed_bytes, Ordering::Relaxed);
        self.error_lines
            .fetch_add(result.error_lines, Ordering::Relaxed);
        self.fragments_done.fetch_add(1, Ordering::Relaxed);

        if let Some(ref sample) = result.first_error {
            let mut slot = match self.first_error.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.is_none() {
                info!(
                    line_number = sample.line_number,
                    code = %sample.code,
                    message = %sample.message,
                    "First validation error captured"
                );
                *slot = Some(sample.clone());
            }
        }
    }

    pub fn error_lines(&self) -> u64 {
        self.error_lines.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            processed_lines: self.processed_lines.load(Ordering::Relaxed),
            processed_bytes: self.processed_bytes.load(Ordering::Relaxed),
            error_lines: self.error_lines.load(Ordering::Relaxed),
            fragments_emitted: self.fragments_emitted.load(Ordering::Relaxed),
            fragments_done: self.fragments_done.load(Ordering::Relaxed),
        }
    }

    pub fn first_error(&self) -> Option<FirstError> {
        match self.first_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
