//! Line-aligned fragments and their results.

pub mod fragmenter;
pub mod pool;
pub mod worker;

pub use fragmenter::Fragmenter;
pub use pool::WorkerPool;

use serde::{Deserialize, Serialize};

use crate::validate::RowError;

/// Longest raw-line prefix kept in a first-error sample.
pub const RAW_LINE_SAMPLE_CHARS: usize = 500;

/// A contiguous, line-aligned slice of the input stream. Ownership of the
/// byte slab moves to the worker on dispatch; nothing else may hold a
/// reference afterwards.
#[derive(Debug)]
pub struct Fragment {
    /// 1-based emission order.
    pub sequence: u64,
    pub bytes: Vec<u8>,
    /// 1-based number of the first line in this fragment.
    pub start_line: u64,
}

impl Fragment {
    /// Physical lines carried by this fragment. Slabs never end in a
    /// newline, so this is the newline count plus one.
    pub fn line_count(&self) -> u64 {
        self.bytes.iter().filter(|b| **b == b'\n').count() as u64 + 1
    }
}

/// First rejected line observed for a job; individual line errors beyond
/// this one are deliberately discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstError {
    pub line_number: u64,
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub value: Option<String>,
    pub raw_line: String,
}

impl FirstError {
    pub fn from_row_error(line_number: u64, raw_line: &str, error: RowError) -> Self {
        Self {
            line_number,
            code: error.code,
            message: error.message,
            field: error.field,
            value: error.value,
            raw_line: truncate_chars(raw_line, RAW_LINE_SAMPLE_CHARS),
        }
    }

    pub fn worker_crash(line_number: u64, detail: &str) -> Self {
        Self {
            line_number,
            code: "worker_crash".to_string(),
            message: format!("Fragment worker crashed: {}", detail),
            field: None,
            value: None,
            raw_line: String::new(),
        }
    }
}

/// Outcome of scanning one fragment, reduced by the runner via
/// commutative counter addition.
#[derive(Debug)]
pub struct FragmentResult {
    pub sequence: u64,
    pub worker_id: usize,
    pub processed_lines: u64,
    pub processed_bytes: u64,
    pub error_lines: u64,
    pub first_error: Option<FirstError>,
    /// Worker-reported resident memory at scan end, for observability only.
    pub resident_bytes: u64,
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => value[..index].to_string(),
        None => value.to_string(),
    }
}
