//! Scanning of a single fragment on a worker thread.

use super::{FirstError, Fragment, FragmentResult};
use crate::memsnap;
use crate::validate::LineChecker;

/// Validates every non-blank line of a fragment and reduces the outcome
/// to counters plus at most one error sample. Blank lines advance the
/// line number but are neither validated nor counted as processed.
pub fn scan_fragment(fragment: &Fragment, worker_id: usize, checker: &dyn LineChecker) -> FragmentResult {
    let mut processed_lines = 0u64;
    let mut error_lines = 0u64;
    let mut first_error: Option<FirstError> = None;

    for (offset, raw) in fragment.bytes.split(|b| *b == b'\n').enumerate() {
        if is_blank(raw) {
            continue;
        }
        let line = String::from_utf8_lossy(raw);
        processed_lines += 1;

        if let Err(row_error) = checker.check(&line) {
            error_lines += 1;
            if first_error.is_none() {
                let line_number = fragment.start_line + offset as u64;
                first_error = Some(FirstError::from_row_error(line_number, &line, row_error));
            }
        }
    }

    FragmentResult {
        sequence: fragment.sequence,
        worker_id,
        processed_lines,
        processed_bytes: fragment.bytes.len() as u64,
        error_lines,
        first_error,
        resident_bytes: memsnap::resident_bytes(),
    }
}

/// Result charged against a fragment whose scan panicked: the whole line
/// count becomes errors and the sample records the crash. Blank lines
/// still do not count as processed.
pub fn crash_result(fragment: &Fragment, worker_id: usize, detail: &str) -> FragmentResult {
    let processed_lines = fragment
        .bytes
        .split(|b| *b == b'\n')
        .filter(|raw| !is_blank(raw))
        .count() as u64;
    FragmentResult {
        sequence: fragment.sequence,
        worker_id,
        processed_lines,
        processed_bytes: fragment.bytes.len() as u64,
        error_lines: fragment.line_count(),
        first_error: Some(FirstError::worker_crash(fragment.start_line, detail)),
        resident_bytes: memsnap::resident_bytes(),
    }
}

fn is_blank(raw: &[u8]) -> bool {
    String::from_utf8_lossy(raw).trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::RowError;

    struct RejectContaining(&'static str);

    impl LineChecker for RejectContaining {
        fn check(&self, line: &str) -> Result<(), RowError> {
            if line.contains(self.0) {
                Err(RowError {
                    code: "test_reject".to_string(),
                    message: format!("line contains '{}'", self.0),
                    field: None,
                    value: None,
                })
            } else {
                Ok(())
            }
        }
    }

    fn fragment(start_line: u64, content: &str) -> Fragment {
        Fragment {
            sequence: 1,
            bytes: content.as_bytes().to_vec(),
            start_line,
        }
    }

    #[test]
    fn test_counts_and_first_error() {
        let fragment = fragment(1, "ok\nbad\nok\nbad");
        let result = scan_fragment(&fragment, 0, &RejectContaining("bad"));

        assert_eq!(result.processed_lines, 4);
        assert_eq!(result.error_lines, 2);
        let first = result.first_error.unwrap();
        assert_eq!(first.line_number, 2);
        assert_eq!(first.code, "test_reject");
        assert_eq!(first.raw_line, "bad");
    }

    #[test]
    fn test_blank_lines_are_skipped_but_numbered() {
        // Line 3 is blank; the error on line 4 must still be numbered 4.
        let fragment = fragment(1, "ok\nok\n\nbad");
        let result = scan_fragment(&fragment, 0, &RejectContaining("bad"));

        assert_eq!(result.processed_lines, 3);
        assert_eq!(result.error_lines, 1);
        assert_eq!(result.first_error.unwrap().line_number, 4);
    }

    #[test]
    fn test_start_line_offsets_numbering() {
        let fragment = fragment(100, "ok\nbad");
        let result = scan_fragment(&fragment, 0, &RejectContaining("bad"));
        assert_eq!(result.first_error.unwrap().line_number, 101);
    }

    #[test]
    fn test_clean_fragment_has_no_sample() {
        let fragment = fragment(1, "ok\nok");
        let result = scan_fragment(&fragment, 7, &RejectContaining("bad"));

        assert_eq!(result.worker_id, 7);
        assert_eq!(result.error_lines, 0);
        assert!(result.first_error.is_none());
    }

    #[test]
    fn test_crash_result_charges_all_lines() {
        let fragment = fragment(50, "a\nb\nc");
        let result = crash_result(&fragment, 1, "panic in checker");

        assert_eq!(result.error_lines, 3);
        assert_eq!(result.processed_lines, 3);
        let first = result.first_error.unwrap();
        assert_eq!(first.code, "worker_crash");
        assert_eq!(first.line_number, 50);
    }

    #[test]
    fn test_crash_result_still_skips_blank_lines_in_processed_count() {
        // Line 2 is blank: charged as an error line, not a processed one.
        let fragment = fragment(1, "a\n\nb");
        let result = crash_result(&fragment, 0, "panic in checker");

        assert_eq!(result.error_lines, 3);
        assert_eq!(result.processed_lines, 2);
    }
}
