//! Cuts an incoming byte stream into line-aligned fragments.

use super::Fragment;

/// Rolling buffer that emits a fragment whenever the byte budget is
/// crossed, cutting at the last newline inside the budget. A single line
/// longer than the budget grows the buffer until its newline arrives;
/// lines are never split.
pub struct Fragmenter {
    buffer: Vec<u8>,
    max_bytes: usize,
    next_sequence: u64,
    next_line: u64,
}

impl Fragmenter {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_bytes,
            next_sequence: 1,
            next_line: 1,
        }
    }

    /// Appends a chunk and returns every fragment that became complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Fragment> {
        self.buffer.extend_from_slice(chunk);

        let mut emitted = Vec::new();
        while self.buffer.len() >= self.max_bytes {
            // Cut at the last newline inside the budget; when one line
            // overshoots the budget, at its terminating newline instead.
            let within = self.buffer[..self.max_bytes]
                .iter()
                .rposition(|b| *b == b'\n');
            let cut = match within {
                Some(position) => position,
                None => {
                    let beyond = self.buffer[self.max_bytes..]
                        .iter()
                        .position(|b| *b == b'\n');
                    match beyond {
                        Some(offset) => self.max_bytes + offset,
                        // One unterminated line spans the whole buffer;
                        // wait for its newline no matter how large it grows.
                        None => break,
                    }
                }
            };

            let tail = self.buffer.split_off(cut + 1);
            self.buffer.pop(); // drop the cut newline
            let slab = std::mem::replace(&mut self.buffer, tail);
            emitted.push(self.emit(slab));
        }
        emitted
    }

    /// Flushes the tail at end of stream. Returns `None` when nothing but
    /// whitespace remains.
    pub fn finish(&mut self) -> Option<Fragment> {
        if self.buffer.last() == Some(&b'\n') {
            self.buffer.pop();
        }
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        let slab = std::mem::take(&mut self.buffer);
        Some(self.emit(slab))
    }

    /// Bytes currently held back waiting for a newline or EOF.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn fragments_emitted(&self) -> u64 {
        self.next_sequence - 1
    }

    fn emit(&mut self, slab: Vec<u8>) -> Fragment {
        let fragment = Fragment {
            sequence: self.next_sequence,
            bytes: slab,
            start_line: self.next_line,
        };
        self.next_sequence += 1;
        self.next_line += fragment.line_count();
        fragment
    }
}
