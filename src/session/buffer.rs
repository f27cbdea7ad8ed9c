//! Bounded output ring buffer

use std::collections::VecDeque;

/// Appended to chunks cut at `max_line_length`
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Output history of a session - keeps the most recent N chunks
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    /// Buffered chunks, oldest first
    entries: VecDeque<String>,
    /// Maximum number of chunks to keep
    max_entries: usize,
    /// Maximum chunk length in chars before truncation
    max_line_length: usize,
}

impl OutputBuffer {
    pub fn new(max_entries: usize, max_line_length: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries: max_entries.max(1),
            max_line_length: max_line_length.max(1),
        }
    }

    /// Truncate an oversized chunk to exactly `max_line_length` chars plus the marker
    pub fn clamp_chunk(&self, chunk: &str) -> String {
        clamp_chunk(chunk, self.max_line_length)
    }

    /// Add an already clamped chunk, dropping the oldest once full
    pub fn push(&mut self, chunk: String) {
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(chunk);
    }

    /// Copy of all buffered chunks
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cut `chunk` to `max_chars` chars (char-safe) and append [`TRUNCATION_MARKER`]
pub fn clamp_chunk(chunk: &str, max_chars: usize) -> String {
    match chunk.char_indices().nth(max_chars) {
        None => chunk.to_string(),
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            out.push_str(&chunk[..byte_idx]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_chunk_untouched() {
        assert_eq!(clamp_chunk("hello", 5), "hello");
        assert_eq!(clamp_chunk("", 5), "");
    }

    #[test]
    fn test_long_chunk_truncated_to_exact_length() {
        let long = "a".repeat(25);
        let clamped = clamp_chunk(&long, 10);
        assert_eq!(clamped, format!("{}{}", "a".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncation_is_char_safe() {
        let clamped = clamp_chunk("ééééé", 3);
        assert_eq!(clamped, format!("ééé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_buffer_never_exceeds_max_entries() {
        let mut buf = OutputBuffer::new(10_000, 100);
        for i in 0..15_000 {
            buf.push(i.to_string());
        }
        assert_eq!(buf.len(), 10_000);
        let snapshot = buf.snapshot();
        assert_eq!(snapshot.first().map(String::as_str), Some("5000"));
        assert_eq!(snapshot.last().map(String::as_str), Some("14999"));
        assert!(snapshot
            .windows(2)
            .all(|w| w[0].parse::<u32>().unwrap() + 1 == w[1].parse::<u32>().unwrap()));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut buf = OutputBuffer::new(3, 100);
        buf.push("a".to_string());
        let snapshot = buf.snapshot();
        buf.push("b".to_string());
        assert_eq!(snapshot, vec!["a".to_string()]);
        assert_eq!(buf.len(), 2);
    }
}
