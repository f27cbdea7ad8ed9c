//! Per-file watch state and the change decision

use sha2::{Digest, Sha256};
use std::time::SystemTime;

pub type ContentHash = [u8; 32];

pub fn hash_content(content: &[u8]) -> ContentHash {
    Sha256::digest(content).into()
}

/// What was known about a transcript after the last pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWatchState {
    pub size: u64,
    pub hash: ContentHash,
    pub mtime: Option<SystemTime>,
    /// Bytes consumed so far; always sits just after a newline (or at 0)
    pub offset: usize,
}

impl FileWatchState {
    /// State for content that should be treated as already seen
    pub fn baseline(content: &[u8], hash: ContentHash, mtime: Option<SystemTime>) -> Self {
        Self {
            size: content.len() as u64,
            hash,
            mtime,
            offset: complete_prefix_len(content),
        }
    }
}

/// Result of comparing fresh content against the saved state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// File shrank; state is discarded and the next pass starts over
    Truncated,
    /// Identical content
    Unchanged,
    /// Complete lines appended since the last pass (possibly none)
    NewContent { lines: Vec<String> },
}

/// Decide what changed. Returns the outcome and the state to keep.
pub fn evaluate(
    prev: Option<&FileWatchState>,
    content: &[u8],
    hash: ContentHash,
    mtime: Option<SystemTime>,
) -> (ChangeOutcome, Option<FileWatchState>) {
    let size = content.len() as u64;

    let start = match prev {
        Some(prev) if size < prev.size => return (ChangeOutcome::Truncated, None),
        Some(prev) if prev.hash == hash => {
            return (ChangeOutcome::Unchanged, Some(prev.clone()));
        }
        Some(prev) => prev.offset.min(content.len()),
        None => 0,
    };

    let consumed = start + complete_prefix_len(&content[start..]);
    let lines = String::from_utf8_lossy(&content[start..consumed])
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    let state = FileWatchState {
        size,
        hash,
        mtime,
        offset: consumed,
    };
    (ChangeOutcome::NewContent { lines }, Some(state))
}

/// Length of the newline-terminated prefix
fn complete_prefix_len(content: &[u8]) -> usize {
    content
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}
