//! Transcript monitoring
//!
//! The agent appends one JSON record per line to a per-session transcript.
//! [`TranscriptChangeDetector`] notices appends, reads only what is new and
//! classifies each record into [`TranscriptEvent`](crate::domain::TranscriptEvent)s.
//! Rewrites are detected by content hash, truncation by size.

mod classify;
mod detector;
mod record;
mod state;

pub use classify::{Classified, Classifier};
pub use detector::{EventSink, PassOutcome, TranscriptChangeDetector};
pub use record::{ToolResult, ToolUse, TranscriptRecord};
pub use state::{evaluate, hash_content, ChangeOutcome, ContentHash, FileWatchState};

use std::path::{Path, PathBuf};

use crate::domain::SessionId;

/// Directory name the agent uses for a project: every character that is not
/// ASCII alphanumeric becomes `-`
pub fn encode_project_dir(working_dir: &Path) -> String {
    working_dir
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Where the agent writes the transcript of a session started in `working_dir`
pub fn transcript_path_for(projects_dir: &Path, working_dir: &Path, id: &SessionId) -> PathBuf {
    projects_dir
        .join(encode_project_dir(working_dir))
        .join(format!("{}.jsonl", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_project_dir() {
        assert_eq!(
            encode_project_dir(Path::new("/Users/me/my_app.v2")),
            "-Users-me-my-app-v2"
        );
    }

    #[test]
    fn test_transcript_path_for() {
        let id = SessionId::parse("abc-123").unwrap();
        let path = transcript_path_for(Path::new("/home/u/.claude/projects"), Path::new("/w/p"), &id);
        assert_eq!(path, PathBuf::from("/home/u/.claude/projects/-w-p/abc-123.jsonl"));
    }
}
