use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::SessionId;

/// Free-form metadata attached to a classified event (file name, command, ...)
pub type EventMetadata = serde_json::Map<String, serde_json::Value>;

/// The kind of state transition detected in a session transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptEventKind {
    /// The agent invoked a file-modifying tool
    FileModified,
    /// The agent ran a test command
    TestRun,
    /// A tool call failed or the agent reported an error
    Error,
    /// The agent left plan mode with an approved plan
    PlanApproved,
    /// Raised explicitly by the host, never by classification
    Manual,
}

impl std::fmt::Display for TranscriptEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptEventKind::FileModified => write!(f, "file-modified"),
            TranscriptEventKind::TestRun => write!(f, "test-run"),
            TranscriptEventKind::Error => write!(f, "error"),
            TranscriptEventKind::PlanApproved => write!(f, "plan-approved"),
            TranscriptEventKind::Manual => write!(f, "manual"),
        }
    }
}

/// A classified transcript event, delivered once and never retained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// When the event was classified
    pub timestamp: DateTime<Utc>,

    /// Session the transcript belongs to
    pub session_id: SessionId,

    /// Project the agent was working in
    pub project_path: PathBuf,

    /// The kind of event
    pub kind: TranscriptEventKind,

    /// Extracted details (e.g. `file`, `command`, `message`)
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl TranscriptEvent {
    pub fn new(
        session_id: SessionId,
        project_path: impl Into<PathBuf>,
        kind: TranscriptEventKind,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id,
            project_path: project_path.into(),
            kind,
            metadata,
        }
    }

    /// Convenience accessor for string metadata values
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}
