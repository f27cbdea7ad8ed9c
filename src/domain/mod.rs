//! Core domain types for sessionlink

mod session_id;
mod transcript_event;

pub use session_id::{SessionId, MAX_SESSION_ID_LEN};
pub use transcript_event::{EventMetadata, TranscriptEvent, TranscriptEventKind};
