//! Error type shared by the session, terminal and transcript layers

use thiserror::Error;

/// Errors surfaced to callers of the session layer.
///
/// Lookup and validation failures are raised before any state is touched.
/// Transcript processing problems never show up here; they are logged and
/// the watch keeps running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session id {id:?}: {reason}")]
    Validation { id: String, reason: String },

    #[error("Session already running: {0}")]
    Duplicate(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error(
        "No terminal found for session {session_id} (open terminals: {})",
        format_labels(.open_terminals)
    )]
    NoTerminalFound {
        session_id: String,
        open_terminals: Vec<String>,
    },

    #[error("Failed to spawn session process: {0:#}")]
    Spawn(anyhow::Error),

    #[error("Terminal error: {0:#}")]
    Terminal(anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_labels(labels: &[String]) -> String {
    if labels.is_empty() {
        "none".to_string()
    } else {
        labels
            .iter()
            .map(|l| format!("{:?}", l))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_terminal_found_lists_labels() {
        let err = SessionError::NoTerminalFound {
            session_id: "abc".to_string(),
            open_terminals: vec!["zsh".to_string(), "node".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"zsh\""), "got: {}", msg);
        assert!(msg.contains("\"node\""), "got: {}", msg);

        let empty = SessionError::NoTerminalFound {
            session_id: "abc".to_string(),
            open_terminals: vec![],
        };
        assert!(empty.to_string().contains("none"));
    }
}
