//! sessionlink - coding-agent sessions for editor hosts
//!
//! Three cooperating pieces keep an editor in sync with an interactive coding
//! agent:
//!
//! 1. [`session::SessionManager`] runs one PTY process per logical session and
//!    streams its output to any number of subscribers with bounded memory.
//! 2. [`terminal::TerminalCorrelator`] finds the terminal that should receive
//!    input for a session, using a strict fallback order that never guesses.
//! 3. [`transcript::TranscriptChangeDetector`] follows the agent's append-only
//!    JSONL transcript and classifies new records into events (file edits, test
//!    runs, errors, plan approvals).
//!
//! [`SessionHub`] wires the three together with explicit init and shutdown.

pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod session;
pub mod terminal;
pub mod transcript;

pub use domain::*;
pub use error::SessionError;
pub use hub::SessionHub;
