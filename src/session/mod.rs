//! Process session management
//!
//! Each logical session owns one shell running in a pseudo-terminal
//! (`portable-pty`). Output is decoded on a dedicated reader thread, clamped to
//! a maximum chunk length, kept in a bounded ring buffer for late subscribers,
//! and fanned out to every listener in emission order.
//!
//! # Components
//! - [`SessionManager`]: registry of live sessions (spawn, write, resize, subscribe, dispose)
//! - [`OutputBuffer`]: bounded history of output chunks
//! - [`PtyProcess`]: the PTY process wrapper

mod buffer;
mod manager;
mod pty;

pub use buffer::{clamp_chunk, OutputBuffer, TRUNCATION_MARKER};
pub use manager::{
    CloseObserver, OutputListener, SessionInfo, SessionManager, SessionState, SubscriptionId,
};
pub use pty::{PtyCommand, PtyProcess, PtyReader, Utf8Decoder};
