//! Terminal routing
//!
//! A logical session may be represented by a terminal that was created through
//! several paths: an explicit start/resume, a terminal the host detected later,
//! or whatever the user is focused on. [`TerminalCorrelator`] resolves the one
//! terminal that should receive input for a session and refuses to guess when
//! nothing is unambiguously tied to it.
//!
//! Host terminals plug in through [`TerminalHandle`] / [`TerminalHost`];
//! [`PtyTerminalHost`] adapts the PTY sessions of a
//! [`SessionManager`](crate::session::SessionManager).

mod correlator;
mod handle;
mod pty_host;

pub use correlator::{Candidate, CandidateSource, TerminalCorrelator, FALLBACK_ORDER};
pub use handle::{TerminalHandle, TerminalHost, TerminalId};
pub use pty_host::{PtyTerminal, PtyTerminalHost};
