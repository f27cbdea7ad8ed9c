//! Capabilities a host terminal must expose to be routable

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Opaque identity of a host terminal, stable for its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalId(pub String);

impl std::fmt::Display for TerminalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A terminal owned by the editor host (or by us, see [`super::PtyTerminal`])
#[async_trait]
pub trait TerminalHandle: Send + Sync {
    fn id(&self) -> TerminalId;

    /// Human-readable label shown in the host's terminal list
    fn label(&self) -> String;

    /// Write text to the terminal, optionally followed by Enter
    async fn send_text(&self, text: &str, add_newline: bool) -> Result<()>;

    /// Bring the terminal to the front
    fn show(&self);

    /// Run `callback` once when the terminal closes.
    ///
    /// If the terminal is already closed the callback runs immediately.
    fn on_close(&self, callback: Box<dyn FnOnce() + Send>);
}

/// The host's view of its open terminals
pub trait TerminalHost: Send + Sync {
    /// All live terminals
    fn terminals(&self) -> Vec<Arc<dyn TerminalHandle>>;

    /// The terminal the user is focused on, if any
    fn active_terminal(&self) -> Option<Arc<dyn TerminalHandle>>;
}
