//! Terminal host adapter over the sessions owned by a [`SessionManager`]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::handle::{TerminalHandle, TerminalHost, TerminalId};
use crate::domain::SessionId;
use crate::session::SessionManager;

/// Shared "which PTY terminal has focus" marker
type ActiveSlot = Arc<Mutex<Option<SessionId>>>;

/// A manager session seen as a routable terminal
pub struct PtyTerminal {
    manager: SessionManager,
    session_id: SessionId,
    label: String,
    active: ActiveSlot,
}

#[async_trait]
impl TerminalHandle for PtyTerminal {
    fn id(&self) -> TerminalId {
        TerminalId(format!("pty:{}", self.session_id))
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    async fn send_text(&self, text: &str, add_newline: bool) -> Result<()> {
        let data = if add_newline {
            format!("{}\r", text)
        } else {
            text.to_string()
        };
        self.manager.write(&self.session_id, &data).await?;
        Ok(())
    }

    fn show(&self) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(self.session_id.clone());
    }

    fn on_close(&self, callback: Box<dyn FnOnce() + Send>) {
        // Registration only fails for sessions that are already gone
        if let Err(callback) = self.manager.on_close_or_return(&self.session_id, callback) {
            callback();
        }
    }
}

/// Exposes every session of a [`SessionManager`] as a terminal.
///
/// The most recently shown terminal counts as the focused one.
#[derive(Clone)]
pub struct PtyTerminalHost {
    manager: SessionManager,
    label_template: String,
    active: ActiveSlot,
}

impl PtyTerminalHost {
    pub fn new(manager: SessionManager, label_template: impl Into<String>) -> Self {
        Self {
            manager,
            label_template: label_template.into(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Label for a session's terminal
    pub fn label_for(&self, id: &SessionId) -> String {
        self.label_template.replace("{session_id}", id.as_str())
    }

    /// Terminal handle for a registered session
    pub fn terminal(&self, id: &SessionId) -> Option<Arc<dyn TerminalHandle>> {
        if !self.manager.contains(id) {
            return None;
        }
        Some(Arc::new(PtyTerminal {
            manager: self.manager.clone(),
            session_id: id.clone(),
            label: self.label_for(id),
            active: self.active.clone(),
        }))
    }

    /// Mark a session's terminal as focused
    pub fn focus(&self, id: &SessionId) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
    }
}

impl TerminalHost for PtyTerminalHost {
    fn terminals(&self) -> Vec<Arc<dyn TerminalHandle>> {
        self.manager
            .list()
            .into_iter()
            .filter(|info| info.state.is_live())
            .filter_map(|info| self.terminal(&info.session_id))
            .collect()
    }

    fn active_terminal(&self) -> Option<Arc<dyn TerminalHandle>> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        self.terminal(&active)
    }
}
