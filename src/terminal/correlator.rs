//! Session -> terminal routing with a conservative fallback order

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::handle::{TerminalHandle, TerminalHost, TerminalId};
use crate::config::RoutingSettings;
use crate::domain::SessionId;
use crate::error::SessionError;

type BindingMap = HashMap<SessionId, Arc<dyn TerminalHandle>>;

/// Where a routing candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Explicitly registered binding
    Binding,
    /// The only terminal whose label contains the session id
    LabelMatch,
    /// The focused terminal, labelled with an allow-listed program
    FocusedAllowListed,
}

/// Order in which [`TerminalCorrelator::find_candidate`] tries each source.
///
/// There is no "any open shell" step.
pub const FALLBACK_ORDER: [CandidateSource; 3] = [
    CandidateSource::Binding,
    CandidateSource::LabelMatch,
    CandidateSource::FocusedAllowListed,
];

/// A terminal selected for a session, with the rule that selected it
#[derive(Clone)]
pub struct Candidate {
    pub terminal: Arc<dyn TerminalHandle>,
    pub source: CandidateSource,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("terminal", &self.terminal.id())
            .field("label", &self.terminal.label())
            .field("source", &self.source)
            .finish()
    }
}

/// Maps logical sessions to the host terminal currently representing them
pub struct TerminalCorrelator {
    host: Arc<dyn TerminalHost>,
    /// Lowercased program names accepted for the focused-terminal fallback
    allowed_programs: Vec<String>,
    bindings: Arc<Mutex<BindingMap>>,
}

impl TerminalCorrelator {
    pub fn new(host: Arc<dyn TerminalHost>, routing: &RoutingSettings) -> Self {
        Self {
            host,
            allowed_programs: routing
                .allowed_programs
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            bindings: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bind `terminal` to `id`, replacing any previous binding.
    ///
    /// The binding is dropped automatically when the terminal closes.
    pub fn register_binding(&self, id: &SessionId, terminal: Arc<dyn TerminalHandle>) {
        let terminal_id = terminal.id();
        {
            let mut bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
            bindings.insert(id.clone(), terminal.clone());
        }
        info!(session_id = %id, terminal = %terminal_id, label = %terminal.label(), "Terminal bound");

        let weak = Arc::downgrade(&self.bindings);
        let session_id = id.clone();
        terminal.on_close(Box::new(move || {
            let Some(bindings) = weak.upgrade() else {
                return;
            };
            let mut bindings = bindings.lock().unwrap_or_else(|e| e.into_inner());
            // Only drop the binding if it still points at the closed terminal
            if bindings
                .get(&session_id)
                .is_some_and(|t| t.id() == terminal_id)
            {
                bindings.remove(&session_id);
                debug!(session_id = %session_id, terminal = %terminal_id, "Binding removed on close");
            }
        }));
    }

    /// Drop the binding for `id`; returns whether one existed
    pub fn unbind(&self, id: &SessionId) -> bool {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    /// Explicit binding lookup only
    pub fn resolve(&self, id: &SessionId) -> Option<Arc<dyn TerminalHandle>> {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Walk [`FALLBACK_ORDER`] and return the first qualifying terminal
    pub fn find_candidate(&self, id: &SessionId) -> Option<Candidate> {
        for source in FALLBACK_ORDER {
            let found = match source {
                CandidateSource::Binding => self.by_binding(id),
                CandidateSource::LabelMatch => self.by_label(id),
                CandidateSource::FocusedAllowListed => self.by_focus(id),
            };
            if let Some(terminal) = found {
                debug!(session_id = %id, source = ?source, label = %terminal.label(), "Terminal candidate found");
                return Some(Candidate { terminal, source });
            }
        }
        None
    }

    /// Step 1: the explicit binding
    pub fn by_binding(&self, id: &SessionId) -> Option<Arc<dyn TerminalHandle>> {
        self.resolve(id)
    }

    /// Step 2: the single live terminal whose label contains the id
    /// (case-insensitive). A match is registered as the binding.
    pub fn by_label(&self, id: &SessionId) -> Option<Arc<dyn TerminalHandle>> {
        let needle = id.as_str().to_lowercase();
        let matches: Vec<Arc<dyn TerminalHandle>> = self
            .host
            .terminals()
            .into_iter()
            .filter(|t| t.label().to_lowercase().contains(&needle))
            .filter(|t| !self.is_bound_elsewhere(&t.id(), id))
            .collect();

        match matches.len() {
            0 => None,
            1 => {
                let terminal = matches.into_iter().next()?;
                self.register_binding(id, terminal.clone());
                Some(terminal)
            }
            n => {
                warn!(session_id = %id, matches = n, "Several terminals are labelled with this session, not guessing");
                None
            }
        }
    }

    /// Step 3: the focused terminal, only if it runs an allow-listed program
    pub fn by_focus(&self, id: &SessionId) -> Option<Arc<dyn TerminalHandle>> {
        let active = self.host.active_terminal()?;
        if self.is_bound_elsewhere(&active.id(), id) {
            return None;
        }
        if self.is_allowed_label(&active.label()) {
            Some(active)
        } else {
            None
        }
    }

    /// Send `text` followed by Enter to the session's terminal
    pub async fn send_text(
        &self,
        id: &SessionId,
        text: &str,
    ) -> Result<CandidateSource, SessionError> {
        self.deliver(id, text, true).await
    }

    /// Send `payload` verbatim (escape sequences, control keys)
    pub async fn send_raw_sequence(
        &self,
        id: &SessionId,
        payload: &str,
    ) -> Result<CandidateSource, SessionError> {
        self.deliver(id, payload, false).await
    }

    /// Labels of all open terminals, for diagnostics
    pub fn open_terminal_labels(&self) -> Vec<String> {
        self.host.terminals().iter().map(|t| t.label()).collect()
    }

    async fn deliver(
        &self,
        id: &SessionId,
        payload: &str,
        add_newline: bool,
    ) -> Result<CandidateSource, SessionError> {
        let Some(candidate) = self.find_candidate(id) else {
            let open_terminals = self.open_terminal_labels();
            warn!(session_id = %id, open = ?open_terminals, "No terminal found for session");
            return Err(SessionError::NoTerminalFound {
                session_id: id.to_string(),
                open_terminals,
            });
        };

        candidate.terminal.show();
        candidate
            .terminal
            .send_text(payload, add_newline)
            .await
            .map_err(SessionError::Terminal)?;
        Ok(candidate.source)
    }

    fn is_bound_elsewhere(&self, terminal: &TerminalId, id: &SessionId) -> bool {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|(session, bound)| session != id && bound.id() == *terminal)
    }

    /// Whether the label's leading program token is allow-listed
    fn is_allowed_label(&self, label: &str) -> bool {
        let Some(program) = leading_program(label) else {
            return false;
        };
        self.allowed_programs.iter().any(|p| *p == program)
    }
}

/// First word of a label, without any directory prefix, lowercased
fn leading_program(label: &str) -> Option<String> {
    let token = label
        .trim()
        .split(|c: char| c.is_whitespace() || c == ':' || c == '(')
        .find(|t| !t.is_empty())?;
    let program = token.rsplit(['/', '\\']).next().unwrap_or(token);
    Some(program.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_program() {
        assert_eq!(leading_program("claude abc"), Some("claude".to_string()));
        assert_eq!(leading_program("  Claude: abc"), Some("claude".to_string()));
        assert_eq!(leading_program("/usr/local/bin/claude"), Some("claude".to_string()));
        assert_eq!(leading_program("node(1234)"), Some("node".to_string()));
        assert_eq!(leading_program("   "), None);
    }
}
