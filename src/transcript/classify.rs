//! Transcript record classification

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

use super::record::{file_path_of, ToolUse, TranscriptRecord};
use crate::config::TranscriptSettings;
use crate::domain::{EventMetadata, TranscriptEventKind};

/// Tool the agent calls to leave plan mode once the plan is accepted
const PLAN_EXIT_TOOL: &str = "ExitPlanMode";

/// Error-looking text in tool output
static ERROR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(error|fatal|panic)(\[[^\]]*\])?:|\bunhandled (exception|rejection)\b|traceback \(most recent call last\)|\bcommand not found\b|\bsegmentation fault\b",
    )
    .expect("error pattern is valid")
});

/// A classified event before session/project context is attached
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub kind: TranscriptEventKind,
    pub metadata: EventMetadata,
}

impl Classified {
    fn new(kind: TranscriptEventKind) -> Self {
        Self {
            kind,
            metadata: EventMetadata::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Turns transcript records into events using tool-name and keyword heuristics
#[derive(Debug, Clone)]
pub struct Classifier {
    file_modifying_tools: Vec<String>,
    command_tools: Vec<String>,
    test_keywords: Vec<String>,
    max_error_chars: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&TranscriptSettings::default())
    }
}

impl Classifier {
    pub fn new(settings: &TranscriptSettings) -> Self {
        Self {
            file_modifying_tools: settings.file_modifying_tools.clone(),
            command_tools: settings.command_tools.clone(),
            test_keywords: settings
                .test_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            max_error_chars: settings.max_error_chars.max(1),
        }
    }

    /// Classify one record; most records yield nothing
    pub fn classify(&self, record: &TranscriptRecord) -> Vec<Classified> {
        let mut events = Vec::new();

        match record.record_type() {
            Some("plan_approved") => {
                events.push(Classified::new(TranscriptEventKind::PlanApproved));
                return events;
            }
            Some("error") => {
                let message = record.error_text().unwrap_or_else(|| "error".to_string());
                events.push(self.error_event(&message));
                return events;
            }
            _ => {}
        }

        for tool in record.tool_uses() {
            if let Some(event) = self.classify_tool_use(&tool) {
                events.push(event);
            }
        }

        let mut saw_error = false;
        for result in record.tool_results() {
            if result.is_error || self.looks_like_error(&result.content) {
                let message = if result.content.trim().is_empty() {
                    "tool call failed"
                } else {
                    result.content.as_str()
                };
                events.push(self.error_event(message));
                saw_error = true;
            }
        }

        if !saw_error && record.is_error_flagged() {
            let message = record.error_text().unwrap_or_else(|| "error".to_string());
            events.push(self.error_event(&message));
        }

        events
    }

    fn classify_tool_use(&self, tool: &ToolUse<'_>) -> Option<Classified> {
        if tool.name == PLAN_EXIT_TOOL {
            let mut event =
                Classified::new(TranscriptEventKind::PlanApproved).with("tool", tool.name);
            if let Some(plan) = tool.input.get("plan").and_then(Value::as_str) {
                event = event.with("plan", truncate(plan, self.max_error_chars));
            }
            return Some(event);
        }

        if self.is_file_modifying(tool.name) {
            let mut event =
                Classified::new(TranscriptEventKind::FileModified).with("tool", tool.name);
            if let Some(path) = file_path_of(tool.input) {
                let file = Path::new(path)
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                event = event.with("file", file).with("path", path);
            }
            return Some(event);
        }

        if self.is_command_tool(tool.name) {
            let command = tool.input.get("command").and_then(Value::as_str)?;
            if self.is_test_command(command) {
                return Some(
                    Classified::new(TranscriptEventKind::TestRun)
                        .with("tool", tool.name)
                        .with("command", truncate(command, self.max_error_chars)),
                );
            }
        }

        None
    }

    fn is_file_modifying(&self, name: &str) -> bool {
        self.file_modifying_tools
            .iter()
            .any(|t| t.eq_ignore_ascii_case(name))
    }

    fn is_command_tool(&self, name: &str) -> bool {
        self.command_tools.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    /// Whether a shell command runs tests (keyword match on word boundaries)
    pub fn is_test_command(&self, command: &str) -> bool {
        let command = command.to_lowercase();
        self.test_keywords
            .iter()
            .any(|keyword| contains_word(&command, keyword))
    }

    /// Error heuristic for unflagged tool output
    pub fn looks_like_error(&self, text: &str) -> bool {
        ERROR_PATTERN.is_match(text)
    }

    fn error_event(&self, message: &str) -> Classified {
        Classified::new(TranscriptEventKind::Error)
            .with("message", truncate(message.trim(), self.max_error_chars))
    }
}

/// `needle` occurs in `haystack` not glued to other alphanumerics
fn contains_word(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Truncate a string to a maximum length (char-safe)
fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
