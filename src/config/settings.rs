//! Settings configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// PTY session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Shell to run inside the PTY (empty = `$SHELL`, falling back to the platform default)
    #[serde(default)]
    pub shell: String,

    /// Initial terminal width
    #[serde(default = "default_cols")]
    pub cols: u16,

    /// Initial terminal height
    #[serde(default = "default_rows")]
    pub rows: u16,

    /// Maximum number of output chunks kept for late subscribers
    #[serde(default = "default_max_output_entries")]
    pub max_output_entries: usize,

    /// Chunks longer than this (in chars) are truncated before buffering
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Delay between process exit and disposal, so the last output can be read
    #[serde(default = "default_exit_grace_period_ms")]
    pub exit_grace_period_ms: u64,

    /// Agent CLI started inside the shell
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,

    /// Arguments for a fresh session (`{session_id}` is substituted)
    #[serde(default = "default_new_session_args")]
    pub new_session_args: Vec<String>,

    /// Arguments to reattach to an existing session (`{session_id}` is substituted)
    #[serde(default = "default_resume_session_args")]
    pub resume_session_args: Vec<String>,
}

fn default_cols() -> u16 {
    120
}

fn default_rows() -> u16 {
    30
}

fn default_max_output_entries() -> usize {
    10_000
}

fn default_max_line_length() -> usize {
    10_000
}

fn default_exit_grace_period_ms() -> u64 {
    1_000
}

fn default_agent_binary() -> String {
    "claude".to_string()
}

fn default_new_session_args() -> Vec<String> {
    vec!["--session-id".to_string(), "{session_id}".to_string()]
}

fn default_resume_session_args() -> Vec<String> {
    vec!["--resume".to_string(), "{session_id}".to_string()]
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            shell: String::new(),
            cols: default_cols(),
            rows: default_rows(),
            max_output_entries: default_max_output_entries(),
            max_line_length: default_max_line_length(),
            exit_grace_period_ms: default_exit_grace_period_ms(),
            agent_binary: default_agent_binary(),
            new_session_args: default_new_session_args(),
            resume_session_args: default_resume_session_args(),
        }
    }
}

impl SessionSettings {
    /// Resolve the shell binary to launch
    pub fn resolved_shell(&self) -> String {
        if !self.shell.trim().is_empty() {
            return self.shell.clone();
        }
        if let Ok(shell) = std::env::var("SHELL") {
            if !shell.trim().is_empty() {
                return shell;
            }
        }
        if cfg!(windows) {
            "cmd.exe".to_string()
        } else {
            "/bin/sh".to_string()
        }
    }
}

/// Terminal routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Program names a focused terminal may be labelled with to receive input
    #[serde(default = "default_allowed_programs")]
    pub allowed_programs: Vec<String>,

    /// Label given to PTY-backed terminals (`{session_id}` is substituted)
    #[serde(default = "default_label_template")]
    pub label_template: String,
}

fn default_allowed_programs() -> Vec<String> {
    vec!["claude".to_string()]
}

fn default_label_template() -> String {
    "claude {session_id}".to_string()
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            allowed_programs: default_allowed_programs(),
            label_template: default_label_template(),
        }
    }
}

/// Transcript watching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSettings {
    /// Root directory holding per-project transcript folders (empty = `~/.claude/projects`)
    #[serde(default)]
    pub projects_dir: String,

    /// Start watching the transcript when a session is started
    #[serde(default = "default_auto_watch")]
    pub auto_watch: bool,

    /// Quiet period used to coalesce bursts of change notifications
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Tools whose invocation counts as a file modification
    #[serde(default = "default_file_modifying_tools")]
    pub file_modifying_tools: Vec<String>,

    /// Tools that execute shell commands
    #[serde(default = "default_command_tools")]
    pub command_tools: Vec<String>,

    /// Command fragments that mark a test run
    #[serde(default = "default_test_keywords")]
    pub test_keywords: Vec<String>,

    /// Error messages are cut to this many chars
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
}

fn default_auto_watch() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_file_modifying_tools() -> Vec<String> {
    ["Edit", "MultiEdit", "Write", "NotebookEdit"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_command_tools() -> Vec<String> {
    vec!["Bash".to_string()]
}

fn default_test_keywords() -> Vec<String> {
    [
        "npm test",
        "npm run test",
        "yarn test",
        "pnpm test",
        "bun test",
        "jest",
        "vitest",
        "mocha",
        "pytest",
        "cargo test",
        "cargo nextest",
        "go test",
        "rspec",
        "phpunit",
        "mvn test",
        "gradle test",
        "dotnet test",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_error_chars() -> usize {
    200
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            projects_dir: String::new(),
            auto_watch: default_auto_watch(),
            debounce_ms: default_debounce_ms(),
            file_modifying_tools: default_file_modifying_tools(),
            command_tools: default_command_tools(),
            test_keywords: default_test_keywords(),
            max_error_chars: default_max_error_chars(),
        }
    }
}

impl TranscriptSettings {
    /// Resolve the transcript root directory
    pub fn resolved_projects_dir(&self) -> PathBuf {
        if !self.projects_dir.trim().is_empty() {
            return PathBuf::from(self.projects_dir.trim());
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude")
            .join("projects")
    }
}
