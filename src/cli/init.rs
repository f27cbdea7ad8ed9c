//! Init command implementation

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use sessionlink::config::Config;

/// Default configuration content for sessionlink init
pub const DEFAULT_CONFIG: &str = r#"# sessionlink configuration
# =========================

# Log filter used when RUST_LOG is not set (e.g. "info", "sessionlink=debug")
log_level = "info"

# ============================================================================
# SESSION - PTY processes running the agent
# ============================================================================
#
# Available options:
#   shell                - Shell started in the PTY (empty = $SHELL)
#   cols / rows          - Initial terminal size
#   max_output_entries   - Output chunks kept for late subscribers
#   max_line_length      - Longer chunks are cut and marked "... [truncated]"
#   exit_grace_period_ms - Delay between process exit and disposal
#   agent_binary         - Agent CLI started inside the shell
#   new_session_args     - Arguments for a fresh session ({session_id} is substituted)
#   resume_session_args  - Arguments to reattach to a session

[session]
shell = ""
cols = 120
rows = 30
max_output_entries = 10000
max_line_length = 10000
exit_grace_period_ms = 1000
agent_binary = "claude"
new_session_args = ["--session-id", "{session_id}"]
resume_session_args = ["--resume", "{session_id}"]

# ============================================================================
# ROUTING - Which terminal receives input for a session
# ============================================================================
#
# Input goes to the terminal bound to the session, else to the one terminal
# whose label contains the session id, else to the focused terminal if its
# label starts with an allowed program. Nothing else is ever guessed.

[routing]
allowed_programs = ["claude"]
label_template = "claude {session_id}"

# ============================================================================
# TRANSCRIPT - Watching the agent's per-session JSONL log
# ============================================================================
#
# Available options:
#   projects_dir         - Transcript root (empty = ~/.claude/projects)
#   auto_watch           - Watch the transcript of every started session
#   debounce_ms          - Quiet period to coalesce change notifications
#   file_modifying_tools - Tool calls reported as file-modified
#   command_tools        - Tools whose `command` input is checked for test runs
#   test_keywords        - Commands containing one of these are test runs
#   max_error_chars      - Error messages are cut to this many characters

[transcript]
projects_dir = ""
auto_watch = true
debounce_ms = 100
file_modifying_tools = ["Edit", "MultiEdit", "Write", "NotebookEdit"]
command_tools = ["Bash"]
test_keywords = [
    "npm test", "npm run test", "yarn test", "pnpm test", "bun test",
    "jest", "vitest", "mocha", "pytest",
    "cargo test", "cargo nextest", "go test",
    "rspec", "phpunit", "mvn test", "gradle test", "dotnet test",
]
max_error_chars = 200
"#;

/// Write the default config file
pub async fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    // Default to global config path
    let config_path = config_path.unwrap_or_else(Config::global_config_path);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created: {}", config_path.display());

    Ok(())
}
