//! Run command implementation
//!
//! Starts an agent session in a PTY, mirrors its output to stdout, forwards
//! stdin lines to it and prints classified transcript events to stderr.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{info, warn};

use sessionlink::config::Config;
use sessionlink::session::{CloseObserver, OutputListener};
use sessionlink::{SessionHub, SessionId, TranscriptEvent};

/// Run one session until it exits, stdin closes or Ctrl-C
pub async fn run_command(
    config: Config,
    raw_id: &str,
    cwd: Option<PathBuf>,
    resume: bool,
) -> Result<()> {
    let id = SessionId::parse(raw_id)?;
    let working_dir = match cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    let sink = Arc::new(|event: TranscriptEvent| match serde_json::to_string(&event) {
        Ok(line) => eprintln!("{}", line),
        Err(e) => warn!(error = %e, "Failed to serialize transcript event"),
    });
    let hub = SessionHub::init(config, sink);

    hub.start_session(&id, &working_dir, resume)
        .await
        .with_context(|| format!("Failed to start session {}", id))?;
    info!(
        session_id = %id,
        transcript = %hub.transcript_path(&id, &working_dir).display(),
        "Session running"
    );

    let (closed_tx, mut closed_rx) = oneshot::channel();
    let notify_closed: CloseObserver = Box::new(move || {
        let _ = closed_tx.send(());
    });
    hub.manager().on_close(&id, notify_closed)?;

    let echo: OutputListener = Arc::new(|chunk: &str| {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    });
    let (_, history) = hub.manager().subscribe_with_history(&id, echo)?;
    {
        let mut out = std::io::stdout().lock();
        for chunk in history {
            let _ = out.write_all(chunk.as_bytes());
        }
        let _ = out.flush();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = hub.send_text(&id, &line).await {
                        warn!(session_id = %id, error = %e, "Failed to forward input");
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            },
            _ = &mut closed_rx => {
                info!(session_id = %id, "Session process exited");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    hub.shutdown();
    Ok(())
}
