//! Watch command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use sessionlink::config::Config;
use sessionlink::transcript::TranscriptChangeDetector;
use sessionlink::{SessionId, TranscriptEvent};

/// Print classified events of a transcript as JSON lines until Ctrl-C
pub async fn watch_command(config: Config, raw_id: &str, transcript: PathBuf) -> Result<()> {
    let id = SessionId::parse(raw_id)?;

    let sink = Arc::new(|event: TranscriptEvent| match serde_json::to_string(&event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "Failed to serialize transcript event"),
    });
    let detector = TranscriptChangeDetector::new(&config.transcript, sink);

    detector
        .start_monitoring(&id, &transcript)
        .await
        .with_context(|| format!("Failed to watch {}", transcript.display()))?;
    info!(session_id = %id, path = %transcript.display(), "Watching transcript (Ctrl-C to stop)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    detector.stop_all();
    Ok(())
}
