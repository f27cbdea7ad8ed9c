//! Transcript change detector
//!
//! One watch per session: a `notify` watcher on the transcript's parent
//! directory feeds a per-session worker task, which debounces bursts and runs
//! one change pass at a time. [`TranscriptChangeDetector::poll`] runs the same
//! pass on demand under the same lock, so passes for a session never overlap.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::classify::Classifier;
use super::record::TranscriptRecord;
use super::state::{evaluate, hash_content, ChangeOutcome, ContentHash, FileWatchState};
use crate::config::TranscriptSettings;
use crate::domain::{EventMetadata, SessionId, TranscriptEvent, TranscriptEventKind};
use crate::error::SessionError;

/// Receives classified transcript events
pub trait EventSink: Send + Sync {
    fn on_classified_event(&self, event: TranscriptEvent);
}

impl<F> EventSink for F
where
    F: Fn(TranscriptEvent) + Send + Sync,
{
    fn on_classified_event(&self, event: TranscriptEvent) {
        self(event)
    }
}

/// What a change pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Transcript does not exist (yet)
    Missing,
    /// File shrank or vanished; state was reset
    Truncated,
    /// Content hash matched the saved state
    Unchanged,
    /// New complete lines were read
    Processed { lines: usize, events: usize },
}

/// Everything a pass needs besides the target
#[derive(Clone)]
struct PassContext {
    classifier: Arc<Classifier>,
    sink: Arc<dyn EventSink>,
}

/// A monitored transcript
struct WatchTarget {
    session_id: SessionId,
    log_path: PathBuf,
    /// Latest project path seen in the transcript (initially the log's parent)
    project_path: Mutex<PathBuf>,
    state: tokio::sync::Mutex<Option<FileWatchState>>,
}

impl WatchTarget {
    fn project_path(&self) -> PathBuf {
        self.project_path
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_project_path(&self, path: &str) {
        let mut current = self.project_path.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_os_str() != path {
            *current = PathBuf::from(path);
        }
    }
}

struct WatchEntry {
    target: Arc<WatchTarget>,
    worker: JoinHandle<()>,
    _watcher: RecommendedWatcher,
}

impl Drop for WatchEntry {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Watches per-session transcripts and turns appended lines into events
#[derive(Clone)]
pub struct TranscriptChangeDetector {
    ctx: PassContext,
    debounce: Duration,
    watches: Arc<Mutex<HashMap<SessionId, WatchEntry>>>,
}

impl TranscriptChangeDetector {
    pub fn new(settings: &TranscriptSettings, sink: Arc<dyn EventSink>) -> Self {
        Self {
            ctx: PassContext {
                classifier: Arc::new(Classifier::new(settings)),
                sink,
            },
            debounce: Duration::from_millis(settings.debounce_ms),
            watches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Begin watching `log_path` for a session.
    ///
    /// Content already in the file is taken as the baseline and not replayed.
    /// Calling again with the same path is a no-op; a different path replaces
    /// the previous watch.
    pub async fn start_monitoring(
        &self,
        session_id: &SessionId,
        log_path: impl Into<PathBuf>,
    ) -> Result<(), SessionError> {
        let log_path = log_path.into();
        if self.monitored_path(session_id).as_deref() == Some(log_path.as_path()) {
            return Ok(());
        }

        let parent = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = log_path.file_name().map(|f| f.to_os_string()).ok_or_else(|| {
            SessionError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("transcript path has no file name: {}", log_path.display()),
            ))
        })?;

        tokio::fs::create_dir_all(&parent).await?;
        let baseline = read_baseline(&log_path).await?;

        let target = Arc::new(WatchTarget {
            session_id: session_id.clone(),
            log_path: log_path.clone(),
            project_path: Mutex::new(parent.clone()),
            state: tokio::sync::Mutex::new(baseline),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if touches_file(&event, &file_name) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "Transcript watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(watch_error)?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let worker = tokio::spawn(run_worker(
            target.clone(),
            self.ctx.clone(),
            self.debounce,
            rx,
        ));

        let entry = WatchEntry {
            target,
            worker,
            _watcher: watcher,
        };
        let previous = self
            .watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.clone(), entry);
        drop(previous);

        info!(session_id = %session_id, path = %log_path.display(), "Monitoring transcript");
        Ok(())
    }

    /// Run a change pass now
    pub async fn poll(&self, session_id: &SessionId) -> Result<PassOutcome, SessionError> {
        let target = self
            .target(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        run_pass(&target, &self.ctx).await
    }

    /// Stop watching a session; no-op when it is not monitored
    pub fn stop_monitoring(&self, session_id: &SessionId) -> bool {
        let removed = self
            .watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        match removed {
            Some(entry) => {
                debug!(session_id = %session_id, path = %entry.target.log_path.display(), "Stopped transcript monitoring");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<WatchEntry> = self
            .watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Stopped all transcript monitoring");
        }
    }

    pub fn is_monitoring(&self, session_id: &SessionId) -> bool {
        self.watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(session_id)
    }

    /// Transcript path being watched for a session
    pub fn monitored_path(&self, session_id: &SessionId) -> Option<PathBuf> {
        self.target(session_id).map(|t| t.log_path.clone())
    }

    /// Deliver a `manual` event for a monitored session
    pub fn emit_manual(
        &self,
        session_id: &SessionId,
        metadata: EventMetadata,
    ) -> Result<(), SessionError> {
        let target = self
            .target(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        self.ctx.sink.on_classified_event(TranscriptEvent::new(
            target.session_id.clone(),
            target.project_path(),
            TranscriptEventKind::Manual,
            metadata,
        ));
        Ok(())
    }

    fn target(&self, session_id: &SessionId) -> Option<Arc<WatchTarget>> {
        self.watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .map(|entry| entry.target.clone())
    }
}

fn watch_error(e: notify::Error) -> SessionError {
    SessionError::Io(io::Error::other(e))
}

fn touches_file(event: &Event, file_name: &OsString) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

async fn run_worker(
    target: Arc<WatchTarget>,
    ctx: PassContext,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<()>,
) {
    while rx.recv().await.is_some() {
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }
        // Everything queued during the debounce window is covered by one pass
        while rx.try_recv().is_ok() {}

        if let Err(e) = run_pass(&target, &ctx).await {
            warn!(session_id = %target.session_id, error = %e, "Transcript change pass failed");
        }
    }
}

async fn read_baseline(path: &Path) -> Result<Option<FileWatchState>, SessionError> {
    match read_hashed(path).await? {
        Some((content, hash, mtime)) => Ok(Some(FileWatchState::baseline(&content, hash, mtime))),
        None => Ok(None),
    }
}

/// Full content, its hash and mtime; `None` when the file does not exist
async fn read_hashed(
    path: &Path,
) -> Result<Option<(Vec<u8>, ContentHash, Option<SystemTime>)>, SessionError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mtime = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok());
    let (content, hash) = tokio::task::spawn_blocking(move || {
        let hash = hash_content(&content);
        (content, hash)
    })
    .await
    .map_err(|e| SessionError::Io(io::Error::other(e)))?;
    Ok(Some((content, hash, mtime)))
}

async fn run_pass(target: &WatchTarget, ctx: &PassContext) -> Result<PassOutcome, SessionError> {
    let mut state = target.state.lock().await;

    let Some((content, hash, mtime)) = read_hashed(&target.log_path).await? else {
        if state.take().is_some() {
            info!(session_id = %target.session_id, "Transcript disappeared; state reset");
            return Ok(PassOutcome::Truncated);
        }
        return Ok(PassOutcome::Missing);
    };

    let (outcome, next) = evaluate(state.as_ref(), &content, hash, mtime);
    *state = next;

    let lines = match outcome {
        ChangeOutcome::Truncated => {
            info!(session_id = %target.session_id, size = content.len(), "Transcript truncated; state reset");
            return Ok(PassOutcome::Truncated);
        }
        ChangeOutcome::Unchanged => return Ok(PassOutcome::Unchanged),
        ChangeOutcome::NewContent { lines } => lines,
    };

    let mut events = 0;
    for line in &lines {
        let record = match TranscriptRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(session_id = %target.session_id, error = %e, "Skipping unparseable transcript line");
                continue;
            }
        };
        if let Some(cwd) = record.cwd() {
            target.set_project_path(cwd);
        }
        for classified in ctx.classifier.classify(&record) {
            debug!(session_id = %target.session_id, kind = %classified.kind, "Transcript event");
            ctx.sink.on_classified_event(TranscriptEvent::new(
                target.session_id.clone(),
                target.project_path(),
                classified.kind,
                classified.metadata,
            ));
            events += 1;
        }
    }

    Ok(PassOutcome::Processed {
        lines: lines.len(),
        events,
    })
}
