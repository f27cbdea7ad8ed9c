//! Registry of PTY-backed agent sessions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::buffer::OutputBuffer;
use super::pty::{write_to, PtyCommand, PtyIo, PtyProcess, Utf8Decoder};
use crate::config::SessionSettings;
use crate::domain::SessionId;
use crate::error::SessionError;

/// How long the reader thread waits for output before rechecking the session
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Callback receiving one output chunk at a time
pub type OutputListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback run once when a session is disposed
pub type CloseObserver = Box<dyn FnOnce() + Send>;

/// Handle returned by [`SessionManager::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Lifecycle of a session process.
///
/// `Created -> Running -> Exited -> Disposed`, or straight to `Disposed` on an
/// explicit dispose. Nothing leaves `Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Running,
    Exited,
    Disposed,
}

impl SessionState {
    /// Whether the session still counts as live for duplicate detection
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Created | SessionState::Running)
    }
}

/// Snapshot of a session for listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub pid: Option<u32>,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    pub exit_code: Option<u32>,
    pub buffered_entries: usize,
}

/// One live PTY process and its observers
struct ProcessSession {
    id: SessionId,
    working_dir: PathBuf,
    created_at: DateTime<Utc>,
    process: PtyProcess,
    output: Mutex<OutputBuffer>,
    subscribers: Mutex<Vec<(SubscriptionId, OutputListener)>>,
    state: Mutex<SessionState>,
    exit_code: Mutex<Option<u32>>,
    grace_timer: Mutex<Option<JoinHandle<()>>>,
    close_observers: Mutex<Vec<CloseObserver>>,
}

impl ProcessSession {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` unless already disposed; returns the previous state
    fn transition(&self, next: SessionState) -> SessionState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let previous = *state;
        if previous != SessionState::Disposed {
            *state = next;
        }
        previous
    }

    /// Clamp, buffer, then fan out one chunk.
    ///
    /// The subscriber list is copied while the buffer lock is held so that
    /// [`SessionManager::subscribe_with_history`] sees every chunk exactly once.
    fn handle_output(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let (clamped, listeners) = {
            let mut output = self.output.lock().unwrap_or_else(|e| e.into_inner());
            let clamped = output.clamp_chunk(chunk);
            output.push(clamped.clone());
            let listeners: Vec<OutputListener> = self
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|(_, l)| l.clone())
                .collect();
            (clamped, listeners)
        };
        for listener in listeners {
            listener(&clamped);
        }
    }

    /// Tear down: cancel the grace timer, kill, close the PTY, drop observers
    fn shutdown(&self) {
        if self.transition(SessionState::Disposed) == SessionState::Disposed {
            return;
        }

        if let Some(timer) = self
            .grace_timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            timer.abort();
        }

        if let Err(e) = self.process.kill() {
            // Expected when the process already exited
            debug!(session_id = %self.id, error = %e, "Kill on dispose failed");
        }
        self.process.close();

        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let observers: Vec<CloseObserver> = self
            .close_observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for observer in observers {
            observer();
        }

        info!(session_id = %self.id, pid = ?self.process.pid(), "Session disposed");
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            pid: self.process.pid(),
            working_dir: self.working_dir.clone(),
            created_at: self.created_at,
            state: self.state(),
            exit_code: *self.exit_code.lock().unwrap_or_else(|e| e.into_inner()),
            buffered_entries: self.output.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Arc<ProcessSession>>,
    /// Ids held by a spawn that has not finished yet
    spawning: HashSet<SessionId>,
}

struct ManagerInner {
    settings: SessionSettings,
    registry: Mutex<Registry>,
    next_subscription: AtomicU64,
}

impl ManagerInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self, id: &SessionId) -> Option<Arc<ProcessSession>> {
        self.registry().sessions.get(id).cloned()
    }

    fn get_or_unknown(&self, id: &SessionId) -> Result<Arc<ProcessSession>, SessionError> {
        self.get(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))
    }

    /// Remove `session` from the registry only if it is still the registered instance
    fn remove_if_current(&self, session: &Arc<ProcessSession>) -> bool {
        let mut registry = self.registry();
        match registry.sessions.get(&session.id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                registry.sessions.remove(&session.id);
                true
            }
            _ => false,
        }
    }
}

/// Spawn reservation for one id, released when dropped
struct Reservation<'a> {
    inner: &'a ManagerInner,
    id: SessionId,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.inner.registry().spawning.remove(&self.id);
    }
}

/// Write on the blocking pool so runtime workers never wait on the PTY
async fn send_input(session: &ProcessSession, data: Vec<u8>) -> Result<(), SessionError> {
    let writer = session.process.writer();
    tokio::task::spawn_blocking(move || write_to(&writer, &data))
        .await
        .map_err(|e| SessionError::Io(std::io::Error::other(e)))??;
    Ok(())
}

/// Owns one PTY process per logical session and streams its output.
///
/// Cloning is cheap; all clones share the same registry. Must be used from
/// within a Tokio runtime, which drives the post-exit grace timers.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                settings,
                registry: Mutex::new(Registry::default()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Validate a raw id and spawn
    pub async fn spawn_raw(
        &self,
        raw_id: &str,
        working_dir: &Path,
        init_command: Option<&str>,
    ) -> Result<SessionId, SessionError> {
        let id = SessionId::parse(raw_id)?;
        self.spawn(&id, working_dir, init_command).await?;
        Ok(id)
    }

    /// Start a shell for `id` in a PTY, optionally seeded with `init_command`.
    ///
    /// Fails with [`SessionError::Duplicate`] while a live process exists for
    /// the id or another spawn for it is still in flight. A session that
    /// already exited but is still within its grace period is disposed and
    /// replaced. The PTY is opened on the blocking pool; the registry lock is
    /// only held to reserve the id and to insert the result.
    pub async fn spawn(
        &self,
        id: &SessionId,
        working_dir: &Path,
        init_command: Option<&str>,
    ) -> Result<(), SessionError> {
        let runtime = Handle::try_current().map_err(|_| {
            SessionError::Spawn(anyhow::anyhow!("sessions must be spawned within a Tokio runtime"))
        })?;
        let settings = &self.inner.settings;
        let shell = settings.resolved_shell();

        let (reservation, replaced) = {
            let mut registry = self.inner.registry();
            if registry.spawning.contains(id) {
                return Err(SessionError::Duplicate(id.to_string()));
            }
            let replaced = match registry.sessions.get(id) {
                Some(existing) if existing.state().is_live() => {
                    return Err(SessionError::Duplicate(id.to_string()));
                }
                Some(_) => registry.sessions.remove(id),
                None => None,
            };
            registry.spawning.insert(id.clone());
            let reservation = Reservation {
                inner: &self.inner,
                id: id.clone(),
            };
            (reservation, replaced)
        };

        if let Some(old) = replaced {
            debug!(session_id = %id, "Replacing exited session");
            old.shutdown();
        }

        let command = PtyCommand {
            shell: shell.clone(),
            cwd: working_dir.to_path_buf(),
            cols: settings.cols,
            rows: settings.rows,
            env: vec![("SESSIONLINK_SESSION_ID".to_string(), id.to_string())],
        };
        let (process, io) = tokio::task::spawn_blocking(move || PtyProcess::spawn(&command))
            .await
            .map_err(|e| SessionError::Spawn(anyhow::Error::new(e)))?
            .map_err(SessionError::Spawn)?;

        let session = Arc::new(ProcessSession {
            id: id.clone(),
            working_dir: working_dir.to_path_buf(),
            created_at: Utc::now(),
            process,
            output: Mutex::new(OutputBuffer::new(
                settings.max_output_entries,
                settings.max_line_length,
            )),
            subscribers: Mutex::new(Vec::new()),
            state: Mutex::new(SessionState::Created),
            exit_code: Mutex::new(None),
            grace_timer: Mutex::new(None),
            close_observers: Mutex::new(Vec::new()),
        });
        self.inner
            .registry()
            .sessions
            .insert(id.clone(), session.clone());
        drop(reservation);

        info!(
            session_id = %id,
            pid = ?session.process.pid(),
            cwd = %working_dir.display(),
            shell = %shell,
            "Session spawned"
        );

        self.start_io(&session, io, runtime);
        session.transition(SessionState::Running);

        if let Some(command) = init_command.filter(|c| !c.trim().is_empty()) {
            debug!(session_id = %id, command = %command, "Seeding initial command");
            if let Err(e) = send_input(&session, format!("{}\r", command).into_bytes()).await {
                warn!(session_id = %id, error = %e, "Failed to write initial command");
            }
        }

        Ok(())
    }

    /// Start a fresh agent conversation for `id`
    pub async fn new_session(&self, id: &SessionId, working_dir: &Path) -> Result<(), SessionError> {
        let command = self.agent_command(&self.inner.settings.new_session_args, id);
        self.spawn(id, working_dir, Some(&command)).await
    }

    /// Reattach to an existing agent conversation for `id`
    pub async fn resume_session(
        &self,
        id: &SessionId,
        working_dir: &Path,
    ) -> Result<(), SessionError> {
        let command = self.agent_command(&self.inner.settings.resume_session_args, id);
        self.spawn(id, working_dir, Some(&command)).await
    }

    /// Build the agent command line from an argument template
    pub fn agent_command(&self, args: &[String], id: &SessionId) -> String {
        let mut parts = vec![self.inner.settings.agent_binary.clone()];
        parts.extend(args.iter().map(|a| a.replace("{session_id}", id.as_str())));
        parts.join(" ")
    }

    /// Forward input to the session's process
    pub async fn write(&self, id: &SessionId, data: &str) -> Result<(), SessionError> {
        let session = self.inner.get_or_unknown(id)?;
        send_input(&session, data.as_bytes().to_vec()).await
    }

    pub fn resize(&self, id: &SessionId, cols: u16, rows: u16) -> Result<(), SessionError> {
        let session = self.inner.get_or_unknown(id)?;
        session.process.resize(cols, rows).map_err(SessionError::Terminal)
    }

    /// Register an output listener
    pub fn subscribe(
        &self,
        id: &SessionId,
        listener: OutputListener,
    ) -> Result<SubscriptionId, SessionError> {
        let session = self.inner.get_or_unknown(id)?;
        let sub = self.next_subscription_id();
        session
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((sub, listener));
        Ok(sub)
    }

    /// Snapshot the buffer and subscribe in one step, so no chunk is missed or seen twice
    pub fn subscribe_with_history(
        &self,
        id: &SessionId,
        listener: OutputListener,
    ) -> Result<(SubscriptionId, Vec<String>), SessionError> {
        let session = self.inner.get_or_unknown(id)?;
        let sub = self.next_subscription_id();
        let output = session.output.lock().unwrap_or_else(|e| e.into_inner());
        let history = output.snapshot();
        session
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((sub, listener));
        drop(output);
        Ok((sub, history))
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&self, id: &SessionId, sub: SubscriptionId) -> Result<bool, SessionError> {
        let session = self.inner.get_or_unknown(id)?;
        let mut subscribers = session.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(s, _)| *s != sub);
        Ok(subscribers.len() != before)
    }

    /// Copy of the buffered output, for late subscribers
    pub fn output_buffer(&self, id: &SessionId) -> Result<Vec<String>, SessionError> {
        let session = self.inner.get_or_unknown(id)?;
        let output = session.output.lock().unwrap_or_else(|e| e.into_inner());
        Ok(output.snapshot())
    }

    /// Run `observer` once when the session is disposed
    pub fn on_close(&self, id: &SessionId, observer: CloseObserver) -> Result<(), SessionError> {
        self.on_close_or_return(id, observer)
            .map_err(|_| SessionError::UnknownSession(id.to_string()))
    }

    /// Like [`Self::on_close`], but hands the observer back if the session is
    /// already gone so the caller can run it
    pub fn on_close_or_return(
        &self,
        id: &SessionId,
        observer: CloseObserver,
    ) -> Result<(), CloseObserver> {
        let Some(session) = self.inner.get(id) else {
            return Err(observer);
        };
        let mut observers = session
            .close_observers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // shutdown marks the state before draining, so this cannot miss the drain
        if session.state() == SessionState::Disposed {
            return Err(observer);
        }
        observers.push(observer);
        Ok(())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.get(id).is_some()
    }

    pub fn info(&self, id: &SessionId) -> Option<SessionInfo> {
        self.inner.get(id).map(|s| s.info())
    }

    /// Snapshots of all registered sessions, sorted by id
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<ProcessSession>> =
            self.inner.registry().sessions.values().cloned().collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }

    /// Dispose a session; a no-op when it is not registered.
    ///
    /// Returns whether a session was removed.
    pub fn dispose(&self, id: &SessionId) -> bool {
        let removed = self.inner.registry().sessions.remove(id);
        match removed {
            Some(session) => {
                session.shutdown();
                true
            }
            None => false,
        }
    }

    /// Dispose every session (teardown hook)
    pub fn dispose_all(&self) {
        let sessions: Vec<Arc<ProcessSession>> = self
            .inner
            .registry()
            .sessions
            .drain()
            .map(|(_, s)| s)
            .collect();
        for session in sessions {
            session.shutdown();
        }
    }

    fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed))
    }

    /// Start the reader and exit-waiter threads for a freshly spawned session
    fn start_io(&self, session: &Arc<ProcessSession>, io: PtyIo, runtime: Handle) {
        let PtyIo { mut reader, mut child } = io;

        // Weak: the reader must never keep a disposed session alive
        let reader_session = Arc::downgrade(session);
        let reader_id = session.id.clone();
        let reader_spawn = std::thread::Builder::new()
            .name(format!("pty-reader-{}", session.id))
            .spawn(move || {
                let mut decoder = Utf8Decoder::new();
                let mut buf = [0u8; 8192];
                loop {
                    let read = reader.read_timeout(&mut buf, READ_POLL_INTERVAL);
                    let Some(session) = reader_session
                        .upgrade()
                        .filter(|s| s.state() != SessionState::Disposed)
                    else {
                        debug!(session_id = %reader_id, "Session disposed, PTY reader stopping");
                        return;
                    };
                    match read {
                        Ok(None) => continue,
                        Ok(Some(0)) => break,
                        Ok(Some(n)) => {
                            let chunk = decoder.decode(&buf[..n]);
                            session.handle_output(&chunk);
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!(session_id = %reader_id, error = %e, "PTY read ended");
                            break;
                        }
                    }
                }
                if let Some(session) = reader_session.upgrade() {
                    if session.state() != SessionState::Disposed {
                        session.handle_output(&decoder.finish());
                    }
                }
            });
        if let Err(e) = reader_spawn {
            warn!(session_id = %session.id, error = %e, "Failed to start PTY reader thread");
        }

        let waiter_session = session.clone();
        let manager = Arc::downgrade(&self.inner);
        let grace = Duration::from_millis(self.inner.settings.exit_grace_period_ms);
        let waiter_spawn = std::thread::Builder::new()
            .name(format!("pty-waiter-{}", session.id))
            .spawn(move || {
                let code = match child.wait() {
                    Ok(status) => Some(status.exit_code()),
                    Err(e) => {
                        warn!(session_id = %waiter_session.id, error = %e, "Failed to wait for session process");
                        None
                    }
                };
                on_process_exit(waiter_session, code, manager, grace, runtime);
            });
        if let Err(e) = waiter_spawn {
            warn!(session_id = %session.id, error = %e, "Failed to start PTY waiter thread");
        }
    }
}

/// Record the exit and arm the cancellable grace timer
fn on_process_exit(
    session: Arc<ProcessSession>,
    exit_code: Option<u32>,
    manager: Weak<ManagerInner>,
    grace: Duration,
    runtime: Handle,
) {
    *session.exit_code.lock().unwrap_or_else(|e| e.into_inner()) = exit_code;
    if session.transition(SessionState::Exited) == SessionState::Disposed {
        return;
    }
    info!(session_id = %session.id, exit_code = ?exit_code, "Session process exited");

    let timer_session = session.clone();
    let timer = runtime.spawn(async move {
        tokio::time::sleep(grace).await;
        // Take our own handle so shutdown does not abort the running task
        timer_session
            .grace_timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(manager) = manager.upgrade() else {
            return;
        };
        if manager.remove_if_current(&timer_session) {
            debug!(session_id = %timer_session.id, "Grace period elapsed");
            timer_session.shutdown();
        }
    });

    let mut slot = session.grace_timer.lock().unwrap_or_else(|e| e.into_inner());
    if session.state() == SessionState::Disposed {
        timer.abort();
    } else {
        *slot = Some(timer);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn manager(shell: &str, grace_ms: u64) -> SessionManager {
        SessionManager::new(SessionSettings {
            shell: shell.to_string(),
            exit_grace_period_ms: grace_ms,
            ..SessionSettings::default()
        })
    }

    fn sid(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_grace_timer_spares_replacement_instance() {
        let dir = std::env::temp_dir();
        let manager = manager("/bin/sh", 50);
        let id = sid("timer-owner");

        manager.spawn(&id, &dir, None).await.unwrap();
        let old = manager.inner.get(&id).unwrap();
        // Put a second instance in place of the first
        assert!(manager.inner.remove_if_current(&old));
        manager.spawn(&id, &dir, None).await.unwrap();
        let current = manager.inner.get(&id).unwrap();
        assert!(!Arc::ptr_eq(&old, &current));

        // The first instance exits while its replacement is registered
        on_process_exit(
            old.clone(),
            Some(0),
            Arc::downgrade(&manager.inner),
            Duration::from_millis(50),
            Handle::current(),
        );
        assert_eq!(old.state(), SessionState::Exited);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(manager.contains(&id));
        assert_eq!(current.state(), SessionState::Running);
        assert_eq!(old.state(), SessionState::Exited);
        assert!(old.grace_timer.lock().unwrap().is_none());

        old.shutdown();
        manager.dispose_all();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_spawn_of_same_id_is_rejected() {
        let dir = std::env::temp_dir();
        let manager = manager("/bin/sh", 200);
        let id = sid("racing");

        let (first, second) = tokio::join!(
            manager.spawn(&id, &dir, None),
            manager.spawn(&id, &dir, None)
        );
        assert!(first.is_ok(), "got {:?}", first);
        assert!(matches!(second, Err(SessionError::Duplicate(_))), "got {:?}", second);
        assert!(manager.inner.registry().spawning.is_empty());
        assert_eq!(manager.list().len(), 1);

        manager.dispose_all();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_spawn_releases_reservation() {
        let dir = std::env::temp_dir();
        let manager = manager("/nonexistent/shell-for-test", 200);
        let id = sid("broken");

        let err = manager.spawn(&id, &dir, None).await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn(_)), "got {:?}", err);
        assert!(!manager.contains(&id));
        assert!(manager.inner.registry().spawning.is_empty());

        // The id is free for the next attempt
        let err = manager.spawn(&id, &dir, None).await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn(_)), "got {:?}", err);
    }
}
