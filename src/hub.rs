//! Session hub: owns the process manager, terminal correlator and transcript
//! detector for one host, with explicit init and shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::SessionId;
use crate::error::SessionError;
use crate::session::{CloseObserver, SessionManager};
use crate::terminal::{CandidateSource, PtyTerminalHost, TerminalCorrelator};
use crate::transcript::{transcript_path_for, EventSink, TranscriptChangeDetector};

pub struct SessionHub {
    config: Config,
    manager: SessionManager,
    host: PtyTerminalHost,
    correlator: TerminalCorrelator,
    detector: TranscriptChangeDetector,
}

impl SessionHub {
    /// Build all components from `config`; classified transcript events go to `sink`
    pub fn init(config: Config, sink: Arc<dyn EventSink>) -> Self {
        let manager = SessionManager::new(config.session.clone());
        let host = PtyTerminalHost::new(manager.clone(), config.routing.label_template.clone());
        let correlator = TerminalCorrelator::new(Arc::new(host.clone()), &config.routing);
        let detector = TranscriptChangeDetector::new(&config.transcript, sink);

        info!(
            shell = %config.session.resolved_shell(),
            projects_dir = %config.transcript.resolved_projects_dir().display(),
            "Session hub initialized"
        );

        Self {
            config,
            manager,
            host,
            correlator,
            detector,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn correlator(&self) -> &TerminalCorrelator {
        &self.correlator
    }

    pub fn detector(&self) -> &TranscriptChangeDetector {
        &self.detector
    }

    /// Transcript location for a session started in `working_dir`
    pub fn transcript_path(&self, id: &SessionId, working_dir: &Path) -> PathBuf {
        transcript_path_for(
            &self.config.transcript.resolved_projects_dir(),
            working_dir,
            id,
        )
    }

    /// Start (or resume) the agent for `id`, bind its terminal and, when
    /// enabled, begin watching its transcript.
    ///
    /// A transcript watch that cannot be installed is logged, not returned.
    pub async fn start_session(
        &self,
        id: &SessionId,
        working_dir: &Path,
        resume: bool,
    ) -> Result<(), SessionError> {
        if resume {
            self.manager.resume_session(id, working_dir).await?;
        } else {
            self.manager.new_session(id, working_dir).await?;
        }

        let terminal = self
            .host
            .terminal(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        self.correlator.register_binding(id, terminal);
        self.host.focus(id);

        if !self.config.transcript.auto_watch {
            return Ok(());
        }

        let transcript = self.transcript_path(id, working_dir);
        match self.detector.start_monitoring(id, &transcript).await {
            Ok(()) => {
                // Stop watching once the process is gone for good
                let detector = self.detector.clone();
                let session_id = id.clone();
                let stop: CloseObserver = Box::new(move || {
                    detector.stop_monitoring(&session_id);
                });
                if let Err(stop) = self.manager.on_close_or_return(id, stop) {
                    stop();
                }
            }
            Err(e) => {
                warn!(session_id = %id, path = %transcript.display(), error = %e, "Failed to watch transcript");
            }
        }
        Ok(())
    }

    /// Send a line of input to the session's terminal
    pub async fn send_text(&self, id: &SessionId, text: &str) -> Result<CandidateSource, SessionError> {
        self.correlator.send_text(id, text).await
    }

    /// Send bytes verbatim to the session's terminal
    pub async fn send_raw_sequence(
        &self,
        id: &SessionId,
        payload: &str,
    ) -> Result<CandidateSource, SessionError> {
        self.correlator.send_raw_sequence(id, payload).await
    }

    /// Dispose the process, drop the binding and stop the transcript watch.
    ///
    /// Returns whether a process was running.
    pub fn end_session(&self, id: &SessionId) -> bool {
        self.detector.stop_monitoring(id);
        self.correlator.unbind(id);
        let disposed = self.manager.dispose(id);
        if disposed {
            info!(session_id = %id, "Session ended");
        }
        disposed
    }

    /// Tear everything down (teardown hook)
    pub fn shutdown(&self) {
        self.detector.stop_all();
        self.manager.dispose_all();
        info!("Session hub shut down");
    }
}
