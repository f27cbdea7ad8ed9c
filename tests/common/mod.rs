//! Shared test utilities for session, routing and transcript tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sessionlink::config::{Config, SessionSettings};
use sessionlink::terminal::{TerminalHandle, TerminalHost, TerminalId};
use sessionlink::transcript::EventSink;
use sessionlink::TranscriptEvent;

/// Session settings that work in CI: plain `/bin/sh`, short grace period
pub fn test_session_settings() -> SessionSettings {
    SessionSettings {
        shell: "/bin/sh".to_string(),
        exit_grace_period_ms: 200,
        ..SessionSettings::default()
    }
}

/// Full config with test session settings and no debounce
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session = test_session_settings();
    config.transcript.debounce_ms = 0;
    config
}

/// Poll `cond` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Event sink that records everything it receives
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<TranscriptEvent>>>,
}

impl EventCollector {
    pub fn events(&self) -> Vec<TranscriptEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::new(self.clone())
    }
}

impl EventSink for EventCollector {
    fn on_classified_event(&self, event: TranscriptEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory terminal that records what was sent to it
pub struct FakeTerminal {
    id: String,
    label: String,
    sent: Mutex<Vec<(String, bool)>>,
    shown: AtomicUsize,
    closed: AtomicBool,
    close_callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl FakeTerminal {
    pub fn new(id: &str, label: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
            shown: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            close_callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Everything sent so far as `(text, add_newline)`
    pub fn sent(&self) -> Vec<(String, bool)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }

    /// Simulate the host closing the terminal
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let callbacks: Vec<_> = self.close_callbacks.lock().unwrap().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }
}

#[async_trait]
impl TerminalHandle for FakeTerminal {
    fn id(&self) -> TerminalId {
        TerminalId(self.id.clone())
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    async fn send_text(&self, text: &str, add_newline: bool) -> Result<()> {
        self.sent.lock().unwrap().push((text.to_string(), add_newline));
        Ok(())
    }

    fn show(&self) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self, callback: Box<dyn FnOnce() + Send>) {
        if self.closed.load(Ordering::SeqCst) {
            callback();
        } else {
            self.close_callbacks.lock().unwrap().push(callback);
        }
    }
}

/// Host with a mutable list of terminals and a focus slot
#[derive(Default)]
pub struct FakeHost {
    terminals: Mutex<Vec<Arc<FakeTerminal>>>,
    active: Mutex<Option<Arc<FakeTerminal>>>,
    scans: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self, id: &str, label: &str) -> Arc<FakeTerminal> {
        let terminal = FakeTerminal::new(id, label);
        self.terminals.lock().unwrap().push(terminal.clone());
        terminal
    }

    /// Close and forget a terminal
    pub fn close(&self, terminal: &Arc<FakeTerminal>) {
        self.terminals
            .lock()
            .unwrap()
            .retain(|t| !Arc::ptr_eq(t, terminal));
        let mut active = self.active.lock().unwrap();
        if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, terminal)) {
            *active = None;
        }
        drop(active);
        terminal.close();
    }

    pub fn focus(&self, terminal: &Arc<FakeTerminal>) {
        *self.active.lock().unwrap() = Some(terminal.clone());
    }

    /// How many times the terminal list was requested
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl TerminalHost for FakeHost {
    fn terminals(&self) -> Vec<Arc<dyn TerminalHandle>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.terminals
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.clone() as Arc<dyn TerminalHandle>)
            .collect()
    }

    fn active_terminal(&self) -> Option<Arc<dyn TerminalHandle>> {
        self.active
            .lock()
            .unwrap()
            .clone()
            .map(|t| t as Arc<dyn TerminalHandle>)
    }
}
