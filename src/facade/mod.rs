pub(crate) mod ring;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::{sync::broadcast, time::Instant};

pub use ring::LogRing;

use crate::status::{format_uptime, StatusSnapshot, StreamStatus};

/// Default number of log lines kept for the status endpoint.
pub const DEFAULT_LOG_CAPACITY: usize = 20;

/// LastError is cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 200;

const PUSH_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

/// One accepted log line. Serializes as the push event `{time, text, type}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub time: String,
    pub text: String,
    #[serde(rename = "type")]
    pub severity: Severity,
}

impl LogEntry {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            text: text.into(),
            severity,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Info)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Warning)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Error)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Success)
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.time, self.text)
    }
}

#[derive(Debug)]
struct FacadeState {
    status: StreamStatus,
    live_since: Option<Instant>,
    last_error: String,
    logs: LogRing<LogEntry>,
    restarts: u32,
    pid: Option<u32>,
}

/// Shared view of the stream: status, LastError and the recent log ring.
///
/// Cloning is cheap and every clone observes the same state. Only the
/// supervisor moves the status; anyone may read a snapshot or subscribe to
/// accepted log lines.
#[derive(Debug, Clone)]
pub struct StatusFacade {
    state: Arc<RwLock<FacadeState>>,
    push_tx: broadcast::Sender<LogEntry>,
}

impl StatusFacade {
    pub fn new(log_capacity: usize) -> Self {
        let (push_tx, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(FacadeState {
                status: StreamStatus::Offline,
                live_since: None,
                last_error: String::new(),
                logs: LogRing::new(log_capacity),
                restarts: 0,
                pid: None,
            })),
            push_tx,
        }
    }

    /// Never fails, even if a writer panicked while holding the lock.
    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.read();
        let uptime = match (state.status, state.live_since) {
            (StreamStatus::Live, Some(since)) => since.elapsed(),
            _ => std::time::Duration::ZERO,
        };
        StatusSnapshot {
            status: state.status,
            uptime: format_uptime(uptime),
            uptime_secs: uptime.as_secs(),
            error: state.last_error.clone(),
            logs: state.logs.iter().map(ToString::to_string).collect(),
            restarts: state.restarts,
            pid: state.pid,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.read().status
    }

    pub fn last_error(&self) -> String {
        self.read().last_error.clone()
    }

    /// Entries currently held by the ring, oldest first.
    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.read().logs.iter().cloned().collect()
    }

    /// Stores the entry and pushes it to current subscribers. Nobody
    /// listening is not an error.
    pub fn append_log(&self, entry: LogEntry) {
        self.write().logs.push(entry.clone());
        let _ = self.push_tx.send(entry);
    }

    /// Overwrites LastError.
    pub fn record_error(&self, text: &str) {
        self.write().last_error = truncate_chars(text, MAX_ERROR_CHARS);
    }

    /// Late subscribers get no backlog; `snapshot()` covers that.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.push_tx.subscribe()
    }

    pub(crate) fn mark_starting(&self) {
        let mut state = self.write();
        state.status = StreamStatus::Starting;
        state.live_since = None;
        state.pid = None;
    }

    pub(crate) fn mark_live(&self, pid: Option<u32>) {
        let mut state = self.write();
        state.status = StreamStatus::Live;
        state.live_since = Some(Instant::now());
        state.pid = pid;
    }

    pub(crate) fn mark_offline(&self) {
        let mut state = self.write();
        state.status = StreamStatus::Offline;
        state.live_since = None;
        state.pid = None;
    }

    pub(crate) fn count_restart(&self) {
        let mut state = self.write();
        state.restarts = state.restarts.saturating_add(1);
    }

    fn read(&self) -> RwLockReadGuard<'_, FacadeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FacadeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StatusFacade {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
