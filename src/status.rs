use std::time::Duration;

use serde::Serialize;

/// Observable state of the stream.
///
/// `Starting` covers the window between a start attempt and a confirmed spawn,
/// so callers never see `Live` before a child process exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum StreamStatus {
    #[default]
    Offline,
    Starting,
    Live,
}

impl StreamStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, StreamStatus::Live)
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, StreamStatus::Offline)
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "Offline"),
            Self::Starting => write!(f, "Starting"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Point-in-time copy of everything the status endpoint reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: StreamStatus,
    /// Time since the latest `Live` transition, formatted `HH:MM:SS`.
    pub uptime: String,
    pub uptime_secs: u64,
    pub error: String,
    pub logs: Vec<String>,
    pub restarts: u32,
    pub pid: Option<u32>,
}

pub(crate) fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
