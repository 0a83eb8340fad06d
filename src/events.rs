//! Per-run event log.
//!
//! Every entry is also emitted through `tracing` with an `event_kind`
//! field, so the log file and the JSON report tell the same story.
//!
//! | Event Kind | Description |
//! |------------|-------------|
//! | `run.started` / `run.completed` | Run boundaries with totals |
//! | `query.skipped` | Query key already in the processed-query log |
//! | `query.blocked` | Search engine challenge; query abandoned |
//! | `query.failed` | Harvest error for one query |
//! | `article.saved` / `article.rejected` / `article.failed` | Per-URL verdicts |
//! | `target.started` / `target.completed` / `target.failed` | Analysis pass per target |

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub at: DateTime<Utc>,
    pub level: EventLevel,
    pub kind: &'static str,
    pub message: String,
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.at.format("%H:%M:%S"), self.level, self.message)
    }
}

#[derive(Debug, Default)]
pub struct RunLog {
    events: Vec<RunEvent>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, kind: &'static str, message: impl Into<String>) {
        self.push(EventLevel::Info, kind, message.into());
    }

    pub fn warn(&mut self, kind: &'static str, message: impl Into<String>) {
        self.push(EventLevel::Warn, kind, message.into());
    }

    pub fn error(&mut self, kind: &'static str, message: impl Into<String>) {
        self.push(EventLevel::Error, kind, message.into());
    }

    fn push(&mut self, level: EventLevel, kind: &'static str, message: String) {
        match level {
            EventLevel::Info => info!(event_kind = kind, "{message}"),
            EventLevel::Warn => warn!(event_kind = kind, "{message}"),
            EventLevel::Error => error!(event_kind = kind, "{message}"),
        }
        self.events.push(RunEvent {
            at: Utc::now(),
            level,
            kind,
            message,
        });
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn count(&self, level: EventLevel) -> usize {
        self.events.iter().filter(|e| e.level == level).count()
    }

    pub fn into_events(self) -> Vec<RunEvent> {
        self.events
    }
}
