use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// State of an entry in the refresh queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for its run time.
    Pending,
    /// Claimed by a worker.
    Running,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Running => "running",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "running" => Some(QueueStatus::Running),
            _ => None,
        }
    }
}

/// A refresh waiting in, or claimed from, the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRefresh {
    pub id: i64,
    pub hook: String,
    /// Canonical JSON arguments, see [`crate::refresh::RefreshArgs`].
    pub args: String,
    pub run_at: DateTime<Utc>,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// The entry named no known report and was discarded.
    Rejected,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "rejected" => Some(RunStatus::Rejected),
            _ => None,
        }
    }
}

/// One execution of a queued refresh.
#[derive(Debug, Clone)]
pub struct RefreshRun {
    pub id: i64,
    pub hook: String,
    pub args: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

/// Result of recovering entries left running by an interrupted worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleRecovery {
    /// Entries returned to pending.
    pub requeued: usize,
    /// Entries dropped because a pending twin already covers them.
    pub superseded: usize,
}

impl StaleRecovery {
    pub fn total(&self) -> usize {
        self.requeued + self.superseded
    }
}

/// Range label used for reports computed without a time range.
pub const WHOLE_REPORT_RANGE: &str = "all";

/// Freshness marker of one cached report dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCacheEntry {
    pub report: String,
    pub range: String,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub refreshed_at: DateTime<Utc>,
}
