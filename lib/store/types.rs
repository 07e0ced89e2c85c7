use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::sync_service::types::SyncErrorKind;

/// Error type for watch-store operations and transactional scopes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database operation failed: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("failed to connect to database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("a store scope is already open on this thread")]
    NestedScope,
    #[error("failed to check out a pooled connection: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("invalid value in database: {0}")]
    InvalidValue(String),
    #[error("invalid store input: {0}")]
    InvalidInput(String),
    #[error("failed to run migrations: {0}")]
    Migration(String),
}

/// Materialized row from `bug_trackers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    /// Registry key used to pick the remote client implementation.
    pub kind: String,
    pub active: bool,
    /// `None` until configured or suggested; `Some(0)` means unlimited.
    pub batch_size: Option<i64>,
    pub sync_comments: bool,
}

/// Materialized row from `bug_watches` plus the count of local comments awaiting push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub id: i64,
    pub tracker_id: i64,
    pub bug_id: i64,
    pub remote_bug: String,
    pub remote_status: Option<String>,
    pub remote_importance: Option<String>,
    pub local_status: Option<String>,
    pub local_importance: Option<String>,
    pub last_changed: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    pub last_error: Option<SyncErrorKind>,
    pub unpushed_comments: i64,
}

/// Materialized row from `bug_watch_activity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchActivity {
    pub id: i64,
    pub watch_id: i64,
    /// `None` records a successful check.
    pub result: Option<SyncErrorKind>,
    pub report_id: Option<String>,
    pub message: String,
    pub activity_date: DateTime<Utc>,
}

/// Local bug data the engine reads but never writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalBug {
    pub id: i64,
    pub duplicate_of: Option<i64>,
    pub task_count: i64,
}

impl LocalBug {
    /// Not a duplicate and has at least one task; only live bugs exchange comments and links.
    pub fn is_live(&self) -> bool {
        self.duplicate_of.is_none() && self.task_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOrigin {
    Remote,
    Local,
}

impl CommentOrigin {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            CommentOrigin::Remote => "remote",
            CommentOrigin::Local => "local",
        }
    }

    pub(crate) fn from_db_str(value: &str) -> Result<Self, StoreError> {
        match value {
            "remote" => Ok(CommentOrigin::Remote),
            "local" => Ok(CommentOrigin::Local),
            other => Err(StoreError::InvalidValue(format!("comment origin {other}"))),
        }
    }
}

/// Materialized row from `watch_comments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchComment {
    pub id: i64,
    pub watch_id: i64,
    pub remote_comment_id: Option<String>,
    pub origin: CommentOrigin,
    pub author: String,
    pub body: String,
    pub posted_at: DateTime<Utc>,
}

/// One activity row to append for a check attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult<'a> {
    pub result: Option<SyncErrorKind>,
    pub report_id: Option<&'a str>,
    pub message: &'a str,
}

impl<'a> CheckResult<'a> {
    pub fn success(message: &'a str) -> Self {
        Self {
            result: None,
            report_id: None,
            message,
        }
    }

    pub fn failure(kind: SyncErrorKind, report_id: &'a str, message: &'a str) -> Self {
        Self {
            result: Some(kind),
            report_id: Some(report_id),
            message,
        }
    }
}
