use serde::Serialize;

use crate::reporting::ReportId;

/// Sentinel stored in configuration and on tracker rows meaning "no batch limit".
pub const BATCH_SIZE_UNLIMITED: i64 = 0;

/// Lower bound for an automatically suggested batch size.
pub const MIN_SUGGESTED_BATCH_SIZE: usize = 100;

/// Percentage of a tracker's watches checked per run when no batch size is configured.
pub const SUGGESTED_BATCH_PERCENT: usize = 2;

/// Closed taxonomy of check outcomes recorded on watches and activity rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    ConnectionError,
    Timeout,
    InvalidBugId,
    BugNotFound,
    PrivateRemoteBug,
    UnparsableBugData,
    UnparsableTrackerVersion,
    UnsupportedTrackerKind,
    TimeSkewExceeded,
    Unknown,
}

impl SyncErrorKind {
    pub fn as_db_str(self) -> &'static str {
        match self {
            SyncErrorKind::ConnectionError => "connection_error",
            SyncErrorKind::Timeout => "timeout",
            SyncErrorKind::InvalidBugId => "invalid_bug_id",
            SyncErrorKind::BugNotFound => "bug_not_found",
            SyncErrorKind::PrivateRemoteBug => "private_remote_bug",
            SyncErrorKind::UnparsableBugData => "unparsable_bug_data",
            SyncErrorKind::UnparsableTrackerVersion => "unparsable_tracker_version",
            SyncErrorKind::UnsupportedTrackerKind => "unsupported_tracker_kind",
            SyncErrorKind::TimeSkewExceeded => "time_skew_exceeded",
            SyncErrorKind::Unknown => "unknown",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "connection_error" => Some(SyncErrorKind::ConnectionError),
            "timeout" => Some(SyncErrorKind::Timeout),
            "invalid_bug_id" => Some(SyncErrorKind::InvalidBugId),
            "bug_not_found" => Some(SyncErrorKind::BugNotFound),
            "private_remote_bug" => Some(SyncErrorKind::PrivateRemoteBug),
            "unparsable_bug_data" => Some(SyncErrorKind::UnparsableBugData),
            "unparsable_tracker_version" => Some(SyncErrorKind::UnparsableTrackerVersion),
            "unsupported_tracker_kind" => Some(SyncErrorKind::UnsupportedTrackerKind),
            "time_skew_exceeded" => Some(SyncErrorKind::TimeSkewExceeded),
            "unknown" => Some(SyncErrorKind::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Upper bound on the number of remote bugs queried for one tracker in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSize {
    Unlimited,
    Limited(usize),
}

impl BatchSize {
    /// Interprets a stored/configured value; zero and negatives mean unlimited.
    pub fn from_count(count: i64) -> Self {
        if count <= BATCH_SIZE_UNLIMITED {
            BatchSize::Unlimited
        } else {
            BatchSize::Limited(usize::try_from(count).unwrap_or(usize::MAX))
        }
    }

    pub fn limit(self) -> Option<usize> {
        match self {
            BatchSize::Unlimited => None,
            BatchSize::Limited(limit) => Some(limit),
        }
    }

    /// Suggests a batch size for a tracker with `watch_count` watches.
    ///
    /// `max(100, ceil(0.02 * watch_count))`.
    pub fn suggest(watch_count: usize) -> Self {
        let proportional = watch_count
            .saturating_mul(SUGGESTED_BATCH_PERCENT)
            .saturating_add(99)
            / 100;
        BatchSize::Limited(proportional.max(MIN_SUGGESTED_BATCH_SIZE))
    }

    pub fn as_count(self) -> i64 {
        match self {
            BatchSize::Unlimited => BATCH_SIZE_UNLIMITED,
            BatchSize::Limited(limit) => i64::try_from(limit).unwrap_or(i64::MAX),
        }
    }
}

/// Remote ids chosen for one tracker run.
///
/// `with_comments`, `never_checked` and `possibly_modified` are disjoint and ordered by
/// priority. `to_check` is their concatenation truncated to the batch size, `unmodified`
/// holds previously-checked ids that need no query, and `all = to_check ++ unmodified`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatch {
    pub with_comments: Vec<String>,
    pub never_checked: Vec<String>,
    pub possibly_modified: Vec<String>,
    pub to_check: Vec<String>,
    pub unmodified: Vec<String>,
    pub all: Vec<String>,
}

impl SyncBatch {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Ephemeral result of querying one remote bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBugSnapshot {
    pub remote_status: String,
    pub remote_importance: String,
    pub comment_ids: Vec<String>,
}

/// Failure recorded against one remote bug during a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteBugError {
    pub remote_bug: String,
    pub kind: SyncErrorKind,
    pub report_id: ReportId,
}

/// Result of one successful tracker job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub tracker: String,
    /// Watches stamped as checked this run (every watch of every id in `all`).
    pub watches_checked: usize,
    pub remote_bugs_queried: usize,
    /// Watches whose remote status or importance changed.
    pub watches_updated: usize,
    pub comments_imported: usize,
    pub comments_pushed: usize,
    pub back_links_written: usize,
    pub errors: Vec<RemoteBugError>,
}

/// Why a tracker was not synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    NotFound,
}

/// Per-tracker result of an orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackerStatus {
    Completed(SyncOutcome),
    Skipped {
        reason: SkipReason,
    },
    Failed {
        kind: SyncErrorKind,
        report_id: ReportId,
        watches_recorded: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerResult {
    pub tracker: String,
    pub status: TrackerStatus,
}

/// Aggregate of one orchestrator run, in tracker-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncRunSummary {
    pub trackers: Vec<TrackerResult>,
}

impl SyncRunSummary {
    pub fn completed(&self) -> usize {
        self.trackers
            .iter()
            .filter(|result| matches!(result.status, TrackerStatus::Completed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.trackers
            .iter()
            .filter(|result| matches!(result.status, TrackerStatus::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.trackers
            .iter()
            .filter(|result| matches!(result.status, TrackerStatus::Skipped { .. }))
            .count()
    }

    pub fn result_for(&self, tracker: &str) -> Option<&TrackerStatus> {
        self.trackers
            .iter()
            .find(|result| result.tracker == tracker)
            .map(|result| &result.status)
    }
}
