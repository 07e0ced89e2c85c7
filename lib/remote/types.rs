use chrono::{DateTime, Utc};
use serde::Serialize;

/// Local bug status a remote status translates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    New,
    Incomplete,
    Confirmed,
    Triaged,
    InProgress,
    FixCommitted,
    FixReleased,
    Invalid,
    WontFix,
    Unknown,
}

impl LocalStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            LocalStatus::New => "new",
            LocalStatus::Incomplete => "incomplete",
            LocalStatus::Confirmed => "confirmed",
            LocalStatus::Triaged => "triaged",
            LocalStatus::InProgress => "in_progress",
            LocalStatus::FixCommitted => "fix_committed",
            LocalStatus::FixReleased => "fix_released",
            LocalStatus::Invalid => "invalid",
            LocalStatus::WontFix => "wont_fix",
            LocalStatus::Unknown => "unknown",
        }
    }
}

/// Local bug importance a remote importance translates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalImportance {
    Undecided,
    Wishlist,
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl LocalImportance {
    pub fn as_db_str(self) -> &'static str {
        match self {
            LocalImportance::Undecided => "undecided",
            LocalImportance::Wishlist => "wishlist",
            LocalImportance::Low => "low",
            LocalImportance::Medium => "medium",
            LocalImportance::High => "high",
            LocalImportance::Critical => "critical",
            LocalImportance::Unknown => "unknown",
        }
    }
}

/// Optional features a remote tracker reports when probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub comment_import: bool,
    pub comment_push: bool,
    pub back_linking: bool,
}

/// One comment as returned by a remote tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteComment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub posted_at: DateTime<Utc>,
}
