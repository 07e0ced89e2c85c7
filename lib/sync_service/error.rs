use chrono::TimeDelta;
use thiserror::Error;
use tokio::task::JoinError;

use crate::remote::RemoteError;
use crate::store::StoreError;

/// Failures that abort a whole tracker job or orchestrator run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("remote tracker call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("remote clock differs from local clock by {} seconds", .skew.num_seconds())]
    TimeSkewExceeded { skew: TimeDelta },

    #[error("unknown tracker {0}")]
    UnknownTracker(String),

    #[error("Task join error: {0}")]
    TaskJoinError(#[from] JoinError),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

