//! Maps failures onto the closed [`SyncErrorKind`] taxonomy.
//!
//! The table is ordered; the first category matching any error in the `source()` chain wins,
//! and anything unmatched is `Unknown`.

use std::error::Error as StdError;
use std::io;

use super::error::Error;
use super::types::SyncErrorKind;
use crate::remote::RemoteError;

type Matcher = fn(&(dyn StdError + 'static)) -> bool;

const CLASSIFICATION_TABLE: &[(Matcher, SyncErrorKind)] = &[
    (is_time_skew, SyncErrorKind::TimeSkewExceeded),
    (is_unsupported_tracker_kind, SyncErrorKind::UnsupportedTrackerKind),
    (is_bug_not_found, SyncErrorKind::BugNotFound),
    (is_private_bug, SyncErrorKind::PrivateRemoteBug),
    (is_invalid_bug_id, SyncErrorKind::InvalidBugId),
    (is_unparsable_tracker_version, SyncErrorKind::UnparsableTrackerVersion),
    (is_unparsable_bug_data, SyncErrorKind::UnparsableBugData),
    (is_timeout, SyncErrorKind::Timeout),
    (is_connection_error, SyncErrorKind::ConnectionError),
];

/// Classifies `error` by walking its cause chain. Never fails.
pub fn classify(error: &(dyn StdError + 'static)) -> SyncErrorKind {
    CLASSIFICATION_TABLE
        .iter()
        .find(|(matches, _)| causes(error).any(|cause| matches(cause)))
        .map(|(_, kind)| *kind)
        .unwrap_or(SyncErrorKind::Unknown)
}

fn causes<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(error), |cause: &&'a (dyn StdError + 'static)| {
        (*cause).source()
    })
}

fn remote<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a RemoteError> {
    error.downcast_ref::<RemoteError>()
}

fn is_time_skew(error: &(dyn StdError + 'static)) -> bool {
    matches!(
        error.downcast_ref::<Error>(),
        Some(Error::TimeSkewExceeded { .. })
    )
}

fn is_unsupported_tracker_kind(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::UnsupportedTrackerKind(_)))
}

fn is_bug_not_found(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::BugNotFound(_)))
}

fn is_private_bug(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::PrivateRemoteBug(_)))
}

fn is_invalid_bug_id(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::InvalidBugId(_)))
}

fn is_unparsable_tracker_version(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::UnparsableTrackerVersion(_)))
}

fn is_unparsable_bug_data(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::UnparsableBugData { .. }))
        || error.is::<serde_json::Error>()
        || error
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_decode)
}

fn is_timeout(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::Timeout(_)))
        || error.is::<tokio::time::error::Elapsed>()
        || error
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_timeout)
        || error
            .downcast_ref::<io::Error>()
            .is_some_and(|err| err.kind() == io::ErrorKind::TimedOut)
}

fn is_connection_error(error: &(dyn StdError + 'static)) -> bool {
    matches!(remote(error), Some(RemoteError::Connection(_)))
        || error
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_connect)
        || error.downcast_ref::<io::Error>().is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
            )
        })
}
