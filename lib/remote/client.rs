use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};

use super::error::RemoteError;
use super::types::{Capabilities, LocalImportance, LocalStatus, RemoteComment};

fn unsupported<'a, T>(feature: &'static str) -> BoxFuture<'a, Result<T, RemoteError>>
where
    T: Send + 'a,
{
    future::ready(Err(RemoteError::Unsupported(feature))).boxed()
}

/// Protocol adapter for one remote bug tracker.
///
/// Sync jobs only talk to trackers through this trait, so each tracker kind plugs in its own
/// implementation and tests can script failures without network access. Comment and back-link
/// methods are only called after [`probe`](Self::probe) reported the matching capability.
pub trait RemoteTrackerClient: Send + Sync {
    /// Checks the tracker is reachable and reports which optional features it supports.
    fn probe<'a>(&'a self) -> BoxFuture<'a, Result<Capabilities, RemoteError>>;

    /// The tracker's current clock, or `None` when it does not expose one.
    fn current_server_time<'a>(&'a self)
        -> BoxFuture<'a, Result<Option<DateTime<Utc>>, RemoteError>>;

    /// Which of `remote_bugs` changed since `since`.
    fn modified_remote_bugs<'a>(
        &'a self,
        remote_bugs: &'a [String],
        since: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Vec<String>, RemoteError>>;

    /// Primes the client with the ids about to be queried, typically with one bulk request.
    fn initialize_remote_bug_db<'a>(
        &'a self,
        remote_bugs: &'a [String],
    ) -> BoxFuture<'a, Result<(), RemoteError>>;

    fn remote_status<'a>(&'a self, remote_bug: &'a str) -> BoxFuture<'a, Result<String, RemoteError>>;

    fn remote_importance<'a>(
        &'a self,
        remote_bug: &'a str,
    ) -> BoxFuture<'a, Result<String, RemoteError>>;

    fn convert_remote_status(&self, remote_status: &str) -> Result<LocalStatus, RemoteError>;

    fn convert_remote_importance(
        &self,
        remote_importance: &str,
    ) -> Result<LocalImportance, RemoteError>;

    fn comment_ids<'a>(&'a self, _remote_bug: &'a str) -> BoxFuture<'a, Result<Vec<String>, RemoteError>> {
        unsupported("comment import")
    }

    /// Primes the client with the comments about to be read through [`comment`](Self::comment).
    fn fetch_comments<'a>(
        &'a self,
        _remote_bug: &'a str,
        _comment_ids: &'a [String],
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        unsupported("comment import")
    }

    fn comment<'a>(
        &'a self,
        _remote_bug: &'a str,
        _comment_id: &'a str,
    ) -> BoxFuture<'a, Result<RemoteComment, RemoteError>> {
        unsupported("comment import")
    }

    /// Posts a local comment and returns the id the remote assigned to it.
    fn add_remote_comment<'a>(
        &'a self,
        _remote_bug: &'a str,
        _body: &'a str,
        _local_comment_id: i64,
    ) -> BoxFuture<'a, Result<String, RemoteError>> {
        unsupported("comment push")
    }

    /// The local bug id the remote bug currently links back to, if any.
    fn linked_local_bug<'a>(
        &'a self,
        _remote_bug: &'a str,
    ) -> BoxFuture<'a, Result<Option<i64>, RemoteError>> {
        unsupported("back-linking")
    }

    fn set_linked_local_bug<'a>(
        &'a self,
        _remote_bug: &'a str,
        _local_bug_id: i64,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        unsupported("back-linking")
    }
}
