//! Scripted remote tracker for exercising sync jobs without network access.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};

use super::client::RemoteTrackerClient;
use super::error::RemoteError;
use super::registry::ClientRegistry;
use super::types::{Capabilities, LocalImportance, LocalStatus, RemoteComment};

#[derive(Default)]
struct Script {
    capabilities: Capabilities,
    probe_error: Option<RemoteError>,
    prime_error: Option<RemoteError>,
    server_time: Option<DateTime<Utc>>,
    modified: HashSet<String>,
    statuses: HashMap<String, (String, String)>,
    bug_failures: HashMap<String, RemoteError>,
    comments: HashMap<String, Vec<RemoteComment>>,
    back_links: HashMap<String, i64>,
    next_pushed_id: u64,
    pushed: Vec<PushedComment>,
    primed: Vec<Vec<String>>,
    modified_queries: Vec<Vec<String>>,
    status_fetches: Vec<String>,
    back_link_writes: Vec<(String, i64)>,
}

/// A comment posted through [`RemoteTrackerClient::add_remote_comment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedComment {
    pub remote_bug: String,
    pub body: String,
    pub local_comment_id: i64,
    pub remote_comment_id: String,
}

/// In-memory remote tracker whose answers are set up by the test.
///
/// Status strings use a Bugzilla-like vocabulary: `NEW`, `CONFIRMED`, `ASSIGNED`, `RESOLVED`,
/// `INVALID`, `WONTFIX`; importances are `LOW`, `MEDIUM`, `HIGH`, `CRITICAL`. Anything else
/// fails translation.
#[derive(Default)]
pub struct ScriptedTracker {
    script: Mutex<Script>,
}

impl ScriptedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("scripted tracker mutex poisoned")
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.script().capabilities = capabilities;
    }

    pub fn fail_probe(&self, error: RemoteError) {
        self.script().probe_error = Some(error);
    }

    pub fn fail_priming(&self, error: RemoteError) {
        self.script().prime_error = Some(error);
    }

    pub fn set_server_time(&self, server_time: Option<DateTime<Utc>>) {
        self.script().server_time = server_time;
    }

    pub fn set_modified<I, S>(&self, remote_bugs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script().modified = remote_bugs.into_iter().map(Into::into).collect();
    }

    pub fn set_status(&self, remote_bug: &str, status: &str, importance: &str) {
        self.script().statuses.insert(
            remote_bug.to_string(),
            (status.to_string(), importance.to_string()),
        );
    }

    pub fn fail_bug(&self, remote_bug: &str, error: RemoteError) {
        self.script()
            .bug_failures
            .insert(remote_bug.to_string(), error);
    }

    pub fn clear_bug_failure(&self, remote_bug: &str) {
        self.script().bug_failures.remove(remote_bug);
    }

    pub fn add_comment(&self, remote_bug: &str, comment: RemoteComment) {
        self.script()
            .comments
            .entry(remote_bug.to_string())
            .or_default()
            .push(comment);
    }

    pub fn set_back_link(&self, remote_bug: &str, local_bug_id: i64) {
        self.script()
            .back_links
            .insert(remote_bug.to_string(), local_bug_id);
    }

    pub fn back_link(&self, remote_bug: &str) -> Option<i64> {
        self.script().back_links.get(remote_bug).copied()
    }

    pub fn back_link_writes(&self) -> Vec<(String, i64)> {
        self.script().back_link_writes.clone()
    }

    pub fn primed_batches(&self) -> Vec<Vec<String>> {
        self.script().primed.clone()
    }

    pub fn modified_queries(&self) -> Vec<Vec<String>> {
        self.script().modified_queries.clone()
    }

    pub fn status_fetches(&self) -> Vec<String> {
        self.script().status_fetches.clone()
    }

    pub fn pushed_comments(&self) -> Vec<PushedComment> {
        self.script().pushed.clone()
    }

    /// Registry that serves this tracker for `kind`.
    pub fn registry(self: &Arc<Self>, kind: &str) -> ClientRegistry {
        let mut registry = ClientRegistry::new();
        let tracker = Arc::clone(self);
        registry.register(kind, move |_| {
            Ok(Arc::clone(&tracker) as Arc<dyn RemoteTrackerClient>)
        });
        registry
    }

    fn bug_result<T>(
        &self,
        remote_bug: &str,
        read: impl FnOnce(&(String, String)) -> T,
    ) -> Result<T, RemoteError> {
        let script = self.script();
        if let Some(error) = script.bug_failures.get(remote_bug) {
            return Err(error.clone());
        }
        script
            .statuses
            .get(remote_bug)
            .map(read)
            .ok_or_else(|| RemoteError::BugNotFound(remote_bug.to_string()))
    }
}

fn ready<'a, T: Send + 'a>(value: Result<T, RemoteError>) -> BoxFuture<'a, Result<T, RemoteError>> {
    future::ready(value).boxed()
}

impl RemoteTrackerClient for ScriptedTracker {
    fn probe<'a>(&'a self) -> BoxFuture<'a, Result<Capabilities, RemoteError>> {
        let script = self.script();
        ready(match &script.probe_error {
            Some(error) => Err(error.clone()),
            None => Ok(script.capabilities),
        })
    }

    fn current_server_time<'a>(
        &'a self,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>, RemoteError>> {
        ready(Ok(self.script().server_time))
    }

    fn modified_remote_bugs<'a>(
        &'a self,
        remote_bugs: &'a [String],
        _since: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Vec<String>, RemoteError>> {
        let mut script = self.script();
        script.modified_queries.push(remote_bugs.to_vec());
        let modified = remote_bugs
            .iter()
            .filter(|remote_bug| script.modified.contains(*remote_bug))
            .cloned()
            .collect();
        ready(Ok(modified))
    }

    fn initialize_remote_bug_db<'a>(
        &'a self,
        remote_bugs: &'a [String],
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let mut script = self.script();
        script.primed.push(remote_bugs.to_vec());
        ready(match &script.prime_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        })
    }

    fn remote_status<'a>(&'a self, remote_bug: &'a str) -> BoxFuture<'a, Result<String, RemoteError>> {
        self.script().status_fetches.push(remote_bug.to_string());
        ready(self.bug_result(remote_bug, |(status, _)| status.clone()))
    }

    fn remote_importance<'a>(
        &'a self,
        remote_bug: &'a str,
    ) -> BoxFuture<'a, Result<String, RemoteError>> {
        ready(self.bug_result(remote_bug, |(_, importance)| importance.clone()))
    }

    fn convert_remote_status(&self, remote_status: &str) -> Result<LocalStatus, RemoteError> {
        match remote_status {
            "NEW" | "UNCONFIRMED" => Ok(LocalStatus::New),
            "CONFIRMED" => Ok(LocalStatus::Confirmed),
            "ASSIGNED" => Ok(LocalStatus::InProgress),
            "RESOLVED" => Ok(LocalStatus::FixReleased),
            "INVALID" => Ok(LocalStatus::Invalid),
            "WONTFIX" => Ok(LocalStatus::WontFix),
            other => Err(RemoteError::UnknownRemoteStatus(other.to_string())),
        }
    }

    fn convert_remote_importance(
        &self,
        remote_importance: &str,
    ) -> Result<LocalImportance, RemoteError> {
        match remote_importance {
            "LOW" => Ok(LocalImportance::Low),
            "MEDIUM" => Ok(LocalImportance::Medium),
            "HIGH" => Ok(LocalImportance::High),
            "CRITICAL" => Ok(LocalImportance::Critical),
            other => Err(RemoteError::UnknownRemoteImportance(other.to_string())),
        }
    }

    fn comment_ids<'a>(&'a self, remote_bug: &'a str) -> BoxFuture<'a, Result<Vec<String>, RemoteError>> {
        let ids = self
            .script()
            .comments
            .get(remote_bug)
            .map(|comments| comments.iter().map(|comment| comment.id.clone()).collect())
            .unwrap_or_default();
        ready(Ok(ids))
    }

    fn fetch_comments<'a>(
        &'a self,
        _remote_bug: &'a str,
        _comment_ids: &'a [String],
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        ready(Ok(()))
    }

    fn comment<'a>(
        &'a self,
        remote_bug: &'a str,
        comment_id: &'a str,
    ) -> BoxFuture<'a, Result<RemoteComment, RemoteError>> {
        let comment = self
            .script()
            .comments
            .get(remote_bug)
            .and_then(|comments| comments.iter().find(|comment| comment.id == comment_id))
            .cloned()
            .ok_or_else(|| RemoteError::UnparsableBugData {
                remote_bug: remote_bug.to_string(),
                message: format!("comment {comment_id} missing"),
            });
        ready(comment)
    }

    fn add_remote_comment<'a>(
        &'a self,
        remote_bug: &'a str,
        body: &'a str,
        local_comment_id: i64,
    ) -> BoxFuture<'a, Result<String, RemoteError>> {
        let mut script = self.script();
        script.next_pushed_id += 1;
        let remote_comment_id = format!("pushed-{}", script.next_pushed_id);
        script.pushed.push(PushedComment {
            remote_bug: remote_bug.to_string(),
            body: body.to_string(),
            local_comment_id,
            remote_comment_id: remote_comment_id.clone(),
        });
        ready(Ok(remote_comment_id))
    }

    fn linked_local_bug<'a>(
        &'a self,
        remote_bug: &'a str,
    ) -> BoxFuture<'a, Result<Option<i64>, RemoteError>> {
        ready(Ok(self.back_link(remote_bug)))
    }

    fn set_linked_local_bug<'a>(
        &'a self,
        remote_bug: &'a str,
        local_bug_id: i64,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let mut script = self.script();
        script
            .back_links
            .insert(remote_bug.to_string(), local_bug_id);
        script
            .back_link_writes
            .push((remote_bug.to_string(), local_bug_id));
        ready(Ok(()))
    }
}
