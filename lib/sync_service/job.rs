//! One tracker's synchronization run.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use super::backlink::reconcile;
use super::batch_selector::select_batch;
use super::classifier::classify;
use super::error::Error;
use super::run_store_op;
use super::types::{BatchSize, RemoteBugError, RemoteBugSnapshot, SyncErrorKind, SyncOutcome};
use crate::clock::Clock;
use crate::remote::{
    Capabilities, ClientRegistry, LocalImportance, LocalStatus, RemoteComment, RemoteTrackerClient,
};
use crate::reporting::{ErrorReporter, Severity};
use crate::store::{
    count_watches_for_tracker, get_bug, insert_comment, known_remote_comment_ids,
    load_watches_for_remote_bug, load_watches_needing_update, mark_comment_pushed,
    mark_watches_checked, record_check_result, set_tracker_batch_size, unpushed_comments,
    update_remote_state, CheckResult, CommentOrigin, LocalBug, NewComment, RemoteState,
    TransactionalStore, Tracker, Watch,
};

/// Activity messages are capped so raw remote payloads never land in the table.
const MAX_ACTIVITY_MESSAGE_CHARS: usize = 200;

/// Counters for one successfully processed remote bug.
#[derive(Debug, Default, Clone, Copy)]
struct RemoteBugProgress {
    watches_updated: usize,
    comments_imported: usize,
    comments_pushed: usize,
    back_links_written: usize,
}

/// Unit of work synchronizing the due watches of one tracker.
///
/// Failures while processing a single remote bug are classified, reported and recorded against
/// that bug's watches; the job carries on with the next id. Failures before processing starts
/// (client lookup, probe, batch selection, priming) abort the whole job.
#[derive(Clone)]
pub struct TrackerSyncJob {
    store: Arc<dyn TransactionalStore>,
    registry: Arc<ClientRegistry>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    batch_size_override: Option<BatchSize>,
}

impl TrackerSyncJob {
    pub fn new(
        store: Arc<dyn TransactionalStore>,
        registry: Arc<ClientRegistry>,
        reporter: Arc<dyn ErrorReporter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            reporter,
            clock,
            batch_size_override: None,
        }
    }

    pub fn with_batch_size_override(mut self, batch_size: Option<BatchSize>) -> Self {
        self.batch_size_override = batch_size;
        self
    }

    pub async fn run(&self, tracker: &Tracker) -> Result<SyncOutcome, Error> {
        let tracker_id = tracker.id;
        let mut outcome = SyncOutcome {
            tracker: tracker.name.clone(),
            ..SyncOutcome::default()
        };

        let now = self.clock.now();
        let watches = run_store_op(&self.store, move |scope| {
            load_watches_needing_update(scope, tracker_id, now)
        })
        .await?;

        if watches.is_empty() {
            info!(
                event = "tracker_sync_nothing_due",
                tracker = %tracker.name,
                "no watches need checking"
            );
            return Ok(outcome);
        }

        let client = self.registry.client_for(tracker)?;
        let capabilities = client.probe().await?;
        let batch_size = self.resolve_batch_size(tracker).await?;
        let server_time = client.current_server_time().await?;

        let batch = select_batch(
            client.as_ref(),
            &watches,
            tracker.sync_comments,
            server_time,
            self.clock.now(),
            batch_size,
        )
        .await?;

        info!(
            event = "tracker_sync_started",
            tracker = %tracker.name,
            due_watches = watches.len(),
            to_check = batch.to_check.len(),
            unmodified = batch.unmodified.len(),
            batch_size = batch_size.as_count(),
            "synchronizing tracker"
        );

        if !batch.to_check.is_empty() {
            client.initialize_remote_bug_db(&batch.to_check).await?;
        }

        let all = batch.all.clone();
        let checked_at = self.clock.now();
        outcome.watches_checked = run_store_op(&self.store, move |scope| {
            mark_watches_checked(scope, tracker_id, &all, checked_at)
        })
        .await?;

        for remote_bug in &batch.to_check {
            outcome.remote_bugs_queried += 1;
            match self
                .process_remote_bug(client.as_ref(), capabilities, tracker, remote_bug)
                .await
            {
                Ok(progress) => {
                    outcome.watches_updated += progress.watches_updated;
                    outcome.comments_imported += progress.comments_imported;
                    outcome.comments_pushed += progress.comments_pushed;
                    outcome.back_links_written += progress.back_links_written;
                    self.record_for_remote_bug(tracker_id, remote_bug, None, None, "checked")
                        .await?;
                }
                Err(err) => {
                    let error = self.report_remote_bug_failure(tracker, remote_bug, &err);
                    let message = short_message(&err);
                    self.record_for_remote_bug(
                        tracker_id,
                        remote_bug,
                        Some(error.kind),
                        Some(error.report_id.clone()),
                        &message,
                    )
                    .await?;
                    outcome.errors.push(error);
                }
            }
        }

        info!(
            event = "tracker_sync_completed",
            tracker = %tracker.name,
            watches_checked = outcome.watches_checked,
            remote_bugs_queried = outcome.remote_bugs_queried,
            watches_updated = outcome.watches_updated,
            comments_imported = outcome.comments_imported,
            comments_pushed = outcome.comments_pushed,
            back_links_written = outcome.back_links_written,
            errors = outcome.errors.len(),
            "tracker synchronized"
        );

        Ok(outcome)
    }

    /// Override, then the tracker's stored size, then a suggestion persisted on the tracker.
    async fn resolve_batch_size(&self, tracker: &Tracker) -> Result<BatchSize, Error> {
        if let Some(batch_size) = self.batch_size_override {
            return Ok(batch_size);
        }
        if let Some(stored) = tracker.batch_size {
            return Ok(BatchSize::from_count(stored));
        }

        let tracker_id = tracker.id;
        let suggested = run_store_op(&self.store, move |scope| {
            let watch_count = count_watches_for_tracker(scope, tracker_id)?;
            let suggested = BatchSize::suggest(watch_count);
            set_tracker_batch_size(scope, tracker_id, Some(suggested.as_count()))?;
            Ok(suggested)
        })
        .await?;

        info!(
            event = "tracker_batch_size_suggested",
            tracker = %tracker.name,
            batch_size = suggested.as_count(),
            "persisted suggested batch size"
        );
        Ok(suggested)
    }

    async fn process_remote_bug(
        &self,
        client: &dyn RemoteTrackerClient,
        capabilities: Capabilities,
        tracker: &Tracker,
        remote_bug: &str,
    ) -> Result<RemoteBugProgress, Error> {
        let mut progress = RemoteBugProgress::default();
        let tracker_id = tracker.id;

        let mut snapshot = RemoteBugSnapshot {
            remote_status: client.remote_status(remote_bug).await?,
            remote_importance: client.remote_importance(remote_bug).await?,
            comment_ids: Vec::new(),
        };
        let local_status = self.translate_status(client, tracker, remote_bug, &snapshot.remote_status);
        let local_importance =
            self.translate_importance(client, tracker, remote_bug, &snapshot.remote_importance);

        let remote = remote_bug.to_string();
        let remote_status = snapshot.remote_status.clone();
        let remote_importance = snapshot.remote_importance.clone();
        let changed_at = self.clock.now();
        let (watches, updated) = run_store_op(&self.store, move |scope| {
            let mut watches = Vec::new();
            let mut updated = 0;
            for watch in load_watches_for_remote_bug(scope, tracker_id, &remote)? {
                let changed = watch.remote_status.as_deref() != Some(remote_status.as_str())
                    || watch.remote_importance.as_deref() != Some(remote_importance.as_str());
                if changed {
                    update_remote_state(
                        scope,
                        watch.id,
                        &RemoteState {
                            remote_status: &remote_status,
                            remote_importance: &remote_importance,
                            local_status: local_status.as_db_str(),
                            local_importance: local_importance.as_db_str(),
                        },
                        changed_at,
                    )?;
                    updated += 1;
                }
                let bug = get_bug(scope, watch.bug_id)?;
                watches.push((watch, bug));
            }
            Ok((watches, updated))
        })
        .await?;
        progress.watches_updated = updated;

        let live_watches: Vec<&Watch> = watches
            .iter()
            .filter(|(_, bug)| bug.as_ref().is_some_and(LocalBug::is_live))
            .map(|(watch, _)| watch)
            .collect();
        if live_watches.is_empty() {
            return Ok(progress);
        }

        let import_comments = tracker.sync_comments && capabilities.comment_import;
        let push_comments = tracker.sync_comments && capabilities.comment_push;

        if import_comments {
            snapshot.comment_ids = client.comment_ids(remote_bug).await?;
        }

        for watch in live_watches {
            if import_comments {
                progress.comments_imported += self
                    .import_comments(client, watch.id, remote_bug, &snapshot.comment_ids)
                    .await?;
            }
            if push_comments {
                progress.comments_pushed += self.push_comments(client, watch.id, remote_bug).await?;
            }
            if capabilities.back_linking {
                let outcome =
                    reconcile(client, &self.store, tracker_id, remote_bug, watch.bug_id).await?;
                if outcome.wrote_link() {
                    progress.back_links_written += 1;
                }
            }
        }

        Ok(progress)
    }

    fn translate_status(
        &self,
        client: &dyn RemoteTrackerClient,
        tracker: &Tracker,
        remote_bug: &str,
        remote_status: &str,
    ) -> LocalStatus {
        client
            .convert_remote_status(remote_status)
            .unwrap_or_else(|err| {
                self.warn_untranslatable(tracker, remote_bug, "remote_status", remote_status, &err);
                LocalStatus::Unknown
            })
    }

    fn translate_importance(
        &self,
        client: &dyn RemoteTrackerClient,
        tracker: &Tracker,
        remote_bug: &str,
        remote_importance: &str,
    ) -> LocalImportance {
        client
            .convert_remote_importance(remote_importance)
            .unwrap_or_else(|err| {
                self.warn_untranslatable(
                    tracker,
                    remote_bug,
                    "remote_importance",
                    remote_importance,
                    &err,
                );
                LocalImportance::Unknown
            })
    }

    fn warn_untranslatable(
        &self,
        tracker: &Tracker,
        remote_bug: &str,
        field: &str,
        value: &str,
        err: &crate::remote::RemoteError,
    ) {
        warn!(
            event = "remote_value_untranslatable",
            tracker = %tracker.name,
            remote_bug = remote_bug,
            field = field,
            value = value,
            "treating untranslatable remote value as unknown"
        );
        self.reporter.report(
            Severity::Warning,
            classify(err),
            &err.to_string(),
            &[
                ("tracker", tracker.name.clone()),
                ("remote_bug", remote_bug.to_string()),
                (field, value.to_string()),
            ],
        );
    }

    /// Imports remote comments the watch has not seen yet. Returns the number imported.
    async fn import_comments(
        &self,
        client: &dyn RemoteTrackerClient,
        watch_id: i64,
        remote_bug: &str,
        comment_ids: &[String],
    ) -> Result<usize, Error> {
        if comment_ids.is_empty() {
            return Ok(0);
        }

        let known =
            run_store_op(&self.store, move |scope| known_remote_comment_ids(scope, watch_id))
                .await?;
        let new_ids: Vec<String> = comment_ids
            .iter()
            .filter(|comment_id| !known.contains(*comment_id))
            .cloned()
            .collect();
        if new_ids.is_empty() {
            return Ok(0);
        }

        client.fetch_comments(remote_bug, &new_ids).await?;
        let mut comments: Vec<RemoteComment> = Vec::with_capacity(new_ids.len());
        let mut seen = HashSet::new();
        for comment_id in &new_ids {
            if seen.insert(comment_id.as_str()) {
                comments.push(client.comment(remote_bug, comment_id).await?);
            }
        }

        let imported = run_store_op(&self.store, move |scope| {
            for comment in &comments {
                insert_comment(
                    scope,
                    &NewComment {
                        watch_id,
                        remote_comment_id: Some(&comment.id),
                        origin: CommentOrigin::Remote,
                        author: &comment.author,
                        body: &comment.body,
                        posted_at: comment.posted_at,
                    },
                )?;
            }
            Ok(comments.len())
        })
        .await?;

        Ok(imported)
    }

    /// Pushes pending local comments one at a time, recording each remote id as it lands.
    async fn push_comments(
        &self,
        client: &dyn RemoteTrackerClient,
        watch_id: i64,
        remote_bug: &str,
    ) -> Result<usize, Error> {
        let pending =
            run_store_op(&self.store, move |scope| unpushed_comments(scope, watch_id)).await?;

        let mut pushed = 0;
        for comment in pending {
            let remote_comment_id = client
                .add_remote_comment(remote_bug, &comment.body, comment.id)
                .await?;
            let comment_id = comment.id;
            run_store_op(&self.store, move |scope| {
                mark_comment_pushed(scope, comment_id, &remote_comment_id)
            })
            .await?;
            pushed += 1;
        }
        Ok(pushed)
    }

    fn report_remote_bug_failure(
        &self,
        tracker: &Tracker,
        remote_bug: &str,
        err: &Error,
    ) -> RemoteBugError {
        let kind = classify(err);
        warn!(
            event = "remote_bug_sync_failed",
            tracker = %tracker.name,
            remote_bug = remote_bug,
            kind = %kind,
            error = %err,
            "failed to synchronize remote bug"
        );
        let report_id = self.reporter.report(
            Severity::Error,
            kind,
            &format!("failed to synchronize remote bug {remote_bug}"),
            &[
                ("tracker", tracker.name.clone()),
                ("tracker_kind", tracker.kind.clone()),
                ("remote_bug", remote_bug.to_string()),
                ("error", err.to_string()),
            ],
        );
        RemoteBugError {
            remote_bug: remote_bug.to_string(),
            kind,
            report_id,
        }
    }

    /// Appends one activity row per watch of `remote_bug` and updates their last error.
    async fn record_for_remote_bug(
        &self,
        tracker_id: i64,
        remote_bug: &str,
        kind: Option<SyncErrorKind>,
        report_id: Option<String>,
        message: &str,
    ) -> Result<usize, Error> {
        let remote = remote_bug.to_string();
        let message = message.to_string();
        let now = self.clock.now();
        run_store_op(&self.store, move |scope| {
            let watch_ids: Vec<i64> = load_watches_for_remote_bug(scope, tracker_id, &remote)?
                .into_iter()
                .map(|watch| watch.id)
                .collect();
            record_check_result(
                scope,
                &watch_ids,
                &CheckResult {
                    result: kind,
                    report_id: report_id.as_deref(),
                    message: &message,
                },
                now,
            )
        })
        .await
    }
}

pub(crate) fn short_message(err: &dyn std::error::Error) -> String {
    let message = err.to_string();
    match message.char_indices().nth(MAX_ACTIVITY_MESSAGE_CHARS) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message,
    }
}
