use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::classifier::classify;
use super::error::Error;
use super::job::{short_message, TrackerSyncJob};
use super::run_store_op;
use super::scheduler::{JobFailure, SchedulerKind};
use super::types::{
    BatchSize, SkipReason, SyncErrorKind, SyncOutcome, SyncRunSummary, TrackerResult,
    TrackerStatus,
};
use crate::clock::Clock;
use crate::remote::ClientRegistry;
use crate::reporting::{ErrorReporter, Severity};
use crate::server::monitoring::SYNC_METRICS;
use crate::store::{
    get_tracker_by_name, list_trackers, record_error_for_pending_watches, reset_watches,
    CheckResult, TransactionalStore, Tracker,
};

/// Runs tracker jobs for a set of trackers and aggregates their results.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<dyn TransactionalStore>,
    registry: Arc<ClientRegistry>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
}

impl SyncOrchestrator {
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
        }
    }

    /// Synchronizes the named trackers, or every tracker when `tracker_names` is empty.
    ///
    /// Inactive and unknown trackers are skipped. A job that fails as a whole is classified,
    /// reported and recorded against every watch of its tracker still pending in this run;
    /// the remaining jobs are unaffected.
    pub async fn run_all(
        &self,
        tracker_names: &[String],
        batch_size_override: Option<BatchSize>,
        scheduler_kind: SchedulerKind,
    ) -> Result<SyncRunSummary, Error> {
        let started_at = self.clock.now();
        let names = tracker_names.to_vec();
        let trackers = run_store_op(&self.store, move |scope| list_trackers(scope, &names)).await?;

        let mut results = Vec::new();
        let found: BTreeSet<&str> = trackers.iter().map(|tracker| tracker.name.as_str()).collect();
        for name in tracker_names {
            if !found.contains(name.as_str()) {
                warn!(event = "tracker_not_found", tracker = %name, "skipping unknown tracker");
                results.push(TrackerResult {
                    tracker: name.clone(),
                    status: TrackerStatus::Skipped {
                        reason: SkipReason::NotFound,
                    },
                });
            }
        }

        let (active, inactive): (Vec<Tracker>, Vec<Tracker>) =
            trackers.into_iter().partition(|tracker| tracker.active);
        for tracker in inactive {
            info!(
                event = "tracker_inactive",
                tracker = %tracker.name,
                "skipping inactive tracker"
            );
            results.push(TrackerResult {
                tracker: tracker.name,
                status: TrackerStatus::Skipped {
                    reason: SkipReason::Inactive,
                },
            });
        }

        let job = TrackerSyncJob::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.reporter),
            Arc::clone(&self.clock),
        )
        .with_batch_size_override(batch_size_override);

        let mut scheduler = scheduler_kind.build::<Result<SyncOutcome, Error>>();
        for tracker in &active {
            let job = job.clone();
            let tracker = tracker.clone();
            scheduler.submit(Box::pin(async move { job.run(&tracker).await }));
        }

        for report in scheduler.run_all().await {
            let Some(tracker) = active.get(report.index) else {
                continue;
            };
            let status = match report.result {
                Ok(Ok(outcome)) => TrackerStatus::Completed(outcome),
                Ok(Err(err)) => {
                    let kind = classify(&err);
                    self.settle_failure(tracker, started_at, kind, &err.to_string(), &short_message(&err))
                        .await
                }
                Err(failure) => {
                    let message = match failure {
                        JobFailure::Panicked(message) => format!("tracker job panicked: {message}"),
                        JobFailure::Lost => "tracker job was lost by its worker".to_string(),
                    };
                    self.settle_failure(tracker, started_at, SyncErrorKind::Unknown, &message, &message)
                        .await
                }
            };
            results.push(TrackerResult {
                tracker: tracker.name.clone(),
                status,
            });
        }

        results.sort_by(|left, right| left.tracker.cmp(&right.tracker));
        let summary = SyncRunSummary { trackers: results };

        if let Some(metrics) = SYNC_METRICS.get() {
            metrics.observe_run(&summary, self.clock.now().timestamp());
        }

        info!(
            event = "sync_run_summary",
            trackers = summary.trackers.len(),
            completed = summary.completed(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            summary = %serde_json::to_string(&summary).unwrap_or_default(),
            "sync run finished"
        );

        Ok(summary)
    }

    /// Forgets every check of `tracker_name` and synchronizes it serially from scratch.
    pub async fn force_full_resync(
        &self,
        tracker_name: &str,
        batch_size_override: Option<BatchSize>,
    ) -> Result<SyncRunSummary, Error> {
        let name = tracker_name.to_string();
        let tracker = run_store_op(&self.store, move |scope| get_tracker_by_name(scope, &name))
            .await?
            .ok_or_else(|| Error::UnknownTracker(tracker_name.to_string()))?;

        let tracker_id = tracker.id;
        let reset = run_store_op(&self.store, move |scope| reset_watches(scope, tracker_id)).await?;
        info!(
            event = "tracker_watches_reset",
            tracker = %tracker.name,
            watches = reset,
            "reset watches for full resync"
        );

        self.run_all(&[tracker.name], batch_size_override, SchedulerKind::Serial)
            .await
    }

    /// Reports a whole-tracker failure and records it on the tracker's pending watches.
    async fn settle_failure(
        &self,
        tracker: &Tracker,
        started_at: DateTime<Utc>,
        kind: SyncErrorKind,
        detail: &str,
        message: &str,
    ) -> TrackerStatus {
        let report_id = self.reporter.report(
            Severity::Error,
            kind,
            &format!("tracker {} failed to synchronize", tracker.name),
            &[
                ("tracker", tracker.name.clone()),
                ("tracker_kind", tracker.kind.clone()),
                ("error", detail.to_string()),
            ],
        );
        warn!(
            event = "tracker_sync_failed",
            tracker = %tracker.name,
            kind = %kind,
            report_id = %report_id,
            error = detail,
            "tracker job failed"
        );

        let tracker_id = tracker.id;
        let now = self.clock.now();
        let recorded_report_id = report_id.clone();
        let message = message.to_string();
        let watches_recorded = match run_store_op(&self.store, move |scope| {
            record_error_for_pending_watches(
                scope,
                tracker_id,
                started_at,
                now,
                &CheckResult::failure(kind, &recorded_report_id, &message),
            )
        })
        .await
        {
            Ok(recorded) => recorded,
            Err(err) => {
                error!(
                    event = "tracker_failure_record_failed",
                    tracker = %tracker.name,
                    error = %err,
                    "could not record tracker failure on pending watches"
                );
                0
            }
        };

        TrackerStatus::Failed {
            kind,
            report_id,
            watches_recorded,
        }
    }
}
