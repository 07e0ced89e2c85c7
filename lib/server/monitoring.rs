use crate::build_info;
use crate::sync_service::types::{SyncErrorKind, SyncRunSummary, TrackerStatus};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

/// Registers immutable build metadata for `/metrics` scraping.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "checkwatches",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

/// Label set for per-kind watch error counts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorKindLabels {
    pub kind: &'static str,
}

#[derive(Clone)]
pub struct SyncMetrics {
    /// Watches stamped as checked.
    pub watches_checked_total: Counter,
    /// Watches whose remote status or importance changed.
    pub watches_updated_total: Counter,
    /// Errors recorded against watches, by sync error kind.
    pub watch_errors_total: Family<ErrorKindLabels, Counter>,
    pub tracker_jobs_completed_total: Counter,
    pub tracker_jobs_failed_total: Counter,
    pub tracker_jobs_skipped_total: Counter,
    pub comments_imported_total: Counter,
    pub comments_pushed_total: Counter,
    pub back_links_written_total: Counter,
    /// Unix time of the last finished run.
    pub last_run_finished: Gauge,
}

impl SyncMetrics {
    fn init() -> Self {
        Self {
            watches_checked_total: Counter::default(),
            watches_updated_total: Counter::default(),
            watch_errors_total: Family::default(),
            tracker_jobs_completed_total: Counter::default(),
            tracker_jobs_failed_total: Counter::default(),
            tracker_jobs_skipped_total: Counter::default(),
            comments_imported_total: Counter::default(),
            comments_pushed_total: Counter::default(),
            back_links_written_total: Counter::default(),
            last_run_finished: Gauge::default(),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "watches_checked",
            "Total number of bug watches stamped as checked",
            metrics.watches_checked_total.clone(),
        );
        sub_registry.register(
            "watches_updated",
            "Total number of bug watches whose remote state changed",
            metrics.watches_updated_total.clone(),
        );
        sub_registry.register(
            "watch_errors",
            "Total number of errors recorded against bug watches",
            metrics.watch_errors_total.clone(),
        );
        sub_registry.register(
            "tracker_jobs_completed",
            "Total number of tracker jobs that completed",
            metrics.tracker_jobs_completed_total.clone(),
        );
        sub_registry.register(
            "tracker_jobs_failed",
            "Total number of tracker jobs that failed as a whole",
            metrics.tracker_jobs_failed_total.clone(),
        );
        sub_registry.register(
            "tracker_jobs_skipped",
            "Total number of trackers skipped as inactive or unknown",
            metrics.tracker_jobs_skipped_total.clone(),
        );
        sub_registry.register(
            "comments_imported",
            "Total number of remote comments imported",
            metrics.comments_imported_total.clone(),
        );
        sub_registry.register(
            "comments_pushed",
            "Total number of local comments pushed to remote trackers",
            metrics.comments_pushed_total.clone(),
        );
        sub_registry.register(
            "back_links_written",
            "Total number of remote back-links written",
            metrics.back_links_written_total.clone(),
        );
        sub_registry.register(
            "last_run_finished",
            "Unix time the last sync run finished",
            metrics.last_run_finished.clone(),
        );
        metrics
    }

    fn record_watch_errors(&self, kind: SyncErrorKind, count: usize) {
        self.watch_errors_total
            .get_or_create(&ErrorKindLabels {
                kind: kind.as_db_str(),
            })
            .inc_by(count as u64);
    }

    /// Folds one run summary into the counters.
    pub fn observe_run(&self, summary: &SyncRunSummary, finished_at_unix: i64) {
        for result in &summary.trackers {
            match &result.status {
                TrackerStatus::Completed(outcome) => {
                    self.tracker_jobs_completed_total.inc();
                    self.watches_checked_total
                        .inc_by(outcome.watches_checked as u64);
                    self.watches_updated_total
                        .inc_by(outcome.watches_updated as u64);
                    self.comments_imported_total
                        .inc_by(outcome.comments_imported as u64);
                    self.comments_pushed_total
                        .inc_by(outcome.comments_pushed as u64);
                    self.back_links_written_total
                        .inc_by(outcome.back_links_written as u64);
                    for error in &outcome.errors {
                        self.record_watch_errors(error.kind, 1);
                    }
                }
                TrackerStatus::Failed {
                    kind,
                    watches_recorded,
                    ..
                } => {
                    self.tracker_jobs_failed_total.inc();
                    self.record_watch_errors(*kind, *watches_recorded);
                }
                TrackerStatus::Skipped { .. } => {
                    self.tracker_jobs_skipped_total.inc();
                }
            }
        }
        self.last_run_finished.set(finished_at_unix);
    }
}

pub static SYNC_METRICS: OnceCell<SyncMetrics> = OnceCell::const_new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_service::types::{RemoteBugError, SyncOutcome, TrackerResult};
    use prometheus_client::encoding::text::encode;

    #[test]
    fn observe_run_counts_outcomes_and_error_kinds() {
        let mut registry = Registry::default();
        let metrics = SyncMetrics::register(&mut registry, "watch_sync");
        let summary = SyncRunSummary {
            trackers: vec![
                TrackerResult {
                    tracker: "debian".to_string(),
                    status: TrackerStatus::Completed(SyncOutcome {
                        tracker: "debian".to_string(),
                        watches_checked: 4,
                        watches_updated: 2,
                        errors: vec![RemoteBugError {
                            remote_bug: "2".to_string(),
                            kind: SyncErrorKind::BugNotFound,
                            report_id: "run-1".to_string(),
                        }],
                        ..SyncOutcome::default()
                    }),
                },
                TrackerResult {
                    tracker: "gnome".to_string(),
                    status: TrackerStatus::Failed {
                        kind: SyncErrorKind::TimeSkewExceeded,
                        report_id: "run-2".to_string(),
                        watches_recorded: 3,
                    },
                },
            ],
        };

        metrics.observe_run(&summary, 1_714_564_800);

        assert_eq!(metrics.watches_checked_total.get(), 4);
        assert_eq!(metrics.tracker_jobs_failed_total.get(), 1);
        assert_eq!(
            metrics
                .watch_errors_total
                .get_or_create(&ErrorKindLabels {
                    kind: "time_skew_exceeded"
                })
                .get(),
            3
        );

        let mut buffer = String::new();
        encode(&mut buffer, &registry).expect("encode metrics");
        assert!(buffer.contains("watch_sync_watches_checked_total 4"));
    }
}
