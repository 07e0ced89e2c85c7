#![cfg(feature = "test-support")]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use watch_sync_lib::clock::{Clock, FixedClock};
use watch_sync_lib::db::sqlite_test::in_memory_store;
use watch_sync_lib::remote::test_support::ScriptedTracker;
use watch_sync_lib::remote::{Capabilities, ClientRegistry, RemoteComment, RemoteError};
use watch_sync_lib::reporting::{ErrorReporter, MemoryReporter, Severity};
use watch_sync_lib::store::{
    get_tracker_by_name, get_watch, insert_bug, insert_comment, insert_tracker, insert_watch,
    list_activity, list_comments, CommentOrigin, NewComment, NewTracker, NewWatch,
    TransactionalStore, Watch, WatchActivity, WatchComment,
};
use watch_sync_lib::sync_service::types::{
    BatchSize, SkipReason, SyncErrorKind, SyncOutcome, SyncRunSummary, TrackerStatus,
};
use watch_sync_lib::sync_service::{Error, SchedulerKind, SyncOrchestrator};

const KIND: &str = "scripted";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

struct Harness {
    store: Arc<dyn TransactionalStore>,
    remote: Arc<ScriptedTracker>,
    reporter: Arc<MemoryReporter>,
    clock: Arc<FixedClock>,
    orchestrator: SyncOrchestrator,
}

impl Harness {
    fn new() -> Self {
        let remote = Arc::new(ScriptedTracker::new());
        remote.set_server_time(Some(start()));
        let registry = remote.registry(KIND);
        Self::with_registry(remote, registry)
    }

    fn with_registry(remote: Arc<ScriptedTracker>, registry: ClientRegistry) -> Self {
        let store = in_memory_store();
        let reporter = Arc::new(MemoryReporter::new("test-run"));
        let clock = Arc::new(FixedClock::new(start()));
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            Arc::new(registry),
            Arc::clone(&reporter) as Arc<dyn ErrorReporter>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self {
            store,
            remote,
            reporter,
            clock,
            orchestrator,
        }
    }

    fn tracker(&self, name: &str, kind: &str, sync_comments: bool) -> i64 {
        self.store
            .with_scope(|scope| {
                insert_tracker(
                    scope,
                    &NewTracker {
                        name,
                        base_url: "https://bugs.example.org",
                        kind,
                        active: true,
                        batch_size: None,
                        sync_comments,
                    },
                )
            })
            .expect("insert tracker")
    }

    fn inactive_tracker(&self, name: &str) -> i64 {
        self.store
            .with_scope(|scope| {
                insert_tracker(
                    scope,
                    &NewTracker {
                        name,
                        base_url: "https://bugs.example.org",
                        kind: KIND,
                        active: false,
                        batch_size: None,
                        sync_comments: false,
                    },
                )
            })
            .expect("insert tracker")
    }

    fn bug(&self) -> i64 {
        self.store
            .with_scope(|scope| insert_bug(scope, None, 1))
            .expect("insert bug")
    }

    /// Watch on a fresh live bug; returns the watch id.
    fn watch(&self, tracker_id: i64, remote_bug: &str) -> i64 {
        let bug_id = self.bug();
        self.watch_on(tracker_id, bug_id, remote_bug, None)
    }

    fn watch_on(
        &self,
        tracker_id: i64,
        bug_id: i64,
        remote_bug: &str,
        last_checked: Option<DateTime<Utc>>,
    ) -> i64 {
        self.store
            .with_scope(|scope| {
                insert_watch(
                    scope,
                    &NewWatch {
                        tracker_id,
                        bug_id,
                        remote_bug,
                        last_checked,
                        next_check: None,
                    },
                )
            })
            .expect("insert watch")
    }

    fn local_comment(&self, watch_id: i64, body: &str) -> i64 {
        self.store
            .with_scope(|scope| {
                insert_comment(
                    scope,
                    &NewComment {
                        watch_id,
                        remote_comment_id: None,
                        origin: CommentOrigin::Local,
                        author: "local-user",
                        body,
                        posted_at: start(),
                    },
                )
            })
            .expect("insert local comment")
    }

    fn watch_row(&self, watch_id: i64) -> Watch {
        self.store
            .with_scope(|scope| get_watch(scope, watch_id))
            .expect("load watch")
            .expect("watch exists")
    }

    fn activity(&self, watch_id: i64) -> Vec<WatchActivity> {
        self.store
            .with_scope(|scope| list_activity(scope, watch_id))
            .expect("load activity")
    }

    fn comments(&self, watch_id: i64) -> Vec<WatchComment> {
        self.store
            .with_scope(|scope| list_comments(scope, watch_id))
            .expect("load comments")
    }

    /// Moves local and remote clocks forward together.
    fn advance(&self, by: TimeDelta) {
        self.clock.advance(by);
        self.remote.set_server_time(Some(self.clock.now()));
    }

    async fn run(&self) -> SyncRunSummary {
        self.orchestrator
            .run_all(&[], None, SchedulerKind::Serial)
            .await
            .expect("sync run")
    }
}

fn completed<'a>(summary: &'a SyncRunSummary, tracker: &str) -> &'a SyncOutcome {
    match summary.result_for(tracker) {
        Some(TrackerStatus::Completed(outcome)) => outcome,
        other => panic!("expected {tracker} to complete, got {other:?}"),
    }
}

#[tokio::test]
async fn first_run_checks_everything_and_rerun_without_changes_queries_nothing() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let watches: Vec<i64> = ["1", "2", "3"]
        .iter()
        .map(|remote_bug| harness.watch(tracker_id, remote_bug))
        .collect();
    harness.remote.set_status("1", "NEW", "LOW");
    harness.remote.set_status("2", "CONFIRMED", "HIGH");
    harness.remote.set_status("3", "RESOLVED", "CRITICAL");

    let summary = harness.run().await;
    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.watches_checked, 3);
    assert_eq!(outcome.remote_bugs_queried, 3);
    assert_eq!(outcome.watches_updated, 3);
    assert!(outcome.errors.is_empty());
    assert_eq!(harness.remote.primed_batches(), vec![vec!["1", "2", "3"]]);

    let watch = harness.watch_row(watches[1]);
    assert_eq!(watch.remote_status.as_deref(), Some("CONFIRMED"));
    assert_eq!(watch.local_status.as_deref(), Some("confirmed"));
    assert_eq!(watch.local_importance.as_deref(), Some("high"));
    assert_eq!(watch.last_checked, Some(start()));
    assert_eq!(watch.last_changed, Some(start()));
    assert_eq!(watch.last_error, None);

    let activity = harness.activity(watches[1]);
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].result, None);
    assert_eq!(activity[0].report_id, None);

    harness.advance(TimeDelta::hours(1));
    let summary = harness.run().await;
    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.remote_bugs_queried, 0);
    assert_eq!(outcome.watches_updated, 0);
    assert_eq!(outcome.watches_checked, 3);
    assert_eq!(harness.remote.status_fetches().len(), 3);
    assert_eq!(harness.activity(watches[1]).len(), 1);

    let watch = harness.watch_row(watches[1]);
    assert_eq!(watch.last_checked, Some(start() + TimeDelta::hours(1)));
    assert_eq!(watch.last_changed, Some(start()));
}

#[tokio::test]
async fn only_remotely_modified_bugs_are_requeried() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let first = harness.watch(tracker_id, "1");
    let second = harness.watch(tracker_id, "2");
    harness.remote.set_status("1", "NEW", "LOW");
    harness.remote.set_status("2", "NEW", "LOW");
    harness.run().await;

    harness.advance(TimeDelta::hours(2));
    harness.remote.set_modified(["2"]);
    harness.remote.set_status("2", "RESOLVED", "HIGH");
    let summary = harness.run().await;

    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.remote_bugs_queried, 1);
    assert_eq!(outcome.watches_updated, 1);
    assert_eq!(harness.remote.status_fetches(), vec!["1", "2", "2"]);
    assert_eq!(
        harness.watch_row(second).local_status.as_deref(),
        Some("fix_released")
    );
    assert_eq!(harness.watch_row(first).remote_status.as_deref(), Some("NEW"));
}

#[tokio::test]
async fn one_failing_remote_bug_does_not_stop_the_others() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let ok_before = harness.watch(tracker_id, "1");
    let failing = harness.watch(tracker_id, "2");
    let ok_after = harness.watch(tracker_id, "3");
    harness.remote.set_status("1", "NEW", "LOW");
    harness.remote.set_status("3", "NEW", "LOW");

    let summary = harness.run().await;
    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.remote_bugs_queried, 3);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].remote_bug, "2");
    assert_eq!(outcome.errors[0].kind, SyncErrorKind::BugNotFound);

    let watch = harness.watch_row(failing);
    assert_eq!(watch.last_error, Some(SyncErrorKind::BugNotFound));
    assert_eq!(watch.last_checked, Some(start()));
    assert_eq!(watch.remote_status, None);

    let activity = harness.activity(failing);
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].result, Some(SyncErrorKind::BugNotFound));
    let report_id = activity[0].report_id.clone().expect("failure carries a report id");
    assert_eq!(report_id, outcome.errors[0].report_id);
    let report = harness.reporter.find(&report_id).expect("report captured");
    assert_eq!(report.severity, Severity::Error);
    assert_eq!(report.kind, SyncErrorKind::BugNotFound);
    assert_eq!(report.properties.get("remote_bug").map(String::as_str), Some("2"));

    for watch_id in [ok_before, ok_after] {
        let watch = harness.watch_row(watch_id);
        assert_eq!(watch.last_error, None);
        assert_eq!(watch.remote_status.as_deref(), Some("NEW"));
    }
}

#[tokio::test]
async fn batch_limit_keeps_priority_order() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("gnome-bugs", KIND, true);
    let earlier = Some(start() - TimeDelta::hours(1));
    let modified = harness.watch_on(tracker_id, harness.bug(), "12", earlier);
    let with_comment = harness.watch_on(tracker_id, harness.bug(), "10", earlier);
    harness.watch(tracker_id, "11");
    harness.local_comment(with_comment, "please backport");
    harness.remote.set_modified(["12"]);
    for remote_bug in ["10", "11", "12"] {
        harness.remote.set_status(remote_bug, "NEW", "LOW");
    }

    let summary = harness
        .orchestrator
        .run_all(&[], Some(BatchSize::Limited(2)), SchedulerKind::Serial)
        .await
        .expect("sync run");

    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.remote_bugs_queried, 2);
    assert_eq!(harness.remote.primed_batches(), vec![vec!["10", "11"]]);
    assert_eq!(harness.remote.status_fetches(), vec!["10", "11"]);
    assert_eq!(harness.watch_row(modified).last_checked, earlier);
    assert!(harness.activity(modified).is_empty());
}

#[tokio::test]
async fn time_skew_fails_the_tracker_and_records_every_due_watch() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("debbugs", KIND, false);
    let watches = [harness.watch(tracker_id, "1"), harness.watch(tracker_id, "2")];
    harness
        .remote
        .set_server_time(Some(start() + TimeDelta::minutes(11)));

    let summary = harness.run().await;
    let Some(TrackerStatus::Failed {
        kind,
        report_id,
        watches_recorded,
    }) = summary.result_for("debbugs")
    else {
        panic!("expected debbugs to fail: {summary:?}");
    };
    assert_eq!(*kind, SyncErrorKind::TimeSkewExceeded);
    assert_eq!(*watches_recorded, 2);
    assert!(harness.remote.status_fetches().is_empty());

    for watch_id in watches {
        let watch = harness.watch_row(watch_id);
        assert_eq!(watch.last_error, Some(SyncErrorKind::TimeSkewExceeded));
        let activity = harness.activity(watch_id);
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].report_id.as_deref(), Some(report_id.as_str()));
    }

    let report = harness.reporter.find(report_id).expect("report captured");
    assert_eq!(report.kind, SyncErrorKind::TimeSkewExceeded);
    assert_eq!(report.properties.get("tracker").map(String::as_str), Some("debbugs"));
}

#[tokio::test]
async fn skew_within_tolerance_is_accepted() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("debbugs", KIND, false);
    harness.watch(tracker_id, "1");
    harness.remote.set_status("1", "NEW", "LOW");
    harness
        .remote
        .set_server_time(Some(start() - TimeDelta::minutes(9)));

    let summary = harness.run().await;
    assert_eq!(completed(&summary, "debbugs").remote_bugs_queried, 1);
}

#[tokio::test]
async fn tracker_failures_are_isolated_from_other_trackers() {
    let harness = Harness::new();
    let healthy = harness.tracker("gnome-bugs", KIND, false);
    let unsupported = harness.tracker("roundup", "roundup", false);
    harness.watch(healthy, "1");
    let orphan = harness.watch(unsupported, "99");
    harness.remote.set_status("1", "NEW", "LOW");

    let summary = harness.run().await;
    assert_eq!(summary.completed(), 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(
        summary
            .trackers
            .iter()
            .map(|result| result.tracker.as_str())
            .collect::<Vec<_>>(),
        vec!["gnome-bugs", "roundup"]
    );
    assert!(matches!(
        summary.result_for("roundup"),
        Some(TrackerStatus::Failed {
            kind: SyncErrorKind::UnsupportedTrackerKind,
            watches_recorded: 1,
            ..
        })
    ));
    assert_eq!(
        harness.watch_row(orphan).last_error,
        Some(SyncErrorKind::UnsupportedTrackerKind)
    );
}

#[tokio::test]
async fn probe_failure_is_classified_as_connection_error() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let watch_id = harness.watch(tracker_id, "1");
    harness
        .remote
        .fail_probe(RemoteError::Connection("connection refused".to_string()));

    let summary = harness.run().await;
    assert!(matches!(
        summary.result_for("gnome-bugs"),
        Some(TrackerStatus::Failed {
            kind: SyncErrorKind::ConnectionError,
            watches_recorded: 1,
            ..
        })
    ));
    let activity = harness.activity(watch_id);
    assert_eq!(activity.len(), 1);
    assert!(activity[0].message.contains("connection refused"));
}

#[tokio::test]
async fn inactive_and_unknown_trackers_are_skipped() {
    let harness = Harness::new();
    let inactive = harness.inactive_tracker("sleepy");
    let watch_id = harness.watch(inactive, "1");

    let summary = harness
        .orchestrator
        .run_all(
            &["sleepy".to_string(), "missing".to_string()],
            None,
            SchedulerKind::Serial,
        )
        .await
        .expect("sync run");

    assert_eq!(summary.skipped(), 2);
    assert_eq!(
        summary.result_for("sleepy"),
        Some(&TrackerStatus::Skipped {
            reason: SkipReason::Inactive
        })
    );
    assert_eq!(
        summary.result_for("missing"),
        Some(&TrackerStatus::Skipped {
            reason: SkipReason::NotFound
        })
    );
    assert_eq!(harness.watch_row(watch_id).last_checked, None);
}

#[tokio::test]
async fn first_valid_back_link_claim_wins() {
    let harness = Harness::new();
    harness.remote.set_capabilities(Capabilities {
        back_linking: true,
        ..Capabilities::default()
    });
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let first_bug = harness.bug();
    let second_bug = harness.bug();
    harness.watch_on(tracker_id, first_bug, "7", None);
    harness.watch_on(tracker_id, second_bug, "7", None);
    let linked_to_8 = harness.bug();
    harness.watch_on(tracker_id, linked_to_8, "8", None);
    harness.remote.set_back_link("8", 9_999);
    harness.remote.set_status("7", "NEW", "LOW");
    harness.remote.set_status("8", "NEW", "LOW");

    let summary = harness.run().await;

    assert_eq!(completed(&summary, "gnome-bugs").back_links_written, 2);
    assert_eq!(harness.remote.back_link("7"), Some(first_bug));
    assert_eq!(harness.remote.back_link("8"), Some(linked_to_8));
    assert_eq!(
        harness
            .remote
            .back_link_writes()
            .iter()
            .filter(|(remote_bug, _)| remote_bug == "7")
            .count(),
        1
    );
}

#[tokio::test]
async fn duplicate_bugs_do_not_claim_back_links() {
    let harness = Harness::new();
    harness.remote.set_capabilities(Capabilities {
        back_linking: true,
        ..Capabilities::default()
    });
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let canonical = harness.bug();
    let duplicate = harness
        .store
        .with_scope(|scope| insert_bug(scope, Some(canonical), 1))
        .expect("insert duplicate bug");
    harness.watch_on(tracker_id, duplicate, "7", None);
    harness.remote.set_status("7", "NEW", "LOW");

    let summary = harness.run().await;

    assert_eq!(completed(&summary, "gnome-bugs").back_links_written, 0);
    assert_eq!(harness.remote.back_link("7"), None);
}

#[tokio::test]
async fn comments_are_imported_once_and_local_comments_pushed() {
    let harness = Harness::new();
    harness.remote.set_capabilities(Capabilities {
        comment_import: true,
        comment_push: true,
        back_linking: false,
    });
    let tracker_id = harness.tracker("gnome-bugs", KIND, true);
    let watch_id = harness.watch(tracker_id, "5");
    let local_id = harness.local_comment(watch_id, "fixed upstream in 2.1");
    harness.remote.set_status("5", "NEW", "LOW");
    for (id, body) in [("c1", "crashes on start"), ("c2", "me too")] {
        harness.remote.add_comment(
            "5",
            RemoteComment {
                id: id.to_string(),
                author: "reporter".to_string(),
                body: body.to_string(),
                posted_at: start() - TimeDelta::days(1),
            },
        );
    }

    let summary = harness.run().await;
    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.comments_imported, 2);
    assert_eq!(outcome.comments_pushed, 1);

    let pushed = harness.remote.pushed_comments();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].body, "fixed upstream in 2.1");
    assert_eq!(pushed[0].local_comment_id, local_id);

    let comments = harness.comments(watch_id);
    assert_eq!(comments.len(), 3);
    let local = comments
        .iter()
        .find(|comment| comment.id == local_id)
        .expect("local comment kept");
    assert_eq!(
        local.remote_comment_id.as_deref(),
        Some(pushed[0].remote_comment_id.as_str())
    );
    assert_eq!(harness.watch_row(watch_id).unpushed_comments, 0);

    harness.advance(TimeDelta::hours(1));
    harness.remote.set_modified(["5"]);
    harness.remote.add_comment(
        "5",
        RemoteComment {
            id: "c3".to_string(),
            author: "maintainer".to_string(),
            body: "released".to_string(),
            posted_at: start(),
        },
    );

    let summary = harness.run().await;
    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.comments_imported, 1);
    assert_eq!(outcome.comments_pushed, 0);
    assert_eq!(harness.comments(watch_id).len(), 4);
    assert_eq!(harness.remote.pushed_comments().len(), 1);
}

#[tokio::test]
async fn comment_sync_disabled_on_tracker_skips_comments() {
    let harness = Harness::new();
    harness.remote.set_capabilities(Capabilities {
        comment_import: true,
        comment_push: true,
        back_linking: false,
    });
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let watch_id = harness.watch(tracker_id, "5");
    harness.local_comment(watch_id, "not going anywhere");
    harness.remote.set_status("5", "NEW", "LOW");

    let summary = harness.run().await;
    let outcome = completed(&summary, "gnome-bugs");
    assert_eq!(outcome.comments_pushed, 0);
    assert!(harness.remote.pushed_comments().is_empty());
}

#[tokio::test]
async fn untranslatable_status_is_stored_as_unknown_with_a_warning() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    let watch_id = harness.watch(tracker_id, "3");
    harness.remote.set_status("3", "NEEDINFO", "LOW");

    let summary = harness.run().await;
    assert!(completed(&summary, "gnome-bugs").errors.is_empty());

    let watch = harness.watch_row(watch_id);
    assert_eq!(watch.remote_status.as_deref(), Some("NEEDINFO"));
    assert_eq!(watch.local_status.as_deref(), Some("unknown"));
    assert_eq!(watch.local_importance.as_deref(), Some("low"));
    assert_eq!(watch.last_error, None);

    let reports = harness.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::Warning);
    assert_eq!(
        reports[0].properties.get("remote_status").map(String::as_str),
        Some("NEEDINFO")
    );
}

#[tokio::test]
async fn suggested_batch_size_is_persisted_but_overrides_are_not() {
    let harness = Harness::new();
    let suggested = harness.tracker("gnome-bugs", KIND, false);
    let overridden = harness.tracker("debbugs", KIND, false);
    harness.watch(suggested, "1");
    harness.watch(overridden, "2");
    harness.remote.set_status("1", "NEW", "LOW");
    harness.remote.set_status("2", "NEW", "LOW");

    harness
        .orchestrator
        .run_all(&["gnome-bugs".to_string()], None, SchedulerKind::Serial)
        .await
        .expect("sync run");
    harness
        .orchestrator
        .run_all(
            &["debbugs".to_string()],
            Some(BatchSize::Limited(1)),
            SchedulerKind::Serial,
        )
        .await
        .expect("sync run");

    let batch_size = |name: &str| {
        harness
            .store
            .with_scope(|scope| get_tracker_by_name(scope, name))
            .expect("load tracker")
            .expect("tracker exists")
            .batch_size
    };
    assert_eq!(batch_size("gnome-bugs"), Some(100));
    assert_eq!(batch_size("debbugs"), None);
}

#[tokio::test]
async fn force_full_resync_requeries_every_watch() {
    let harness = Harness::new();
    let tracker_id = harness.tracker("gnome-bugs", KIND, false);
    for remote_bug in ["1", "2"] {
        harness.watch(tracker_id, remote_bug);
        harness.remote.set_status(remote_bug, "NEW", "LOW");
    }
    harness.run().await;

    harness.advance(TimeDelta::hours(1));
    let summary = harness
        .orchestrator
        .force_full_resync("gnome-bugs", None)
        .await
        .expect("resync");

    assert_eq!(completed(&summary, "gnome-bugs").remote_bugs_queried, 2);
    assert_eq!(harness.remote.status_fetches().len(), 4);

    let missing = harness.orchestrator.force_full_resync("nope", None).await;
    assert!(matches!(missing, Err(Error::UnknownTracker(name)) if name == "nope"));
}

#[tokio::test]
async fn parallel_and_serial_runs_produce_the_same_summary() {
    async fn run_with(kind: SchedulerKind) -> SyncRunSummary {
        let harness = Harness::new();
        for name in ["alpha", "beta", "gamma"] {
            let tracker_id = harness.tracker(name, KIND, false);
            for remote_bug in ["1", "2"] {
                harness.watch(tracker_id, remote_bug);
            }
        }
        let broken = harness.tracker("delta", "roundup", false);
        harness.watch(broken, "1");
        harness.remote.set_status("1", "NEW", "LOW");
        harness.remote.set_status("2", "ASSIGNED", "MEDIUM");

        harness
            .orchestrator
            .run_all(&[], None, kind)
            .await
            .expect("sync run")
    }

    let serial = run_with(SchedulerKind::Serial).await;
    let parallel = run_with(SchedulerKind::Parallel { workers: 3 }).await;

    assert_eq!(serial.completed(), 3);
    assert_eq!(serial.failed(), 1);
    assert_eq!(serial, parallel);
}
