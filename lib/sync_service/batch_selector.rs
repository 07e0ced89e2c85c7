//! Chooses which remote bugs a tracker job queries this run.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use super::error::Error;
use super::types::{BatchSize, SyncBatch};
use crate::remote::RemoteTrackerClient;
use crate::store::Watch;

/// Largest tolerated difference between the remote and local clocks.
pub const ACCEPTABLE_TIME_SKEW_MINUTES: i64 = 10;

/// Extra slack subtracted from the oldest check time when asking what changed.
pub const MODIFIED_SINCE_MARGIN_MINUTES: i64 = 1;

pub fn acceptable_time_skew() -> TimeDelta {
    TimeDelta::minutes(ACCEPTABLE_TIME_SKEW_MINUTES)
}

/// Fails when `server_time` and `local_time` are further apart than the acceptable skew.
pub fn check_time_skew(
    server_time: Option<DateTime<Utc>>,
    local_time: DateTime<Utc>,
) -> Result<(), Error> {
    let Some(server_time) = server_time else {
        return Ok(());
    };
    let skew = (server_time - local_time).abs();
    if skew > acceptable_time_skew() {
        return Err(Error::TimeSkewExceeded { skew });
    }
    Ok(())
}

/// Computes the prioritized batch for one tracker.
///
/// Priority is: ids with local comments awaiting push, then ids never checked, then ids the
/// remote reports as modified since the oldest check (minus skew and margin). When the remote
/// exposes no clock every previously-checked id counts as modified.
pub async fn select_batch(
    client: &dyn RemoteTrackerClient,
    watches: &[Watch],
    sync_comments: bool,
    server_time: Option<DateTime<Utc>>,
    local_time: DateTime<Utc>,
    batch_size: BatchSize,
) -> Result<SyncBatch, Error> {
    check_time_skew(server_time, local_time)?;

    if watches.is_empty() {
        return Ok(SyncBatch::default());
    }

    let mut never_checked = UniqueIds::default();
    let mut previously_checked = UniqueIds::default();
    let mut with_comments = UniqueIds::default();
    let mut oldest_checked: Option<DateTime<Utc>> = None;

    for watch in watches {
        match watch.last_checked {
            None => {
                never_checked.push(&watch.remote_bug);
            }
            Some(last_checked) => {
                previously_checked.push(&watch.remote_bug);
                oldest_checked = Some(
                    oldest_checked.map_or(last_checked, |oldest| oldest.min(last_checked)),
                );
                if sync_comments && watch.unpushed_comments > 0 {
                    with_comments.push(&watch.remote_bug);
                }
            }
        }
    }

    let modified: HashSet<String> = match (server_time, oldest_checked) {
        (Some(_), Some(oldest_checked)) => {
            let since = oldest_checked
                - acceptable_time_skew()
                - TimeDelta::minutes(MODIFIED_SINCE_MARGIN_MINUTES);
            fetch_modified(client, &previously_checked.ids, since, batch_size).await?
        }
        (None, _) => previously_checked.ids.iter().cloned().collect(),
        (Some(_), None) => HashSet::new(),
    };

    let mut candidates = UniqueIds::default();
    for remote_bug in &with_comments.ids {
        candidates.push(remote_bug);
    }
    let never_checked: Vec<String> = never_checked
        .ids
        .into_iter()
        .filter(|remote_bug| candidates.push(remote_bug))
        .collect();
    let possibly_modified: Vec<String> = previously_checked
        .ids
        .iter()
        .filter(|remote_bug| modified.contains(*remote_bug))
        .filter(|remote_bug| candidates.push(remote_bug))
        .cloned()
        .collect();

    let mut to_check = candidates.ids;
    if let Some(limit) = batch_size.limit() {
        to_check.truncate(limit);
    }

    let unmodified: Vec<String> = previously_checked
        .ids
        .into_iter()
        .filter(|remote_bug| !modified.contains(remote_bug) && !to_check.contains(remote_bug))
        .collect();

    let all = to_check.iter().chain(unmodified.iter()).cloned().collect();

    debug!(
        event = "sync_batch_selected",
        with_comments = with_comments.ids.len(),
        never_checked = never_checked.len(),
        possibly_modified = possibly_modified.len(),
        to_check = to_check.len(),
        unmodified = unmodified.len(),
        "selected remote bug batch"
    );

    Ok(SyncBatch {
        with_comments: with_comments.ids,
        never_checked,
        possibly_modified,
        to_check,
        unmodified,
        all,
    })
}

/// Asks the remote which ids changed, one page of at most `batch_size` ids at a time, until
/// enough modified ids have been collected.
async fn fetch_modified(
    client: &dyn RemoteTrackerClient,
    remote_bugs: &[String],
    since: DateTime<Utc>,
    batch_size: BatchSize,
) -> Result<HashSet<String>, Error> {
    let page_size = batch_size.limit().unwrap_or(remote_bugs.len()).max(1);
    let mut modified = HashSet::new();

    for page in remote_bugs.chunks(page_size) {
        modified.extend(client.modified_remote_bugs(page, since).await?);
        if batch_size
            .limit()
            .is_some_and(|limit| modified.len() >= limit)
        {
            break;
        }
    }

    Ok(modified)
}

/// Insertion-ordered set of remote ids.
#[derive(Default)]
struct UniqueIds {
    seen: HashSet<String>,
    ids: Vec<String>,
}

impl UniqueIds {
    /// Returns whether `remote_bug` was newly added.
    fn push(&mut self, remote_bug: &str) -> bool {
        if self.seen.contains(remote_bug) {
            return false;
        }
        self.seen.insert(remote_bug.to_string());
        self.ids.push(remote_bug.to_string());
        true
    }
}
