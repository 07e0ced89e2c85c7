use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::store::{
    map_activity_row, map_bug_row, map_comment_row, map_tracker_row, map_watch_row, quote,
    quote_list, quote_opt, sql_bool, to_epoch, WatchDb,
};
use super::types::{
    CheckResult, CommentOrigin, LocalBug, StoreError, Tracker, Watch, WatchActivity, WatchComment,
};

const TRACKER_COLUMNS: &str = "id, name, base_url, kind, active, batch_size, sync_comments";

const WATCH_SELECT: &str = "SELECT w.id, w.tracker_id, w.bug_id, w.remote_bug, w.remote_status, \
     w.remote_importance, w.local_status, w.local_importance, w.last_changed, w.last_checked, \
     w.next_check, w.last_error_type, \
     (SELECT COUNT(*) FROM watch_comments c \
      WHERE c.watch_id = w.id AND c.origin = 'local' AND c.remote_comment_id IS NULL) AS unpushed_comments \
     FROM bug_watches w";

const COMMENT_COLUMNS: &str = "id, watch_id, remote_comment_id, origin, author, body, posted_at";

/// Fields for a new `bug_trackers` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTracker<'a> {
    pub name: &'a str,
    pub base_url: &'a str,
    pub kind: &'a str,
    pub active: bool,
    pub batch_size: Option<i64>,
    pub sync_comments: bool,
}

/// Fields for a new `bug_watches` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWatch<'a> {
    pub tracker_id: i64,
    pub bug_id: i64,
    pub remote_bug: &'a str,
    pub last_checked: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
}

/// Fields for a new `watch_comments` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment<'a> {
    pub watch_id: i64,
    pub remote_comment_id: Option<&'a str>,
    pub origin: CommentOrigin,
    pub author: &'a str,
    pub body: &'a str,
    pub posted_at: DateTime<Utc>,
}

/// Remote and translated local state written after a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteState<'a> {
    pub remote_status: &'a str,
    pub remote_importance: &'a str,
    pub local_status: &'a str,
    pub local_importance: &'a str,
}

fn last_inserted_id<C>(conn: &mut C, table: &str) -> Result<i64, StoreError>
where
    C: WatchDb + ?Sized,
{
    conn.load_ids(&format!("SELECT id FROM {table} ORDER BY id DESC LIMIT 1"))?
        .pop()
        .map(|row| row.id)
        .ok_or_else(|| StoreError::InvalidValue(format!("insert into {table} returned no id")))
}

fn id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn insert_tracker<C>(conn: &mut C, tracker: &NewTracker<'_>) -> Result<i64, StoreError>
where
    C: WatchDb + ?Sized,
{
    let batch_size = tracker
        .batch_size
        .map(|size| size.to_string())
        .unwrap_or_else(|| "NULL".to_string());
    conn.execute_sql(&format!(
        "INSERT INTO bug_trackers (name, base_url, kind, active, batch_size, sync_comments) \
         VALUES ({}, {}, {}, {}, {batch_size}, {})",
        quote(tracker.name),
        quote(tracker.base_url),
        quote(tracker.kind),
        sql_bool(tracker.active),
        sql_bool(tracker.sync_comments),
    ))?;
    last_inserted_id(conn, "bug_trackers")
}

/// Lists trackers ordered by name. An empty `names` slice selects every tracker.
pub fn list_trackers<C>(conn: &mut C, names: &[String]) -> Result<Vec<Tracker>, StoreError>
where
    C: WatchDb + ?Sized,
{
    let filter = if names.is_empty() {
        String::new()
    } else {
        format!(
            " WHERE name IN ({})",
            quote_list(names.iter().map(String::as_str))
        )
    };
    let rows = conn.load_trackers(&format!(
        "SELECT {TRACKER_COLUMNS} FROM bug_trackers{filter} ORDER BY name ASC"
    ))?;
    Ok(rows.into_iter().map(map_tracker_row).collect())
}

pub fn get_tracker_by_name<C>(conn: &mut C, name: &str) -> Result<Option<Tracker>, StoreError>
where
    C: WatchDb + ?Sized,
{
    let mut rows = conn.load_trackers(&format!(
        "SELECT {TRACKER_COLUMNS} FROM bug_trackers WHERE name = {} LIMIT 1",
        quote(name)
    ))?;
    Ok(rows.pop().map(map_tracker_row))
}

/// Persists the tracker's batch size. `None` clears it back to "suggest on next run".
pub fn set_tracker_batch_size<C>(
    conn: &mut C,
    tracker_id: i64,
    batch_size: Option<i64>,
) -> Result<(), StoreError>
where
    C: WatchDb + ?Sized,
{
    let value = batch_size
        .map(|size| size.to_string())
        .unwrap_or_else(|| "NULL".to_string());
    conn.execute_sql(&format!(
        "UPDATE bug_trackers SET batch_size = {value} WHERE id = {tracker_id}"
    ))?;
    Ok(())
}

pub fn count_watches_for_tracker<C>(conn: &mut C, tracker_id: i64) -> Result<usize, StoreError>
where
    C: WatchDb + ?Sized,
{
    let rows = conn.load_counts(&format!(
        "SELECT COUNT(*) AS count FROM bug_watches WHERE tracker_id = {tracker_id}"
    ))?;
    let count = rows.first().map(|row| row.count).unwrap_or(0);
    usize::try_from(count).map_err(|_| StoreError::InvalidValue(format!("watch count {count}")))
}

pub fn insert_watch<C>(conn: &mut C, watch: &NewWatch<'_>) -> Result<i64, StoreError>
where
    C: WatchDb + ?Sized,
{
    let epoch_or_null = |value: Option<DateTime<Utc>>| {
        value
            .map(|at| to_epoch(at).to_string())
            .unwrap_or_else(|| "NULL".to_string())
    };
    conn.execute_sql(&format!(
        "INSERT INTO bug_watches (tracker_id, bug_id, remote_bug, last_checked, next_check) \
         VALUES ({}, {}, {}, {}, {})",
        watch.tracker_id,
        watch.bug_id,
        quote(watch.remote_bug),
        epoch_or_null(watch.last_checked),
        epoch_or_null(watch.next_check),
    ))?;
    last_inserted_id(conn, "bug_watches")
}

pub fn get_watch<C>(conn: &mut C, watch_id: i64) -> Result<Option<Watch>, StoreError>
where
    C: WatchDb + ?Sized,
{
    let mut rows = conn.load_watches(&format!("{WATCH_SELECT} WHERE w.id = {watch_id} LIMIT 1"))?;
    rows.pop().map(map_watch_row).transpose()
}

/// Loads the tracker's watches whose next check is due (or unset), ordered by id.
pub fn load_watches_needing_update<C>(
    conn: &mut C,
    tracker_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<Watch>, StoreError>
where
    C: WatchDb + ?Sized,
{
    let rows = conn.load_watches(&format!(
        "{WATCH_SELECT} \
         WHERE w.tracker_id = {tracker_id} \
           AND (w.next_check IS NULL OR w.next_check <= {}) \
         ORDER BY w.id ASC",
        to_epoch(now)
    ))?;
    rows.into_iter().map(map_watch_row).collect()
}

pub fn load_watches_for_remote_bug<C>(
    conn: &mut C,
    tracker_id: i64,
    remote_bug: &str,
) -> Result<Vec<Watch>, StoreError>
where
    C: WatchDb + ?Sized,
{
    let rows = conn.load_watches(&format!(
        "{WATCH_SELECT} WHERE w.tracker_id = {tracker_id} AND w.remote_bug = {} ORDER BY w.id ASC",
        quote(remote_bug)
    ))?;
    rows.into_iter().map(map_watch_row).collect()
}

/// Stamps `last_checked = now` and clears `next_check` on every watch of the given remote ids.
pub fn mark_watches_checked<C>(
    conn: &mut C,
    tracker_id: i64,
    remote_bugs: &[String],
    now: DateTime<Utc>,
) -> Result<usize, StoreError>
where
    C: WatchDb + ?Sized,
{
    if remote_bugs.is_empty() {
        return Ok(0);
    }
    // Chunked to stay well under SQLite's expression limits.
    let mut updated = 0;
    for chunk in remote_bugs.chunks(500) {
        updated += conn.execute_sql(&format!(
            "UPDATE bug_watches SET last_checked = {}, next_check = NULL \
             WHERE tracker_id = {tracker_id} AND remote_bug IN ({})",
            to_epoch(now),
            quote_list(chunk.iter().map(String::as_str))
        ))?;
    }
    Ok(updated)
}

/// Writes fetched remote state onto one watch and bumps `last_changed`.
pub fn update_remote_state<C>(
    conn: &mut C,
    watch_id: i64,
    state: &RemoteState<'_>,
    now: DateTime<Utc>,
) -> Result<(), StoreError>
where
    C: WatchDb + ?Sized,
{
    conn.execute_sql(&format!(
        "UPDATE bug_watches \
         SET remote_status = {}, remote_importance = {}, local_status = {}, local_importance = {}, \
             last_changed = {} \
         WHERE id = {watch_id}",
        quote(state.remote_status),
        quote(state.remote_importance),
        quote(state.local_status),
        quote(state.local_importance),
        to_epoch(now),
    ))?;
    Ok(())
}

/// Sets `last_error_type` on each watch and appends one activity row per watch.
pub fn record_check_result<C>(
    conn: &mut C,
    watch_ids: &[i64],
    check: &CheckResult<'_>,
    now: DateTime<Utc>,
) -> Result<usize, StoreError>
where
    C: WatchDb + ?Sized,
{
    if watch_ids.is_empty() {
        return Ok(0);
    }

    let result = quote_opt(check.result.map(|kind| kind.as_db_str()));
    conn.execute_sql(&format!(
        "UPDATE bug_watches SET last_error_type = {result} WHERE id IN ({})",
        id_list(watch_ids)
    ))?;

    let activity_date = to_epoch(now);
    for watch_id in watch_ids {
        conn.execute_sql(&format!(
            "INSERT INTO bug_watch_activity (watch_id, result, report_id, message, activity_date) \
             VALUES ({watch_id}, {result}, {}, {}, {activity_date})",
            quote_opt(check.report_id),
            quote(check.message),
        ))?;
    }
    Ok(watch_ids.len())
}

/// Records a whole-tracker failure against every due watch not yet checked in this run.
///
/// A watch is still pending when it was never checked or was last checked before
/// `started_at`. Pending watches are stamped checked at `now` so they are not retried until
/// the next run. Returns the number of watches recorded.
pub fn record_error_for_pending_watches<C>(
    conn: &mut C,
    tracker_id: i64,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    check: &CheckResult<'_>,
) -> Result<usize, StoreError>
where
    C: WatchDb + ?Sized,
{
    let pending: Vec<i64> = conn
        .load_ids(&format!(
            "SELECT id FROM bug_watches \
             WHERE tracker_id = {tracker_id} \
               AND (next_check IS NULL OR next_check <= {}) \
               AND (last_checked IS NULL OR last_checked < {}) \
             ORDER BY id ASC",
            to_epoch(now),
            to_epoch(started_at),
        ))?
        .into_iter()
        .map(|row| row.id)
        .collect();

    if pending.is_empty() {
        return Ok(0);
    }

    conn.execute_sql(&format!(
        "UPDATE bug_watches SET last_checked = {}, next_check = NULL WHERE id IN ({})",
        to_epoch(now),
        id_list(&pending)
    ))?;
    record_check_result(conn, &pending, check, now)
}

/// Clears check timestamps so every watch of the tracker is treated as never checked.
pub fn reset_watches<C>(conn: &mut C, tracker_id: i64) -> Result<usize, StoreError>
where
    C: WatchDb + ?Sized,
{
    Ok(conn.execute_sql(&format!(
        "UPDATE bug_watches SET last_checked = NULL, next_check = NULL \
         WHERE tracker_id = {tracker_id}"
    ))?)
}

pub fn insert_bug<C>(
    conn: &mut C,
    duplicate_of: Option<i64>,
    task_count: i64,
) -> Result<i64, StoreError>
where
    C: WatchDb + ?Sized,
{
    let duplicate_of = duplicate_of
        .map(|id| id.to_string())
        .unwrap_or_else(|| "NULL".to_string());
    conn.execute_sql(&format!(
        "INSERT INTO bugs (duplicate_of, task_count) VALUES ({duplicate_of}, {task_count})"
    ))?;
    last_inserted_id(conn, "bugs")
}

pub fn get_bug<C>(conn: &mut C, bug_id: i64) -> Result<Option<LocalBug>, StoreError>
where
    C: WatchDb + ?Sized,
{
    let mut rows = conn.load_bugs(&format!(
        "SELECT id, duplicate_of, task_count FROM bugs WHERE id = {bug_id} LIMIT 1"
    ))?;
    Ok(rows.pop().map(map_bug_row))
}

/// True when `bug_id` has a watch on the tracker pointing at `remote_bug`.
pub fn bug_has_watch_for<C>(
    conn: &mut C,
    bug_id: i64,
    tracker_id: i64,
    remote_bug: &str,
) -> Result<bool, StoreError>
where
    C: WatchDb + ?Sized,
{
    let rows = conn.load_counts(&format!(
        "SELECT COUNT(*) AS count FROM bug_watches \
         WHERE bug_id = {bug_id} AND tracker_id = {tracker_id} AND remote_bug = {}",
        quote(remote_bug)
    ))?;
    Ok(rows.first().map(|row| row.count > 0).unwrap_or(false))
}

pub fn insert_comment<C>(conn: &mut C, comment: &NewComment<'_>) -> Result<i64, StoreError>
where
    C: WatchDb + ?Sized,
{
    conn.execute_sql(&format!(
        "INSERT INTO watch_comments (watch_id, remote_comment_id, origin, author, body, posted_at) \
         VALUES ({}, {}, {}, {}, {}, {})",
        comment.watch_id,
        quote_opt(comment.remote_comment_id),
        quote(comment.origin.as_db_str()),
        quote(comment.author),
        quote(comment.body),
        to_epoch(comment.posted_at),
    ))?;
    last_inserted_id(conn, "watch_comments")
}

/// Remote comment ids already stored for the watch, whichever side they came from.
pub fn known_remote_comment_ids<C>(conn: &mut C, watch_id: i64) -> Result<HashSet<String>, StoreError>
where
    C: WatchDb + ?Sized,
{
    let rows = conn.load_texts(&format!(
        "SELECT remote_comment_id AS value FROM watch_comments \
         WHERE watch_id = {watch_id} AND remote_comment_id IS NOT NULL"
    ))?;
    Ok(rows.into_iter().map(|row| row.value).collect())
}

pub fn list_comments<C>(conn: &mut C, watch_id: i64) -> Result<Vec<WatchComment>, StoreError>
where
    C: WatchDb + ?Sized,
{
    conn.load_comments(&format!(
        "SELECT {COMMENT_COLUMNS} FROM watch_comments WHERE watch_id = {watch_id} ORDER BY id ASC"
    ))?
    .into_iter()
    .map(map_comment_row)
    .collect()
}

/// Local comments on the watch that have not been pushed to the remote yet.
pub fn unpushed_comments<C>(conn: &mut C, watch_id: i64) -> Result<Vec<WatchComment>, StoreError>
where
    C: WatchDb + ?Sized,
{
    conn.load_comments(&format!(
        "SELECT {COMMENT_COLUMNS} FROM watch_comments \
         WHERE watch_id = {watch_id} AND origin = {} AND remote_comment_id IS NULL \
         ORDER BY id ASC",
        quote(CommentOrigin::Local.as_db_str())
    ))?
    .into_iter()
    .map(map_comment_row)
    .collect()
}

pub fn mark_comment_pushed<C>(
    conn: &mut C,
    comment_id: i64,
    remote_comment_id: &str,
) -> Result<(), StoreError>
where
    C: WatchDb + ?Sized,
{
    let updated = conn.execute_sql(&format!(
        "UPDATE watch_comments SET remote_comment_id = {} \
         WHERE id = {comment_id} AND remote_comment_id IS NULL",
        quote(remote_comment_id)
    ))?;
    if updated == 0 {
        return Err(StoreError::InvalidInput(format!(
            "comment {comment_id} is missing or already pushed"
        )));
    }
    Ok(())
}

/// Activity rows for one watch, oldest first.
pub fn list_activity<C>(conn: &mut C, watch_id: i64) -> Result<Vec<WatchActivity>, StoreError>
where
    C: WatchDb + ?Sized,
{
    conn.load_activity(&format!(
        "SELECT id, watch_id, result, report_id, message, activity_date \
         FROM bug_watch_activity WHERE watch_id = {watch_id} ORDER BY id ASC"
    ))?
    .into_iter()
    .map(map_activity_row)
    .collect()
}
