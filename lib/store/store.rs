use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel::sqlite::SqliteConnection;

use super::types::{CommentOrigin, LocalBug, StoreError, Tracker, Watch, WatchActivity, WatchComment};
use crate::sync_service::types::SyncErrorKind;

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct TrackerRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub name: String,
    #[diesel(sql_type = Text)]
    pub base_url: String,
    #[diesel(sql_type = Text)]
    pub kind: String,
    #[diesel(sql_type = Bool)]
    pub active: bool,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub batch_size: Option<i64>,
    #[diesel(sql_type = Bool)]
    pub sync_comments: bool,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct WatchRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = BigInt)]
    pub tracker_id: i64,
    #[diesel(sql_type = BigInt)]
    pub bug_id: i64,
    #[diesel(sql_type = Text)]
    pub remote_bug: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub remote_status: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub remote_importance: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub local_status: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub local_importance: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub last_changed: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub last_checked: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub next_check: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    pub last_error_type: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub unpushed_comments: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct ActivityRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = BigInt)]
    pub watch_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub result: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub report_id: Option<String>,
    #[diesel(sql_type = Text)]
    pub message: String,
    #[diesel(sql_type = BigInt)]
    pub activity_date: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct BugRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub duplicate_of: Option<i64>,
    #[diesel(sql_type = BigInt)]
    pub task_count: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct CommentRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = BigInt)]
    pub watch_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub remote_comment_id: Option<String>,
    #[diesel(sql_type = Text)]
    pub origin: String,
    #[diesel(sql_type = Text)]
    pub author: String,
    #[diesel(sql_type = Text)]
    pub body: String,
    #[diesel(sql_type = BigInt)]
    pub posted_at: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct TextRow {
    #[diesel(sql_type = Text)]
    pub value: String,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct IdRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
}

/// Raw-SQL surface shared by the Postgres and SQLite connections.
#[doc(hidden)]
pub trait WatchDb {
    fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError>;
    fn load_trackers(&mut self, sql: &str) -> Result<Vec<TrackerRow>, DieselError>;
    fn load_watches(&mut self, sql: &str) -> Result<Vec<WatchRow>, DieselError>;
    fn load_activity(&mut self, sql: &str) -> Result<Vec<ActivityRow>, DieselError>;
    fn load_bugs(&mut self, sql: &str) -> Result<Vec<BugRow>, DieselError>;
    fn load_comments(&mut self, sql: &str) -> Result<Vec<CommentRow>, DieselError>;
    fn load_counts(&mut self, sql: &str) -> Result<Vec<CountRow>, DieselError>;
    fn load_texts(&mut self, sql: &str) -> Result<Vec<TextRow>, DieselError>;
    fn load_ids(&mut self, sql: &str) -> Result<Vec<IdRow>, DieselError>;
}

macro_rules! impl_watch_db {
    ($conn:ty) => {
        impl WatchDb for $conn {
            fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError> {
                sql_query(sql).execute(self)
            }

            fn load_trackers(&mut self, sql: &str) -> Result<Vec<TrackerRow>, DieselError> {
                sql_query(sql).load::<TrackerRow>(self)
            }

            fn load_watches(&mut self, sql: &str) -> Result<Vec<WatchRow>, DieselError> {
                sql_query(sql).load::<WatchRow>(self)
            }

            fn load_activity(&mut self, sql: &str) -> Result<Vec<ActivityRow>, DieselError> {
                sql_query(sql).load::<ActivityRow>(self)
            }

            fn load_bugs(&mut self, sql: &str) -> Result<Vec<BugRow>, DieselError> {
                sql_query(sql).load::<BugRow>(self)
            }

            fn load_comments(&mut self, sql: &str) -> Result<Vec<CommentRow>, DieselError> {
                sql_query(sql).load::<CommentRow>(self)
            }

            fn load_counts(&mut self, sql: &str) -> Result<Vec<CountRow>, DieselError> {
                sql_query(sql).load::<CountRow>(self)
            }

            fn load_texts(&mut self, sql: &str) -> Result<Vec<TextRow>, DieselError> {
                sql_query(sql).load::<TextRow>(self)
            }

            fn load_ids(&mut self, sql: &str) -> Result<Vec<IdRow>, DieselError> {
                sql_query(sql).load::<IdRow>(self)
            }
        }
    };
}

impl_watch_db!(PgConnection);
impl_watch_db!(SqliteConnection);

pub(crate) fn map_tracker_row(row: TrackerRow) -> Tracker {
    Tracker {
        id: row.id,
        name: row.name,
        base_url: row.base_url,
        kind: row.kind,
        active: row.active,
        batch_size: row.batch_size,
        sync_comments: row.sync_comments,
    }
}

pub(crate) fn map_watch_row(row: WatchRow) -> Result<Watch, StoreError> {
    Ok(Watch {
        id: row.id,
        tracker_id: row.tracker_id,
        bug_id: row.bug_id,
        remote_bug: row.remote_bug,
        remote_status: row.remote_status,
        remote_importance: row.remote_importance,
        local_status: row.local_status,
        local_importance: row.local_importance,
        last_changed: from_epoch_opt(row.last_changed)?,
        last_checked: from_epoch_opt(row.last_checked)?,
        next_check: from_epoch_opt(row.next_check)?,
        last_error: parse_error_kind(row.last_error_type.as_deref())?,
        unpushed_comments: row.unpushed_comments,
    })
}

pub(crate) fn map_activity_row(row: ActivityRow) -> Result<WatchActivity, StoreError> {
    Ok(WatchActivity {
        id: row.id,
        watch_id: row.watch_id,
        result: parse_error_kind(row.result.as_deref())?,
        report_id: row.report_id,
        message: row.message,
        activity_date: from_epoch(row.activity_date)?,
    })
}

pub(crate) fn map_bug_row(row: BugRow) -> LocalBug {
    LocalBug {
        id: row.id,
        duplicate_of: row.duplicate_of,
        task_count: row.task_count,
    }
}

pub(crate) fn map_comment_row(row: CommentRow) -> Result<WatchComment, StoreError> {
    Ok(WatchComment {
        id: row.id,
        watch_id: row.watch_id,
        remote_comment_id: row.remote_comment_id,
        origin: CommentOrigin::from_db_str(&row.origin)?,
        author: row.author,
        body: row.body,
        posted_at: from_epoch(row.posted_at)?,
    })
}

fn parse_error_kind(value: Option<&str>) -> Result<Option<SyncErrorKind>, StoreError> {
    value
        .map(|raw| {
            SyncErrorKind::from_db_str(raw)
                .ok_or_else(|| StoreError::InvalidValue(format!("sync error kind {raw}")))
        })
        .transpose()
}

pub(crate) fn to_epoch(value: DateTime<Utc>) -> i64 {
    value.timestamp()
}

pub(crate) fn from_epoch(value: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(value, 0)
        .ok_or_else(|| StoreError::InvalidValue(format!("timestamp {value} out of range")))
}

fn from_epoch_opt(value: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(from_epoch).transpose()
}

pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn quote_opt(value: Option<&str>) -> String {
    value.map(quote).unwrap_or_else(|| "NULL".to_string())
}

pub(crate) fn quote_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values.into_iter().map(quote).collect::<Vec<_>>().join(", ")
}

pub(crate) fn sql_bool(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("o'brien"), "'o''brien'");
        assert_eq!(quote_opt(None), "NULL");
        assert_eq!(quote_list(["1", "2"]), "'1', '2'");
    }

    #[test]
    fn epoch_conversion_keeps_whole_seconds() {
        let at = from_epoch(1_714_564_800).expect("valid timestamp");
        assert_eq!(to_epoch(at), 1_714_564_800);
    }
}
