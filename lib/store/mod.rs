//! Durable watch state for the sync engine.
//!
//! Operations here are synchronous raw-SQL statements that work against both Postgres and
//! SQLite. They always run inside a [`Scope`] handed out by a [`TransactionalStore`]; async
//! callers go through `tokio::task::spawn_blocking` so runtime workers are never blocked.

mod ops;
mod scope;
mod store;
mod types;

pub use ops::{
    bug_has_watch_for, count_watches_for_tracker, get_bug, get_tracker_by_name, get_watch,
    insert_bug, insert_comment, insert_tracker, insert_watch, known_remote_comment_ids,
    list_activity, list_comments, list_trackers, load_watches_for_remote_bug,
    load_watches_needing_update, mark_comment_pushed, mark_watches_checked,
    record_check_result, record_error_for_pending_watches, reset_watches,
    set_tracker_batch_size, unpushed_comments, update_remote_state, NewComment, NewTracker,
    NewWatch, RemoteState,
};
pub use scope::{PooledStore, Scope, TransactionalStore};
pub use store::WatchDb;
pub use types::{
    CheckResult, CommentOrigin, LocalBug, StoreError, Tracker, Watch, WatchActivity, WatchComment,
};
