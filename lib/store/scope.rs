//! Explicit commit-or-abort scopes over pooled diesel connections.
//!
//! A scope is a value handed to a closure; the transaction commits when the closure returns
//! `Ok` and rolls back on `Err`. Scopes are synchronous, so async callers run them through
//! `tokio::task::spawn_blocking` and never hold one across an `.await`.

use std::cell::Cell;

use diesel::connection::Connection;
use diesel::r2d2::{ConnectionManager, Pool, R2D2Connection};
use diesel::result::Error as DieselError;

use super::store::{
    ActivityRow, BugRow, CommentRow, CountRow, IdRow, TextRow, TrackerRow, WatchDb, WatchRow,
};
use super::types::StoreError;

/// Open transaction handed to store operations.
pub struct Scope<'a> {
    db: &'a mut dyn WatchDb,
}

impl<'a> Scope<'a> {
    pub fn new(db: &'a mut dyn WatchDb) -> Self {
        Self { db }
    }
}

impl WatchDb for Scope<'_> {
    fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError> {
        self.db.execute_sql(sql)
    }

    fn load_trackers(&mut self, sql: &str) -> Result<Vec<TrackerRow>, DieselError> {
        self.db.load_trackers(sql)
    }

    fn load_watches(&mut self, sql: &str) -> Result<Vec<WatchRow>, DieselError> {
        self.db.load_watches(sql)
    }

    fn load_activity(&mut self, sql: &str) -> Result<Vec<ActivityRow>, DieselError> {
        self.db.load_activity(sql)
    }

    fn load_bugs(&mut self, sql: &str) -> Result<Vec<BugRow>, DieselError> {
        self.db.load_bugs(sql)
    }

    fn load_comments(&mut self, sql: &str) -> Result<Vec<CommentRow>, DieselError> {
        self.db.load_comments(sql)
    }

    fn load_counts(&mut self, sql: &str) -> Result<Vec<CountRow>, DieselError> {
        self.db.load_counts(sql)
    }

    fn load_texts(&mut self, sql: &str) -> Result<Vec<TextRow>, DieselError> {
        self.db.load_texts(sql)
    }

    fn load_ids(&mut self, sql: &str) -> Result<Vec<IdRow>, DieselError> {
        self.db.load_ids(sql)
    }
}

/// Store that hands out transactional scopes.
pub trait TransactionalStore: Send + Sync {
    /// Runs `op` inside one transaction. Prefer [`with_scope`](dyn TransactionalStore::with_scope).
    fn run_scoped(
        &self,
        op: &mut dyn FnMut(&mut Scope<'_>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}

impl dyn TransactionalStore {
    /// Runs `op` in a fresh scope, committing on `Ok` and rolling back on `Err`.
    ///
    /// Fails with [`StoreError::NestedScope`] when called from inside another scope on the
    /// same thread.
    pub fn with_scope<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Scope<'_>) -> Result<T, StoreError>,
    {
        let mut op = Some(op);
        let mut output = None;
        self.run_scoped(&mut |scope| {
            let op = op
                .take()
                .ok_or_else(|| StoreError::InvalidInput("scope body ran twice".to_string()))?;
            output = Some(op(scope)?);
            Ok(())
        })?;
        output.ok_or_else(|| StoreError::InvalidInput("scope body never ran".to_string()))
    }
}

/// [`TransactionalStore`] over an r2d2 pool of diesel connections.
///
/// Every scope checks out its own connection, so scopes on different threads run
/// concurrently up to the pool size.
pub struct PooledStore<C: R2D2Connection + Send + 'static> {
    pool: Pool<ConnectionManager<C>>,
}

impl<C: R2D2Connection + Send + 'static> PooledStore<C> {
    pub fn new(pool: Pool<ConnectionManager<C>>) -> Self {
        Self { pool }
    }
}

thread_local! {
    static SCOPE_OPEN: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a scope until dropped.
struct ScopeClaim;

impl ScopeClaim {
    fn acquire() -> Result<Self, StoreError> {
        if SCOPE_OPEN.with(|open| open.replace(true)) {
            return Err(StoreError::NestedScope);
        }
        Ok(Self)
    }
}

impl Drop for ScopeClaim {
    fn drop(&mut self) {
        SCOPE_OPEN.with(|open| open.set(false));
    }
}

impl<C> TransactionalStore for PooledStore<C>
where
    C: R2D2Connection + WatchDb + Send + 'static,
{
    fn run_scoped(
        &self,
        op: &mut dyn FnMut(&mut Scope<'_>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let _claim = ScopeClaim::acquire()?;
        let mut pooled = self.pool.get()?;
        let conn: &mut C = &mut pooled;

        conn.transaction::<(), StoreError, _>(|conn| {
            let mut scope = Scope::new(conn);
            op(&mut scope)
        })
    }
}
