
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::store::{PooledStore, StoreError};

pub const PG_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Builds a Postgres connection pool of `max_size` connections and applies pending migrations.
pub fn establish_pg_store(
    database_url: &str,
    max_size: u32,
) -> Result<PooledStore<PgConnection>, StoreError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder().max_size(max_size.max(1)).build(manager)?;

    let mut pooled = pool.get()?;
    let conn: &mut PgConnection = &mut pooled;
    let applied = conn
        .run_pending_migrations(PG_MIGRATIONS)
        .map_err(|err| StoreError::Migration(err.to_string()))?;
    if !applied.is_empty() {
        tracing::info!(
            event = "migrations_applied",
            count = applied.len(),
            "applied pending database migrations"
        );
    }
    drop(pooled);

    tracing::info!(
        event = "db_pool_ready",
        max_size = pool.max_size(),
        "database connection pool ready"
    );
    Ok(PooledStore::new(pool))
}
