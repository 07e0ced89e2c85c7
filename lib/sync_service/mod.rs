//! The watch synchronization engine: batch selection, per-tracker jobs, scheduling and the
//! orchestrator that ties them together.

pub mod backlink;
pub mod batch_selector;
pub mod classifier;
mod error;
pub mod job;
pub mod orchestrator;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

pub use error::Error;
pub use orchestrator::SyncOrchestrator;
pub use scheduler::SchedulerKind;

use crate::store::{Scope, StoreError, TransactionalStore};

/// Runs one store operation in its own scope on the blocking pool.
pub(crate) async fn run_store_op<T, F>(
    store: &Arc<dyn TransactionalStore>,
    op: F,
) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce(&mut Scope<'_>) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    Ok(tokio::task::spawn_blocking(move || store.with_scope(op)).await??)
}
