use std::sync::Arc;

use tracing::info;

use super::error::Error;
use super::run_store_op;
use crate::remote::RemoteTrackerClient;
use crate::store::{bug_has_watch_for, get_bug, TransactionalStore};

/// What back-link reconciliation did for one remote bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackLinkOutcome {
    /// The remote had no link; ours was written.
    Linked,
    /// The remote already pointed at our bug.
    AlreadyLinked,
    /// The remote pointed at a bug with no valid claim; ours replaced it.
    Relinked { previous: i64 },
    /// Another bug holds a valid claim on the remote bug and keeps it.
    KeptExisting { existing: i64 },
}

impl BackLinkOutcome {
    pub fn wrote_link(self) -> bool {
        matches!(self, BackLinkOutcome::Linked | BackLinkOutcome::Relinked { .. })
    }
}

/// Makes the remote bug point back at `local_bug_id` unless another bug already holds a valid
/// claim. A claim is valid when the linked bug exists and still watches `remote_bug` on this
/// tracker; the first valid claim wins.
pub async fn reconcile(
    client: &dyn RemoteTrackerClient,
    store: &Arc<dyn TransactionalStore>,
    tracker_id: i64,
    remote_bug: &str,
    local_bug_id: i64,
) -> Result<BackLinkOutcome, Error> {
    let current = client.linked_local_bug(remote_bug).await?;

    let outcome = match current {
        None => {
            client.set_linked_local_bug(remote_bug, local_bug_id).await?;
            BackLinkOutcome::Linked
        }
        Some(existing) if existing == local_bug_id => BackLinkOutcome::AlreadyLinked,
        Some(existing) => {
            let remote = remote_bug.to_string();
            let claim_is_valid = run_store_op(store, move |scope| {
                Ok(get_bug(scope, existing)?.is_some()
                    && bug_has_watch_for(scope, existing, tracker_id, &remote)?)
            })
            .await?;

            if claim_is_valid {
                BackLinkOutcome::KeptExisting { existing }
            } else {
                client.set_linked_local_bug(remote_bug, local_bug_id).await?;
                BackLinkOutcome::Relinked { previous: existing }
            }
        }
    };

    if outcome.wrote_link() {
        info!(
            event = "remote_back_link_written",
            remote_bug = remote_bug,
            local_bug_id = local_bug_id,
            outcome = ?outcome,
            "linked remote bug back to local bug"
        );
    }

    Ok(outcome)
}
