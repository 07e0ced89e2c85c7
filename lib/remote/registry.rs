use std::collections::BTreeMap;
use std::sync::Arc;

use super::client::RemoteTrackerClient;
use super::error::RemoteError;
use super::rate_limit::{GlobalRateLimiter, RateLimitedClient};
use crate::store::Tracker;

pub type ClientFactory =
    Arc<dyn Fn(&Tracker) -> Result<Arc<dyn RemoteTrackerClient>, RemoteError> + Send + Sync>;

/// Maps tracker kinds to client factories.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    factories: BTreeMap<String, ClientFactory>,
    rate_limiter: Option<GlobalRateLimiter>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every client built after this call shares `limiter`.
    pub fn with_rate_limiter(mut self, limiter: GlobalRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Tracker) -> Result<Arc<dyn RemoteTrackerClient>, RemoteError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// True when no tracker kind has a factory, so no tracker can be synchronized.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds the client for `tracker`, failing with `UnsupportedTrackerKind` for unknown kinds.
    pub fn client_for(&self, tracker: &Tracker) -> Result<Arc<dyn RemoteTrackerClient>, RemoteError> {
        let factory = self
            .factories
            .get(&tracker.kind)
            .ok_or_else(|| RemoteError::UnsupportedTrackerKind(tracker.kind.clone()))?;
        let client = factory(tracker)?;

        Ok(match &self.rate_limiter {
            Some(limiter) => Arc::new(RateLimitedClient::new(client, Arc::clone(limiter))),
            None => client,
        })
    }
}

#[cfg(test)]
mod tests {
    use nonzero_ext::nonzero;

    use super::*;
    use crate::remote::rate_limit::build_global_rate_limiter;
    use crate::remote::test_support::ScriptedTracker;

    fn tracker(kind: &str) -> Tracker {
        Tracker {
            id: 1,
            name: "gnome".to_string(),
            base_url: "https://bugzilla.gnome.org".to_string(),
            kind: kind.to_string(),
            active: true,
            batch_size: None,
            sync_comments: false,
        }
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let registry = ClientRegistry::new();
        assert_eq!(
            registry.client_for(&tracker("trac")).err(),
            Some(RemoteError::UnsupportedTrackerKind("trac".to_string()))
        );
    }

    #[test]
    fn registry_without_factories_is_empty() {
        let mut registry =
            ClientRegistry::new().with_rate_limiter(build_global_rate_limiter(nonzero!(10u32)));
        assert!(registry.is_empty());
        assert_eq!(registry.kinds().count(), 0);

        registry.register("bugzilla", |_| {
            Ok(Arc::new(ScriptedTracker::new()) as Arc<dyn RemoteTrackerClient>)
        });
        assert!(!registry.is_empty());
    }

    #[tokio::test]
    async fn rate_limited_clients_delegate_to_registered_factory() {
        let scripted = Arc::new(ScriptedTracker::new());
        scripted.set_status("5", "NEW", "LOW");

        let mut registry =
            ClientRegistry::new().with_rate_limiter(build_global_rate_limiter(nonzero!(100u32)));
        let shared = Arc::clone(&scripted);
        registry.register("bugzilla", move |_| {
            Ok(Arc::clone(&shared) as Arc<dyn RemoteTrackerClient>)
        });

        let client = registry.client_for(&tracker("bugzilla")).expect("client");
        assert_eq!(client.remote_status("5").await, Ok("NEW".to_string()));
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["bugzilla"]);
    }
}
