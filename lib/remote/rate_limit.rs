use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::client::RemoteTrackerClient;
use super::error::RemoteError;
use super::types::{Capabilities, LocalImportance, LocalStatus, RemoteComment};

/// One request budget shared by every remote client in the process.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn build_global_rate_limiter(requests_per_second: NonZeroU32) -> GlobalRateLimiter {
    Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second)))
}

/// Client wrapper that waits on the global budget before every network call.
pub struct RateLimitedClient {
    inner: Arc<dyn RemoteTrackerClient>,
    limiter: GlobalRateLimiter,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn RemoteTrackerClient>, limiter: GlobalRateLimiter) -> Self {
        Self { inner, limiter }
    }
}

impl RemoteTrackerClient for RateLimitedClient {
    fn probe<'a>(&'a self) -> BoxFuture<'a, Result<Capabilities, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.probe().await
        })
    }

    fn current_server_time<'a>(
        &'a self,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.current_server_time().await
        })
    }

    fn modified_remote_bugs<'a>(
        &'a self,
        remote_bugs: &'a [String],
        since: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Vec<String>, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.modified_remote_bugs(remote_bugs, since).await
        })
    }

    fn initialize_remote_bug_db<'a>(
        &'a self,
        remote_bugs: &'a [String],
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.initialize_remote_bug_db(remote_bugs).await
        })
    }

    fn remote_status<'a>(&'a self, remote_bug: &'a str) -> BoxFuture<'a, Result<String, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.remote_status(remote_bug).await
        })
    }

    fn remote_importance<'a>(
        &'a self,
        remote_bug: &'a str,
    ) -> BoxFuture<'a, Result<String, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.remote_importance(remote_bug).await
        })
    }

    fn convert_remote_status(&self, remote_status: &str) -> Result<LocalStatus, RemoteError> {
        self.inner.convert_remote_status(remote_status)
    }

    fn convert_remote_importance(
        &self,
        remote_importance: &str,
    ) -> Result<LocalImportance, RemoteError> {
        self.inner.convert_remote_importance(remote_importance)
    }

    fn comment_ids<'a>(&'a self, remote_bug: &'a str) -> BoxFuture<'a, Result<Vec<String>, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.comment_ids(remote_bug).await
        })
    }

    fn fetch_comments<'a>(
        &'a self,
        remote_bug: &'a str,
        comment_ids: &'a [String],
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.fetch_comments(remote_bug, comment_ids).await
        })
    }

    fn comment<'a>(
        &'a self,
        remote_bug: &'a str,
        comment_id: &'a str,
    ) -> BoxFuture<'a, Result<RemoteComment, RemoteError>> {
        // Served from the batch primed by `fetch_comments`.
        self.inner.comment(remote_bug, comment_id)
    }

    fn add_remote_comment<'a>(
        &'a self,
        remote_bug: &'a str,
        body: &'a str,
        local_comment_id: i64,
    ) -> BoxFuture<'a, Result<String, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner
                .add_remote_comment(remote_bug, body, local_comment_id)
                .await
        })
    }

    fn linked_local_bug<'a>(
        &'a self,
        remote_bug: &'a str,
    ) -> BoxFuture<'a, Result<Option<i64>, RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.linked_local_bug(remote_bug).await
        })
    }

    fn set_linked_local_bug<'a>(
        &'a self,
        remote_bug: &'a str,
        local_bug_id: i64,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            self.limiter.until_ready().await;
            self.inner.set_linked_local_bug(remote_bug, local_bug_id).await
        })
    }
}
