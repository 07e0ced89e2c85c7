//! Remote tracker clients and the plumbing around them.

mod client;
mod error;
mod rate_limit;
mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
mod types;

pub use client::RemoteTrackerClient;
pub use error::{map_reqwest_error, map_status, RemoteError};
pub use rate_limit::{build_global_rate_limiter, GlobalRateLimiter, RateLimitedClient};
pub use registry::{ClientFactory, ClientRegistry};
pub use types::{Capabilities, LocalImportance, LocalStatus, RemoteComment};
