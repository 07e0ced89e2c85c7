use std::env;
use std::net::SocketAddr;
use std::num::NonZeroU32;

use nonzero_ext::nonzero;
use thiserror::Error;

use crate::sync_service::types::BatchSize;

pub const DEFAULT_SYNC_JOBS: usize = 1;
pub const DEFAULT_REMOTE_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(50u32);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub struct Config {
    /// Postgres connection string. required.
    pub db_url: String,
    /// Number of tracker jobs run concurrently; 1 runs them serially.
    pub sync_jobs: usize,
    /// Batch size applied to every tracker, overriding stored and suggested values.
    pub batch_size: Option<BatchSize>,
    /// Process-wide cap on outbound remote tracker calls.
    pub remote_requests_per_second: NonZeroU32,
    /// Serve /health and /metrics on this address while the run is in progress.
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let sync_jobs = match lookup("SYNC_JOBS") {
            Some(raw) => parse_number::<usize>("SYNC_JOBS", &raw)?,
            None => DEFAULT_SYNC_JOBS,
        };
        if sync_jobs == 0 {
            return Err(invalid("SYNC_JOBS", "0", "must be at least 1"));
        }

        let batch_size = lookup("SYNC_BATCH_SIZE")
            .map(|raw| parse_number::<i64>("SYNC_BATCH_SIZE", &raw).map(BatchSize::from_count))
            .transpose()?;

        let remote_requests_per_second = match lookup("REMOTE_REQUESTS_PER_SECOND") {
            Some(raw) => parse_number::<NonZeroU32>("REMOTE_REQUESTS_PER_SECOND", &raw)?,
            None => DEFAULT_REMOTE_REQUESTS_PER_SECOND,
        };

        let metrics_addr = lookup("METRICS_ADDR")
            .filter(|value| !value.trim().is_empty())
            .map(|raw| parse_number::<SocketAddr>("METRICS_ADDR", &raw))
            .transpose()?;

        Ok(Self {
            db_url,
            sync_jobs,
            batch_size,
            remote_requests_per_second,
            metrics_addr,
        })
    }
}

fn parse_number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| invalid(name, raw, &err.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
