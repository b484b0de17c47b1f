//! The configuration surface (spec §6). Env-loaded with the same defaults
//! the spec's table lists; the binary crate is the one that actually reads
//! `std::env::var` (spec treats env loading as an external collaborator) and
//! hands a `Config` down into the core.

use crate::chunk::DEFAULT_MAX_CHUNK_LENGTH;

/// Lower bound of the internal fetch limit used by the search protocol
/// (spec §4.6, `max_log_request_size`).
pub const DEFAULT_MAX_LOG_REQUEST_SIZE: usize = 5_000;

/// Resolves the §9 "unbounded fan-out" open question: a write that would
/// produce more fragments than this is rejected before anything is emitted,
/// rather than silently flooding the log pipeline.
pub const DEFAULT_MAX_FRAGMENTS_PER_WRITE: usize = 10_000;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// `L` in spec §4.2 — per-fragment virtual-length ceiling.
    pub max_chunk_length: usize,
    /// Lower bound of the internal fetch limit (spec §4.6).
    pub max_log_request_size: usize,
    /// §9's fan-out guard: rejects a write producing more fragments than this.
    pub max_fragments_per_write: usize,
    /// Force-encrypt every write regardless of a per-call key.
    pub encryption_enabled: bool,
    /// Process-wide cipher input; a per-call key overrides it.
    pub encryption_key: Option<String>,
    pub deployment_id: Option<String>,
    pub environment_id: Option<String>,
    pub backboard_url: String,
    /// Per-request deadline (spec §5 "cancellation and timeouts"); not part
    /// of the spec's configuration table but needed by every network call.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            max_log_request_size: DEFAULT_MAX_LOG_REQUEST_SIZE,
            max_fragments_per_write: DEFAULT_MAX_FRAGMENTS_PER_WRITE,
            encryption_enabled: false,
            encryption_key: None,
            deployment_id: None,
            environment_id: None,
            backboard_url: "https://backboard.railway.app/graphql/v2".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Builds a `Config` from environment variables, falling back to the
    /// defaults in spec §6's table for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_chunk_length: env_usize("LOGCAR_MAX_CHUNK_LENGTH").unwrap_or(defaults.max_chunk_length),
            max_log_request_size: env_usize("LOGCAR_MAX_LOG_REQUEST_SIZE").unwrap_or(defaults.max_log_request_size),
            max_fragments_per_write: env_usize("LOGCAR_MAX_FRAGMENTS_PER_WRITE").unwrap_or(defaults.max_fragments_per_write),
            encryption_enabled: std::env::var("LOGCAR_ENCRYPTION_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.encryption_enabled),
            encryption_key: std::env::var("LOGCAR_ENCRYPTION_KEY").ok(),
            deployment_id: std::env::var("RAILWAY_DEPLOYMENT_ID").ok(),
            environment_id: std::env::var("RAILWAY_ENVIRONMENT_ID").ok(),
            backboard_url: std::env::var("LOGCAR_BACKBOARD_URL").unwrap_or(defaults.backboard_url),
            request_timeout_secs: env_u64("LOGCAR_REQUEST_TIMEOUT_SECS").unwrap_or(defaults.request_timeout_secs),
        }
    }

    pub fn has_deployment_scope(&self) -> bool {
        self.deployment_id.is_some() || self.environment_id.is_some()
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.max_chunk_length, 60_000);
        assert_eq!(config.max_log_request_size, 5_000);
        assert!(!config.encryption_enabled);
        assert!(config.encryption_key.is_none());
        assert!(!config.has_deployment_scope());
    }
}
