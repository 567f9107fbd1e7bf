//! Daemon configuration, read from the environment with CLI overrides.

use crate::filter::cache::DEFAULT_CACHE_SIZE;
use crate::tailer::{DEFAULT_POLL_BATCH, DEFAULT_POLL_MS};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8710;
pub const DEFAULT_STORE_URL: &str = "capdex.db";

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// `CORE_HOST`
    pub host: String,
    /// `CORE_PORT`
    pub port: u16,
    /// `POLL_MS`; 0 disables tailing and serves the startup snapshot.
    pub poll_ms: u64,
    /// `POLL_BATCH`
    pub poll_batch: usize,
    /// `FILTER_CACHE_SIZE`
    pub filter_cache_size: usize,
    /// `TRUSTED_HEADERS`
    pub trusted_headers: bool,
    /// `STORE_URL`: path of the upstream sqlite store.
    pub store_url: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            poll_ms: DEFAULT_POLL_MS,
            poll_batch: DEFAULT_POLL_BATCH,
            filter_cache_size: DEFAULT_CACHE_SIZE,
            trusted_headers: false,
            store_url: DEFAULT_STORE_URL.to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let defaults = CoreConfig::default();
        CoreConfig {
            host: read_non_empty_env("CORE_HOST").unwrap_or(defaults.host),
            port: read_env_parsed("CORE_PORT").unwrap_or(defaults.port),
            poll_ms: read_env_parsed("POLL_MS").unwrap_or(defaults.poll_ms),
            poll_batch: read_env_parsed::<usize>("POLL_BATCH")
                .filter(|v| *v >= 1)
                .unwrap_or(defaults.poll_batch),
            filter_cache_size: read_env_parsed::<usize>("FILTER_CACHE_SIZE")
                .filter(|v| *v >= 1)
                .unwrap_or(defaults.filter_cache_size),
            trusted_headers: read_env_bool("TRUSTED_HEADERS"),
            store_url: read_non_empty_env("STORE_URL").unwrap_or(defaults.store_url),
        }
    }
}

fn read_non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

fn read_env_bool(name: &str) -> bool {
    matches!(
        std::env::var(name)
            .ok()
            .map(|raw| raw.trim().to_ascii_lowercase())
            .as_deref(),
        Some("true" | "1" | "on" | "yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.poll_ms, 500);
        assert_eq!(config.poll_batch, 500);
        assert_eq!(config.filter_cache_size, 256);
        assert!(!config.trusted_headers);
    }
}
