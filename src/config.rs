//! Configuration management
//!
//! TOML file support with `OLAP_*` environment variable overrides and
//! defaults for every field. Sections convert into the runtime configs of
//! the cache, the hierarchy manager, the analysis service and Redis.

use crate::analysis::ExecutorConfig;
use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use crate::hierarchy::HierarchyConfig;
use crate::redis::RedisConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Analysis execution
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Node-local result cache
    #[serde(default)]
    pub cache: LocalCacheConfig,

    /// Hierarchy construction
    #[serde(default)]
    pub hierarchy: HierarchySection,

    /// Distributed cache
    #[serde(default)]
    pub redis: RedisSection,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Analysis execution settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// How long callers wait before receiving a pending status
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Maximum rows returned when the caller sets none
    #[serde(default = "default_max_results")]
    pub max_results: u64,

    /// Poll interval of nodes following a remote computation
    #[serde(default = "default_poll_interval_ms")]
    pub remote_poll_interval_ms: u64,

    /// Lifetime of results in the distributed cache
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
}

/// Local cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalCacheConfig {
    /// Enable the local cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum total size in bytes
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum size of one entry in bytes
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,

    /// Entry lifetime
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

/// Hierarchy settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HierarchySection {
    /// Members kept per dimension index
    #[serde(default = "default_max_members")]
    pub max_members_per_index: usize,

    /// How long a caller waits for another thread's build
    #[serde(default = "default_build_wait_secs")]
    pub build_wait_timeout_secs: u64,
}

/// Distributed cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSection {
    /// Use Redis instead of the process-local distributed cache
    #[serde(default)]
    pub enabled: bool,

    /// Server URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum concurrent commands
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Command timeout
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Prefix of every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Lifetime of a fingerprint claim
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,

    /// Lifetime of job records
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log filter (error, warn, info, debug, trace or an `EnvFilter` directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_timeout_ms() -> u64 { 30_000 }
fn default_max_results() -> u64 { 10_000 }
fn default_poll_interval_ms() -> u64 { 200 }
fn default_result_ttl_secs() -> u64 { 600 }
fn default_max_entries() -> usize { 10_000 }
fn default_max_bytes() -> usize { 256 * 1024 * 1024 }
fn default_max_entry_bytes() -> usize { 32 * 1024 * 1024 }
fn default_cache_ttl_secs() -> u64 { 600 }
fn default_max_members() -> usize { 100_000 }
fn default_build_wait_secs() -> u64 { 300 }
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_pool_size() -> u32 { 16 }
fn default_connection_timeout_ms() -> u64 { 5_000 }
fn default_command_timeout_ms() -> u64 { 1_000 }
fn default_key_prefix() -> String { "olap".to_string() }
fn default_claim_ttl_secs() -> u64 { 300 }
fn default_job_ttl_secs() -> u64 { 3_600 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_results: default_max_results(),
            remote_poll_interval_ms: default_poll_interval_ms(),
            result_ttl_secs: default_result_ttl_secs(),
        }
    }
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            max_entry_bytes: default_max_entry_bytes(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for HierarchySection {
    fn default() -> Self {
        Self {
            max_members_per_index: default_max_members(),
            build_wait_timeout_secs: default_build_wait_secs(),
        }
    }
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            key_prefix: default_key_prefix(),
            claim_ttl_secs: default_claim_ttl_secs(),
            job_ttl_secs: default_job_ttl_secs(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Load a file, then apply environment overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Analysis
        if let Some(ms) = env_parse("OLAP_ANALYSIS_TIMEOUT_MS") {
            self.analysis.default_timeout_ms = ms;
        }
        if let Some(max) = env_parse("OLAP_MAX_RESULTS") {
            self.analysis.max_results = max;
        }

        // Cache
        if let Ok(enabled) = std::env::var("OLAP_CACHE_ENABLED") {
            self.cache.enabled = enabled.eq_ignore_ascii_case("true") || enabled == "1";
        }
        if let Some(entries) = env_parse("OLAP_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = entries;
        }
        if let Some(ttl) = env_parse("OLAP_CACHE_TTL_SECS") {
            self.cache.ttl_secs = ttl;
        }

        // Hierarchy
        if let Some(members) = env_parse("OLAP_HIERARCHY_MAX_MEMBERS") {
            self.hierarchy.max_members_per_index = members;
        }

        // Redis
        if let Ok(url) = std::env::var("OLAP_REDIS_URL") {
            self.redis.url = url;
            self.redis.enabled = true;
        }
        if let Ok(prefix) = std::env::var("OLAP_REDIS_KEY_PREFIX") {
            self.redis.key_prefix = prefix;
        }
        if let Some(size) = env_parse("OLAP_REDIS_POOL_SIZE") {
            self.redis.pool_size = size;
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.analysis.default_timeout_ms == 0 {
            return Err(Error::Configuration("Analysis timeout must be > 0".to_string()));
        }
        if self.analysis.remote_poll_interval_ms == 0 {
            return Err(Error::Configuration("Remote poll interval must be > 0".to_string()));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(Error::Configuration("Cache max entries must be > 0".to_string()));
        }
        if self.cache.max_entry_bytes > self.cache.max_bytes {
            return Err(Error::Configuration(
                "Cache entry size cannot exceed the total cache size".to_string(),
            ));
        }
        if self.hierarchy.max_members_per_index == 0 {
            return Err(Error::Configuration("Max members per index must be > 0".to_string()));
        }
        if self.redis.claim_ttl_secs == 0 || self.redis.job_ttl_secs == 0 {
            return Err(Error::Configuration("Redis ttls must be > 0".to_string()));
        }
        if self.redis.enabled {
            self.redis_config()
                .validate()
                .map_err(Error::Configuration)?;
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path, e))
        })
    }

    /// Local cache runtime config
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size_bytes: self.cache.max_bytes,
            max_entries: self.cache.max_entries,
            default_ttl: Duration::from_secs(self.cache.ttl_secs),
            enabled: self.cache.enabled,
            max_entry_size_bytes: self.cache.max_entry_bytes,
        }
    }

    /// Hierarchy manager runtime config
    pub fn hierarchy_config(&self) -> HierarchyConfig {
        HierarchyConfig {
            max_members_per_index: self.hierarchy.max_members_per_index,
            build_wait_timeout: Duration::from_secs(self.hierarchy.build_wait_timeout_secs),
        }
    }

    /// Analysis service runtime config
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            default_timeout: Duration::from_millis(self.analysis.default_timeout_ms),
            result_ttl: Duration::from_secs(self.analysis.result_ttl_secs),
            claim_ttl: Duration::from_secs(self.redis.claim_ttl_secs),
            job_ttl: Duration::from_secs(self.redis.job_ttl_secs),
            remote_poll_interval: Duration::from_millis(self.analysis.remote_poll_interval_ms),
        }
    }

    /// Redis connection config
    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig::with_url(self.redis.url.clone())
            .pool_size(self.redis.pool_size)
            .connection_timeout(Duration::from_millis(self.redis.connection_timeout_ms))
            .command_timeout(Duration::from_millis(self.redis.command_timeout_ms))
            .key_prefix(self.redis.key_prefix.clone())
            .tls(self.redis.url.starts_with("rediss://"))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analysis.default_timeout_ms, 30_000);
        assert!(config.monitoring.metrics_enabled);
        assert!(!config.redis.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_timeout() {
        let mut config = Config::default();
        config.analysis.default_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_enabled_redis_is_validated() {
        let mut config = Config::default();
        config.redis.enabled = true;
        config.redis.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            max_entries = 42

            [redis]
            key_prefix = "olap-eu"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.max_entries, 42);
        assert_eq!(config.cache.ttl_secs, 600);
        assert_eq!(config.redis_config().key_prefix, "olap-eu");
        assert_eq!(config.hierarchy.max_members_per_index, 100_000);
    }

    #[test]
    fn test_runtime_conversions() {
        let config = Config::default();
        assert_eq!(config.cache_config().max_entries, 10_000);
        assert_eq!(config.executor_config().claim_ttl, Duration::from_secs(300));
        assert_eq!(
            config.hierarchy_config().build_wait_timeout,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("olap.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.cache.max_entries = 7;
        config.redis.url = "rediss://cache.internal:6380".to_string();
        config.save_to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.cache.max_entries, 7);
        assert!(loaded.redis_config().tls_enabled);
        assert!(matches!(
            Config::from_file(dir.path().join("missing.toml").to_str().unwrap()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("OLAP_MAX_RESULTS", "77");
        let config = Config::from_env();
        assert_eq!(config.analysis.max_results, 77);
        std::env::remove_var("OLAP_MAX_RESULTS");
    }
}
