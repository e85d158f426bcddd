//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Page-sandbox interception settings
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Global binding slot the wallet library is expected to populate
    #[serde(default = "default_binding_name")]
    pub binding_name: String,

    /// How long a wrapped signing call waits for a verdict before failing open
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Capacity of the page message channel
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            binding_name: default_binding_name(),
            wait_timeout_ms: default_wait_timeout_ms(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

/// Context relay settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Capacity of the relay <-> background channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Deadline for the one-shot wallet connect round trip
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Remote risk scorer settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    /// Analysis endpoint of the remote scoring service
    #[serde(default = "default_scorer_endpoint")]
    pub endpoint: String,

    /// API key sent in the X-API-Key header (empty = unauthenticated)
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout
    #[serde(default = "default_scorer_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, doubles each attempt
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Network label attached to scorer requests
    #[serde(default = "default_network")]
    pub network: String,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_scorer_endpoint(),
            api_key: String::new(),
            timeout_ms: default_scorer_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            network: default_network(),
        }
    }
}

impl ScorerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Verdict cache settings
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL for cached remote verdicts (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum entries before eviction kicks in
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Analysis request preferences
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// quick, standard or deep
    #[serde(default = "default_analysis_depth")]
    pub depth: String,

    #[serde(default = "default_true")]
    pub include_on_chain_data: bool,

    #[serde(default = "default_true")]
    pub include_ml_prediction: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            depth: default_analysis_depth(),
            include_on_chain_data: true,
            include_ml_prediction: true,
        }
    }
}

// Default value functions
fn default_binding_name() -> String {
    "solana".to_string()
}

fn default_wait_timeout_ms() -> u64 {
    5_000
}

fn default_bus_capacity() -> usize {
    256
}

fn default_channel_capacity() -> usize {
    256
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_scorer_endpoint() -> String {
    std::env::var("SCORER_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:5000/api/analyze".into())
}

fn default_scorer_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_network() -> String {
    "mainnet-beta".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3_600
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_analysis_depth() -> String {
    "standard".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            relay: RelayConfig::default(),
            scorer: ScorerConfig::default(),
            cache: CacheConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("scorer.endpoint", default_scorer_endpoint())?
            .set_default("scorer.timeout_ms", default_scorer_timeout_ms() as i64)?
            .set_default("scorer.max_retries", default_max_retries() as i64)?
            .set_default("sandbox.wait_timeout_ms", default_wait_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SENTINEL_)
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.sandbox.wait_timeout_ms == 0 {
            anyhow::bail!("sandbox.wait_timeout_ms must be positive");
        }

        if self.scorer.endpoint.is_empty() {
            anyhow::bail!("scorer.endpoint must not be empty");
        }

        if self.scorer.timeout_ms == 0 {
            anyhow::bail!("scorer.timeout_ms must be positive");
        }

        if self.scorer.max_retries > 10 {
            anyhow::bail!(
                "scorer.max_retries is capped at 10, got {}",
                self.scorer.max_retries
            );
        }

        if self.cache.ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs must be positive");
        }

        match self.analysis.depth.as_str() {
            "quick" | "standard" | "deep" => {}
            other => anyhow::bail!("analysis.depth must be quick, standard or deep, got {other}"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sandbox.binding_name, "solana");
        assert_eq!(config.sandbox.wait_timeout_ms, 5_000);
        assert_eq!(config.scorer.max_retries, 3);
        assert_eq!(config.cache.ttl_secs, 3_600);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[scorer]\nendpoint = \"http://scorer.test/api/analyze\"\nmax_retries = 1\n\n[cache]\nttl_secs = 60\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.scorer.endpoint, "http://scorer.test/api/analyze");
        assert_eq!(config.scorer.max_retries, 1);
        assert_eq!(config.cache.ttl_secs, 60);
        // Untouched sections keep their defaults
        assert_eq!(config.sandbox.wait_timeout_ms, 5_000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("does-not-exist.toml").unwrap();
        assert_eq!(config.scorer.max_retries, 3);
    }

    #[test]
    fn test_invalid_depth_rejected() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[analysis]\ndepth = \"paranoid\"\n").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
