use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the tiered fetch engine.
///
/// All thresholds govern the read path only; the crate never writes to the
/// backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Broker name used to form queue identities.
    #[serde(default = "default_broker_name")]
    pub broker_name: String,

    /// Process memory budget the cache weight bound is derived from.
    #[serde(default = "default_memory_budget_bytes")]
    pub memory_budget_bytes: u64,

    /// Fraction of the memory budget the read-ahead cache may occupy.
    #[serde(default = "default_cache_size_threshold_rate")]
    pub read_ahead_cache_size_threshold_rate: f64,

    /// Time-to-live after write for cached messages, milliseconds.
    #[serde(default = "default_cache_expire_ms")]
    pub read_ahead_cache_expire_ms: u64,

    /// Hard cap on total prefetched message count per trigger.
    #[serde(default = "default_message_count_threshold")]
    pub read_ahead_message_count_threshold: u32,

    /// Hard cap on commit-log bytes fetched per backend read.
    #[serde(default = "default_message_size_threshold")]
    pub read_ahead_message_size_threshold: u64,

    /// Factor above which a prefetch fans out into concurrent batches.
    #[serde(default = "default_batch_size_factor_threshold")]
    pub read_ahead_batch_size_factor_threshold: u32,

    /// Batch multiplier for synchronous full-miss fetches; also the floor
    /// and initial value of the per-queue read-ahead factor.
    #[serde(default = "default_min_factor")]
    pub read_ahead_min_factor: u32,
}

fn default_broker_name() -> String {
    "broker-0".to_string()
}
fn default_memory_budget_bytes() -> u64 {
    1024 * 1024 * 1024
} // 1 GB
fn default_cache_size_threshold_rate() -> f64 {
    0.3
}
fn default_cache_expire_ms() -> u64 {
    10_000
}
fn default_message_count_threshold() -> u32 {
    2048
}
fn default_message_size_threshold() -> u64 {
    16 * 1024 * 1024
} // 16 MB
fn default_batch_size_factor_threshold() -> u32 {
    8
}
fn default_min_factor() -> u32 {
    2
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            broker_name: default_broker_name(),
            memory_budget_bytes: default_memory_budget_bytes(),
            read_ahead_cache_size_threshold_rate: default_cache_size_threshold_rate(),
            read_ahead_cache_expire_ms: default_cache_expire_ms(),
            read_ahead_message_count_threshold: default_message_count_threshold(),
            read_ahead_message_size_threshold: default_message_size_threshold(),
            read_ahead_batch_size_factor_threshold: default_batch_size_factor_threshold(),
            read_ahead_min_factor: default_min_factor(),
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker name
    pub fn with_broker_name(mut self, name: impl Into<String>) -> Self {
        self.broker_name = name.into();
        self
    }

    /// Set the memory budget the cache weight bound derives from
    pub fn with_memory_budget_bytes(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    /// Set the cache time-to-live in milliseconds
    pub fn with_cache_expire_ms(mut self, ms: u64) -> Self {
        self.read_ahead_cache_expire_ms = ms;
        self
    }

    /// Set the prefetch message-count ceiling
    pub fn with_message_count_threshold(mut self, count: u32) -> Self {
        self.read_ahead_message_count_threshold = count;
        self
    }

    /// Set the per-fetch commit-log byte ceiling
    pub fn with_message_size_threshold(mut self, bytes: u64) -> Self {
        self.read_ahead_message_size_threshold = bytes;
        self
    }

    /// Set the fan-out threshold for the read-ahead factor
    pub fn with_batch_size_factor_threshold(mut self, factor: u32) -> Self {
        self.read_ahead_batch_size_factor_threshold = factor;
        self
    }

    /// Set the minimum read-ahead factor
    pub fn with_min_factor(mut self, factor: u32) -> Self {
        self.read_ahead_min_factor = factor;
        self
    }

    /// Cache time-to-live as a Duration
    pub fn cache_expire_duration(&self) -> Duration {
        Duration::from_millis(self.read_ahead_cache_expire_ms)
    }

    /// Maximum cache weight in bytes
    pub fn cache_max_weight(&self) -> u64 {
        (self.memory_budget_bytes as f64 * self.read_ahead_cache_size_threshold_rate) as u64
    }

    /// Testing config: tiny cache, short TTL, low thresholds
    pub fn testing() -> Self {
        Self {
            broker_name: "test-broker".to_string(),
            memory_budget_bytes: 16 * 1024 * 1024,
            read_ahead_cache_size_threshold_rate: 0.5,
            read_ahead_cache_expire_ms: 1_000,
            read_ahead_message_count_threshold: 128,
            read_ahead_message_size_threshold: 1024 * 1024,
            read_ahead_batch_size_factor_threshold: 4,
            read_ahead_min_factor: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.broker_name, "broker-0");
        assert_eq!(config.memory_budget_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.read_ahead_cache_expire_ms, 10_000);
        assert_eq!(config.read_ahead_message_count_threshold, 2048);
        assert_eq!(config.read_ahead_batch_size_factor_threshold, 8);
        assert_eq!(config.read_ahead_min_factor, 2);
    }

    #[test]
    fn test_builder_pattern() {
        let config = FetchConfig::new()
            .with_broker_name("edge-1")
            .with_memory_budget_bytes(64 * 1024 * 1024)
            .with_cache_expire_ms(500)
            .with_min_factor(1);

        assert_eq!(config.broker_name, "edge-1");
        assert_eq!(config.memory_budget_bytes, 64 * 1024 * 1024);
        assert_eq!(config.read_ahead_cache_expire_ms, 500);
        assert_eq!(config.read_ahead_min_factor, 1);
    }

    #[test]
    fn test_cache_max_weight() {
        let config = FetchConfig::new().with_memory_budget_bytes(1000);
        assert_eq!(config.cache_max_weight(), 300);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = FetchConfig::testing();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: FetchConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.broker_name, deserialized.broker_name);
        assert_eq!(
            config.read_ahead_message_count_threshold,
            deserialized.read_ahead_message_count_threshold
        );
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: FetchConfig =
            serde_json::from_str(r#"{"broker_name":"b1","read_ahead_min_factor":4}"#).unwrap();
        assert_eq!(config.broker_name, "b1");
        assert_eq!(config.read_ahead_min_factor, 4);
        assert_eq!(config.read_ahead_cache_expire_ms, 10_000);
    }
}
