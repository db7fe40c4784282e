use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
}

/// Saga engine tuning knobs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Max optimistic-concurrency retries before a step reports failure
    pub max_version_retries: u32,
    /// Base delay between version-conflict retries (milliseconds, linear backoff)
    pub version_retry_backoff_ms: u64,
    /// Max command publication attempts when the channel is unavailable
    pub max_publish_retries: u32,
    /// Base delay between publish retries (milliseconds, doubles per attempt)
    pub publish_backoff_ms: u64,
    /// Max explicit reversal failures before the operation is flagged
    /// for manual reconciliation
    pub max_compensation_retries: u32,
    /// Max FSM iterations in a single execute() call
    pub max_step_iterations: u32,
    /// Delay between FSM iterations when a step made no progress (ms)
    pub step_pause_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_version_retries: 5,
            version_retry_backoff_ms: 5,
            max_publish_retries: 5,
            publish_backoff_ms: 20,
            max_compensation_retries: 5,
            max_step_iterations: 100,
            step_pause_ms: 10,
        }
    }
}

/// Recovery worker settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerSettings {
    /// How often to scan for stale operations (seconds)
    pub scan_interval_secs: u64,
    /// How long an operation must sit in a non-terminal state to be stale (seconds)
    pub stale_threshold_secs: u64,
    /// Max operations to process per scan
    pub batch_size: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
        }
    }
}

/// Default commission parameters applied when a transfer omits them
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommissionConfig {
    /// Percent of the transfer amount, e.g. "1.0"
    pub default_percent: String,
    /// Fixed part in minor units
    pub default_fixed: u64,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            default_percent: "1.0".to_string(),
            default_fixed: 0,
        }
    }
}

/// In-process message channel settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Per-topic buffer capacity
    pub capacity: usize,
    /// How long the orchestrator waits for a step acknowledgment (ms)
    /// before treating the outcome as unknown
    pub ack_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ack_timeout_ms: 2_000,
        }
    }
}

/// Idempotency record retention
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdempotencyConfig {
    /// How long finalized records are kept before purge (seconds)
    pub retention_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            retention_secs: 86_400,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "payflow.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            engine: EngineConfig::default(),
            worker: WorkerSettings::default(),
            commission: CommissionConfig::default(),
            channel: ChannelConfig::default(),
            idempotency: IdempotencyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.max_version_retries, 5);
        assert_eq!(config.worker.stale_threshold_secs, 60);
        assert_eq!(config.commission.default_percent, "1.0");
        assert_eq!(config.idempotency.retention_secs, 86_400);
    }

    #[test]
    fn test_partial_yaml_uses_section_defaults() {
        let yaml = r#"
log_level: debug
log_dir: ./logs
log_file: test.log
use_json: true
rotation: hourly
engine:
  max_version_retries: 3
  version_retry_backoff_ms: 1
  max_publish_retries: 2
  publish_backoff_ms: 5
  max_compensation_retries: 4
  max_step_iterations: 50
  step_pause_ms: 1
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.engine.max_version_retries, 3);
        // Omitted sections fall back to defaults
        assert_eq!(config.channel.ack_timeout_ms, 2_000);
        assert_eq!(config.worker.batch_size, 100);
    }
}
