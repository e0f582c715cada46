use crate::utils::errors::{BatchTranslatorError, FieldFailurePolicy, ItemFailurePolicy, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub chunking: ChunkingConfig,
    pub items: ItemsConfig,
    pub pipeline: PipelineConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub endpoint_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_factor: f64,
    pub retry_empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsConfig {
    pub source_fields: Vec<String>,
    pub target_prefix: String,
    /// Distinct source texts remembered per run; 0 disables the memo.
    pub memo_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub checkpoint_file: PathBuf,
    pub batch_size: usize,
    pub total_items: Option<usize>,
    /// Items translated concurrently; defaults to `batch_size` when unset.
    pub concurrency: Option<usize>,
    pub item_failure_policy: ItemFailurePolicy,
    pub field_failure_policy: FieldFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub key_prefix: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:8080/translate".to_string(),
            source_lang: "en".to_string(),
            target_lang: "sn".to_string(),
            call_timeout_secs: 8,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            max_interval_ms: 1000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 4000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
            retry_empty: true,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: 5000,
        }
    }
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self {
            source_fields: vec![
                "instruction".to_string(),
                "context".to_string(),
                "response".to_string(),
            ],
            target_prefix: "sh_".to_string(),
            memo_capacity: 10_000,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_file: PathBuf::from("data.json"),
            output_file: PathBuf::from("trans.json"),
            checkpoint_file: PathBuf::from("checkpoint.json"),
            batch_size: 10,
            total_items: None,
            concurrency: None,
            item_failure_policy: ItemFailurePolicy::default(),
            field_failure_policy: FieldFailurePolicy::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://s3.amazonaws.com".to_string(),
            bucket: "translated-batches".to_string(),
            region: "us-east-1".to_string(),
            key_prefix: "batch_".to_string(),
            token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BatchTranslatorError::ConfigError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| BatchTranslatorError::ConfigError(e.to_string()))
    }

    /// Defaults when `path` is `None` or names a missing file. A file that
    /// exists but does not parse is an error, never silently replaced.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) if std::path::Path::new(p).exists() => Self::load_from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Overrides settings from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("TRANSLATE_URL") {
            self.engine.endpoint_url = url;
        }
        if let Some(timeout) = var("TIMEOUT") {
            self.engine.call_timeout_secs = parse_var("TIMEOUT", &timeout)?;
        }
        if let Some(debugging) = var("DEBUGGING") {
            if debugging.eq_ignore_ascii_case("true") {
                self.logging.level = "debug".to_string();
            }
        }
        if let Some(size) = var("BATCH_SIZE") {
            self.pipeline.batch_size = parse_var("BATCH_SIZE", &size)?;
        }
        if let Some(total) = var("TOTAL_ITEMS") {
            self.pipeline.total_items = Some(parse_var("TOTAL_ITEMS", &total)?);
        }
        if let Some(path) = var("INPUT_FILE") {
            self.pipeline.input_file = PathBuf::from(path);
        }
        if let Some(path) = var("OUTPUT_FILE") {
            self.pipeline.output_file = PathBuf::from(path);
        }
        if let Some(path) = var("CHECKPOINT_FILE") {
            self.pipeline.checkpoint_file = PathBuf::from(path);
        }
        if let Some(region) = var("REMOTE_REGION") {
            self.remote.region = region;
        }
        if let Some(bucket) = var("REMOTE_BUCKET") {
            self.remote.bucket = bucket;
            self.remote.enabled = true;
        }
        if let Some(endpoint) = var("REMOTE_ENDPOINT") {
            self.remote.endpoint = endpoint;
        }
        if let Some(token) = var("REMOTE_TOKEN") {
            self.remote.token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(invalid("pipeline.batch_size must be at least 1"));
        }
        if self.pipeline.concurrency == Some(0) {
            return Err(invalid("pipeline.concurrency must be at least 1"));
        }
        if self.chunking.max_chunk_len == 0 {
            return Err(invalid("chunking.max_chunk_len must be at least 1"));
        }
        if self.rate_limit.min_interval_ms > self.rate_limit.max_interval_ms {
            return Err(invalid(
                "rate_limit.min_interval_ms exceeds rate_limit.max_interval_ms",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier must be a finite number of at least 1.0"));
        }
        if !self.retry.jitter_factor.is_finite() || self.retry.jitter_factor < 0.0 {
            return Err(invalid("retry.jitter_factor must be a finite non-negative number"));
        }
        if self.items.source_fields.is_empty() {
            return Err(invalid("items.source_fields is empty"));
        }
        if self.remote.enabled && self.remote.bucket.is_empty() {
            return Err(invalid("remote.bucket is required when mirroring is enabled"));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.call_timeout_secs)
    }

    pub fn concurrency(&self) -> usize {
        self.pipeline.concurrency.unwrap_or(self.pipeline.batch_size)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BatchTranslatorError::ConfigError(format!("{key} has invalid value {value:?}")))
}

fn invalid(msg: &str) -> BatchTranslatorError {
    BatchTranslatorError::ValidationError(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.concurrency(), 10);
        assert_eq!(config.chunking.max_chunk_len, 5000);
    }

    #[test]
    fn load_or_default_only_defaults_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let config = AppConfig::load_or_default(missing.to_str()).unwrap();
        assert_eq!(config.pipeline.batch_size, 10);

        let present = dir.path().join("config.toml");
        std::fs::write(&present, "[pipeline]\nbatch_size = 3\n").unwrap();
        let config = AppConfig::load_or_default(present.to_str()).unwrap();
        assert_eq!(config.pipeline.batch_size, 3);

        std::fs::write(&present, "[pipeline\n").unwrap();
        assert!(matches!(
            AppConfig::load_or_default(present.to_str()),
            Err(BatchTranslatorError::ConfigError(_))
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [pipeline]
            batch_size = 25
            item_failure_policy = "skip"

            [rate_limit]
            min_interval_ms = 500
            max_interval_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.batch_size, 25);
        assert_eq!(config.pipeline.item_failure_policy, ItemFailurePolicy::Skip);
        assert_eq!(config.rate_limit.max_interval_ms, 1500);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.items.target_prefix, "sh_");
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TRANSLATE_URL", "http://engine/translate"),
            ("TIMEOUT", "12"),
            ("DEBUGGING", "True"),
            ("BATCH_SIZE", "7"),
            ("REMOTE_BUCKET", "my-bucket"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.engine.endpoint_url, "http://engine/translate");
        assert_eq!(config.call_timeout(), Duration::from_secs(12));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.pipeline.batch_size, 7);
        assert!(config.remote.enabled);
        assert_eq!(config.remote.bucket, "my-bucket");
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_vars(|k| (k == "BATCH_SIZE").then(|| "ten".to_string()))
            .unwrap_err();
        assert!(matches!(err, BatchTranslatorError::ConfigError(_)));
    }

    #[test]
    fn validation_rejects_inverted_interval() {
        let mut config = AppConfig::default();
        config.rate_limit.min_interval_ms = 2000;
        config.rate_limit.max_interval_ms = 1000;
        assert!(matches!(
            config.validate(),
            Err(BatchTranslatorError::ValidationError(_))
        ));

        let mut config = AppConfig::default();
        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_shrinking_or_negative_backoff() {
        let mut config = AppConfig::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.jitter_factor = -2.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.multiplier = f64::NAN;
        assert!(config.validate().is_err());
    }
}
