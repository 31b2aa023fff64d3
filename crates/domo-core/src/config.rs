use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Stream processing constants — shared by the orchestrator and the stream client.
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAYS_SECS: [u64; 3] = [1, 5, 15];
pub const DLQ_SUFFIX: &str = ":dlq";
pub const RETRY_KEY_TTL_SECS: u64 = 3600;

/// Top-level config (domo.toml + DOMO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomoConfig {
    pub redis: RedisConfig,
    pub statestore: StateStoreConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// External web-search endpoint; tools of that kind are inert without it.
    #[serde(default)]
    pub websearch: Option<WebSearchSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchSettings {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_stream_in")]
    pub stream_in: String,
    #[serde(default = "default_stream_out")]
    pub stream_out: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Consumer name within the group. Defaults to "<hostname>-<pid>" when empty.
    #[serde(default)]
    pub consumer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStoreConfig {
    #[serde(default = "default_statestore_url")]
    pub base_url: String,
    /// Per-call deadline in seconds.
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Cheaper model used for history summarization and fact extraction.
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Per-LLM-call deadline in seconds.
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of concurrent stream consumers sharing the group.
    #[serde(default = "default_consumers")]
    pub consumers: usize,
    /// Blocking read timeout per XREADGROUP call, in milliseconds.
    #[serde(default = "default_read_block_ms")]
    pub read_block_ms: u64,
    /// Pending entries idle longer than this are reclaimed from dead consumers.
    #[serde(default = "default_idle_reclaim_ms")]
    pub idle_reclaim_ms: u64,
    /// Per-tool-call deadline in seconds.
    #[serde(default = "default_call_timeout")]
    pub tool_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            consumers: default_consumers(),
            read_block_ms: default_read_block_ms(),
            idle_reclaim_ms: default_idle_reclaim_ms(),
            tool_timeout_secs: default_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Reconciliation period in seconds.
    #[serde(default = "default_scheduler_tick")]
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_scheduler_tick(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Fallback interval when global settings don't override it.
    #[serde(default = "default_extractor_hours")]
    pub interval_hours: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_extractor_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When true, emit JSON log lines instead of the console format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_stream_in() -> String {
    "stream_in".to_string()
}
fn default_stream_out() -> String {
    "stream_out".to_string()
}
fn default_group() -> String {
    "assistant_workers".to_string()
}
fn default_statestore_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_summary_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_call_timeout() -> u64 {
    30
}
fn default_consumers() -> usize {
    4
}
fn default_read_block_ms() -> u64 {
    5_000
}
fn default_idle_reclaim_ms() -> u64 {
    60_000
}
fn default_scheduler_tick() -> u64 {
    30
}
fn default_extractor_hours() -> u64 {
    24
}
fn default_log_level() -> String {
    "info".to_string()
}

impl DomoConfig {
    /// Load config from a TOML file with DOMO_* env var overrides
    /// (double underscore separates sections: DOMO_REDIS__STREAM_IN).
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. DOMO_CONFIG env var
    ///   3. ./domo.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("DOMO_CONFIG").ok())
            .unwrap_or_else(|| "domo.toml".to_string());

        let config: DomoConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("DOMO_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Effective consumer name: configured value or "<hostname>-<pid>".
    pub fn consumer_name(&self) -> String {
        if !self.redis.consumer.is_empty() {
            return self.redis.consumer.clone();
        }
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "domo".to_string());
        format!("{}-{}", host, std::process::id())
    }

    /// Name of the dead-letter stream paired with the inbound stream.
    pub fn dlq_stream(&self) -> String {
        format!("{}{}", self.redis.stream_in, DLQ_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_sections() {
        let config: DomoConfig = serde_json::from_value(serde_json::json!({
            "redis": {},
            "statestore": {},
            "llm": { "api_key": "sk-test" },
        }))
        .unwrap();

        assert_eq!(config.orchestrator.consumers, 4);
        assert_eq!(config.scheduler.tick_secs, 30);
        assert!(config.scheduler.enabled);
        assert!(!config.extractor.enabled);
        assert_eq!(config.redis.stream_in, "stream_in");
        assert_eq!(config.dlq_stream(), "stream_in:dlq");
    }

    #[test]
    fn consumer_name_falls_back_to_pid() {
        let config: DomoConfig = serde_json::from_value(serde_json::json!({
            "redis": {},
            "statestore": {},
            "llm": { "api_key": "sk-test" },
        }))
        .unwrap();

        let name = config.consumer_name();
        assert!(name.contains('-'), "expected host-pid form, got {name}");
    }
}
