//! Configuration management for jobpilot
//!
//! Handles loading and saving the agent, failover, provider catalog and
//! pipeline stage settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, PipelinePaths};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config not found: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Static description of one text-generation backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    /// Environment variable holding the credential
    pub key_env: String,
    /// Explicit credential; takes precedence over `key_env` when set
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    /// Pause recommended between consecutive calls
    pub delay_secs: u64,
    /// Cooldown applied on rate limit when the provider gives no hint
    pub cooldown_secs: u64,
}

impl ProviderDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        key_env: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        delay_secs: u64,
        cooldown_secs: u64,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            key_env: key_env.into(),
            api_key: String::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            delay_secs,
            cooldown_secs,
        }
    }

    /// Look up the credential, config file first then environment
    pub fn credential(&self) -> Option<String> {
        let key = self.api_key.trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }
        std::env::var(&self.key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Built-in provider catalog, in failover priority order
pub fn default_providers() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor::new(
            "sambanova",
            "SambaNova",
            "SAMBANOVA_API_KEY",
            "https://api.sambanova.ai/v1",
            "Meta-Llama-3.3-70B-Instruct",
            3,
            30,
        ),
        ProviderDescriptor::new(
            "cerebras",
            "Cerebras",
            "CEREBRAS_API_KEY",
            "https://api.cerebras.ai/v1",
            "llama-3.3-70b",
            3,
            30,
        ),
        ProviderDescriptor::new(
            "groq",
            "Groq",
            "GROQ_API_KEY",
            "https://api.groq.com/openai/v1",
            "llama-3.3-70b-versatile",
            7,
            60,
        ),
        ProviderDescriptor::new(
            "gemini",
            "Gemini",
            "GEMINI_API_KEY",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.5-flash",
            7,
            60,
        ),
    ]
}

/// Control loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_keep_recent_turns")]
    pub keep_recent_turns: usize,
    #[serde(default = "default_max_observation_chars")]
    pub max_observation_chars: usize,
    #[serde(default = "default_reasoning_max_tokens")]
    pub reasoning_max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_context_chars: default_max_context_chars(),
            keep_recent_turns: default_keep_recent_turns(),
            max_observation_chars: default_max_observation_chars(),
            reasoning_max_tokens: default_reasoning_max_tokens(),
        }
    }
}

fn default_max_iterations() -> u32 {
    30
}

fn default_max_context_chars() -> usize {
    12_000
}

fn default_keep_recent_turns() -> usize {
    6
}

fn default_max_observation_chars() -> usize {
    3_000
}

fn default_reasoning_max_tokens() -> u32 {
    1024
}

/// Failover engine policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    #[serde(default = "default_retries")]
    pub retries_before_failover: u32,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_connection_cooldown")]
    pub connection_cooldown_secs: u64,
    #[serde(default = "default_api_error_cooldown")]
    pub api_error_cooldown_secs: u64,
    #[serde(default = "default_wait_margin")]
    pub wait_margin_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            retries_before_failover: default_retries(),
            max_wait_secs: default_max_wait_secs(),
            connection_cooldown_secs: default_connection_cooldown(),
            api_error_cooldown_secs: default_api_error_cooldown(),
            wait_margin_secs: default_wait_margin(),
            request_timeout_secs: default_request_timeout(),
            model_override: None,
        }
    }
}

fn default_retries() -> u32 {
    2
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_connection_cooldown() -> u64 {
    30
}

fn default_api_error_cooldown() -> u64 {
    15
}

fn default_wait_margin() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    120
}

/// Pipeline file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_cache_max_age_hours")]
    pub cache_max_age_hours: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            cache_max_age_hours: default_cache_max_age_hours(),
        }
    }
}

fn default_root() -> String {
    ".".to_string()
}

fn default_cache_max_age_hours() -> u64 {
    24
}

/// External commands implementing each pipeline stage.
///
/// Arguments may contain `{placeholders}` that are substituted at
/// invocation time (paths such as `{raw_jobs}` and per-call parameters
/// such as `{method}` or `{batch_size}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCommands {
    #[serde(default = "default_scrape_command")]
    pub scrape: Vec<String>,
    #[serde(default = "default_parse_command")]
    pub parse: Vec<String>,
    #[serde(default = "default_score_command")]
    pub score: Vec<String>,
    #[serde(default = "default_analyze_command")]
    pub analyze: Vec<String>,
    #[serde(default = "default_documents_command")]
    pub generate_documents: Vec<String>,
    #[serde(default = "default_report_command")]
    pub generate_report: Vec<String>,
    #[serde(default = "default_stage_timeout")]
    pub timeout_secs: u64,
}

impl Default for StageCommands {
    fn default() -> Self {
        Self {
            scrape: default_scrape_command(),
            parse: default_parse_command(),
            score: default_score_command(),
            analyze: default_analyze_command(),
            generate_documents: default_documents_command(),
            generate_report: default_report_command(),
            timeout_secs: default_stage_timeout(),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn default_scrape_command() -> Vec<String> {
    argv(&[
        "stages/scrape_jobs",
        "--config",
        "{search_filters}",
        "--output",
        "{raw_jobs}",
        "--method",
        "{method}",
    ])
}

fn default_parse_command() -> Vec<String> {
    argv(&[
        "stages/parse_jobs",
        "--input",
        "{raw_jobs}",
        "--output",
        "{parsed_jobs}",
        "--config",
        "{search_filters}",
    ])
}

fn default_score_command() -> Vec<String> {
    argv(&[
        "stages/score_jobs",
        "--jobs",
        "{parsed_jobs}",
        "--profile",
        "{user_profile}",
        "--output",
        "{scored_jobs}",
    ])
}

fn default_analyze_command() -> Vec<String> {
    argv(&[
        "stages/analyze_jobs",
        "--input",
        "{input}",
        "--output",
        "{analyzed_jobs}",
        "--batch-size",
        "{batch_size}",
    ])
}

fn default_documents_command() -> Vec<String> {
    argv(&[
        "stages/generate_documents",
        "--jobs",
        "{input}",
        "--profile",
        "{user_profile}",
        "--output-dir",
        "{output_dir}",
        "--threshold",
        "0",
        "--max-jobs",
        "{max_jobs}",
    ])
}

fn default_report_command() -> Vec<String> {
    argv(&[
        "stages/generate_report",
        "--jobs",
        "{scored_jobs}",
        "--config",
        "{search_filters}",
        "--profile",
        "{user_profile}",
        "--output",
        "{report}",
    ])
}

fn default_stage_timeout() -> u64 {
    1800
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderDescriptor>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub stages: StageCommands,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            failover: FailoverConfig::default(),
            providers: default_providers(),
            pipeline: PipelineConfig::default(),
            stages: StageCommands::default(),
        }
    }
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location, falling back to defaults when absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from a location the user named explicitly; absence is an error
    pub async fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_from(path).await
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Resolve the pipeline root, expanding `~`
    pub fn pipeline_root(&self) -> PathBuf {
        let path = &self.pipeline.root;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        } else if path == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
        PathBuf::from(path)
    }

    pub fn pipeline_paths(&self) -> PipelinePaths {
        PipelinePaths::new(self.pipeline_root())
    }

    /// Model forced onto every provider, from config or `LLM_MODEL`
    pub fn model_override(&self) -> Option<String> {
        self.failover
            .model_override
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| {
                std::env::var("LLM_MODEL")
                    .ok()
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
            })
    }

    /// Providers with a credential available, in priority order
    pub fn configured_providers(&self) -> Vec<&ProviderDescriptor> {
        self.providers.iter().filter(|p| p.has_credential()).collect()
    }

    /// Every credential env var, for error messages
    pub fn expected_key_names(&self) -> String {
        self.providers
            .iter()
            .map(|p| p.key_env.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Write a default config (unless present) and create the pipeline tree
pub async fn init(path: &Path) -> Result<Config> {
    if path.exists() {
        warn!("config already present at {:?}", path);
    } else {
        Config::default().save_to(path).await?;
        info!("config written to {:?}", path);
    }

    let config = Config::load_from(path).await?;
    config.pipeline_paths().ensure_dirs().await?;
    info!("pipeline directories ready under {:?}", config.pipeline_root());

    Ok(config)
}
