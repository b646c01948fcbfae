use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration module
/// This module handles loading, validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language of the input subtitles, used in the prompt
    pub source_language: String,

    /// Language to translate to, used in the prompt
    pub target_language: String,

    /// Suffix appended to the file stem of translated files
    #[serde(default = "default_outfile_suffix")]
    pub outfile_suffix: String,

    /// Provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Quota and admission settings
    #[serde(default)]
    pub limits: RateLimitConfig,

    /// Chunking and request sizing
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// ASS specific settings
    #[serde(default)]
    pub ass: AssSettings,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Gemini provider configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Model name
    #[serde(default = "default_model")]
    pub model: String,

    // @field: API key, falls back to api_key_file then GEMINI_API_KEY or GEMINI_KEY
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: File holding the API key
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,

    // @field: Service URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra generationConfig entries sent as is, e.g. temperature, topP,
    /// maxOutputTokens or thinkingConfig
    #[serde(default)]
    pub generation_config: Map<String, Value>,

    /// Prompt template. Placeholders: {source_language}, {target_language},
    /// {lines_per_chunk}, {json}
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            api_key_file: None,
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            generation_config: Map::new(),
            prompt: default_prompt(),
        }
    }
}

impl ProviderConfig {
    /// API key from the config file, the key file or the environment
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Same as `resolve_api_key` with environment lookups going through `env`
    pub fn resolve_api_key_with<F>(&self, env: F) -> Result<Option<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = non_empty(&self.api_key) {
            return Ok(Some(key));
        }
        if let Some(path) = &self.api_key_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read API key file: {:?}", path))?;
            return Ok(non_empty(&content));
        }
        Ok(API_KEY_VARIABLES
            .iter()
            .find_map(|name| env(name).and_then(|key| non_empty(&key))))
    }
}

/// Environment variables checked for the API key, in order
pub const API_KEY_VARIABLES: [&str; 2] = ["GEMINI_API_KEY", "GEMINI_KEY"];

fn non_empty(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() { None } else { Some(key.to_string()) }
}

/// Provider quotas and admission behaviour
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per sliding window
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Tokens admitted per sliding window
    #[serde(default = "default_tokens_per_minute")]
    pub tokens_per_minute: u64,

    /// Maximum requests in flight, unbounded when absent
    #[serde(default)]
    pub max_concurrent_requests: Option<usize>,

    /// Total retries shared by every request of the run
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Sliding window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Interval between admission checks of a queued request, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            tokens_per_minute: default_tokens_per_minute(),
            max_concurrent_requests: None,
            max_retries: default_max_retries(),
            window_secs: default_window_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Chunk and request sizing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Dialogue lines per chunk
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Maximum chunks per request, also the misalignment correction threshold
    #[serde(default = "default_request_chunks")]
    pub request_chunks: usize,

    /// Maximum serialized JSON characters per request
    #[serde(default = "default_request_chars")]
    pub request_chars: usize,

    /// Chunks per request after a malformed response
    #[serde(default = "default_reduced_request_chunks")]
    pub reduced_request_chunks: usize,

    /// Serialized JSON characters per request after a malformed response
    #[serde(default = "default_reduced_request_chars")]
    pub reduced_request_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_lines: default_chunk_lines(),
            request_chunks: default_request_chunks(),
            request_chars: default_request_chars(),
            reduced_request_chunks: default_reduced_request_chunks(),
            reduced_request_chars: default_reduced_request_chars(),
        }
    }
}

/// Rule excluding ASS events from translation by field value
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssIgnoreRule {
    /// Event field name as written in the Format line, case insensitive
    pub field: String,
    /// Values that exclude the event
    pub values: HashSet<String>,
}

/// ASS specific settings
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AssSettings {
    #[serde(default)]
    pub ignore: Vec<AssIgnoreRule>,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_outfile_suffix() -> String {
    "_translated".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_requests_per_minute() -> u32 {
    15
}

fn default_tokens_per_minute() -> u64 {
    1_000_000
}

fn default_max_retries() -> usize {
    50
}

fn default_window_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_chunk_lines() -> usize {
    10
}

fn default_request_chunks() -> usize {
    30
}

fn default_request_chars() -> usize {
    300_000
}

fn default_reduced_request_chunks() -> usize {
    5
}

fn default_reduced_request_chars() -> usize {
    8_000
}

fn default_prompt() -> String {
    "You are a professional subtitle translator. Translate the dialogue below from {source_language} to {target_language}.\n\
     The input is a JSON object with a list of chunks, each chunk holds up to {lines_per_chunk} dialogue lines.\n\
     Return the same JSON structure with every `dialogue` line translated. Keep the same number of chunks and the \
     same number of lines in each chunk, never merge or split lines. Leave placeholders like {format 0} untouched.\n\n\
     {json}"
        .to_string()
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Write this configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write config to file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.source_language.trim().is_empty() || self.target_language.trim().is_empty() {
            return Err(anyhow!("Source and target languages are required"));
        }
        if self.outfile_suffix.is_empty() {
            return Err(anyhow!("outfile_suffix cannot be empty, translations would overwrite their sources"));
        }

        url::Url::parse(&self.provider.endpoint)
            .with_context(|| format!("Invalid provider endpoint: {}", self.provider.endpoint))?;

        let limits = &self.limits;
        if limits.requests_per_minute == 0 || limits.tokens_per_minute == 0 {
            return Err(anyhow!("requests_per_minute and tokens_per_minute must be positive"));
        }
        if limits.max_concurrent_requests == Some(0) {
            return Err(anyhow!("max_concurrent_requests must be positive when set"));
        }
        if limits.window_secs == 0 || limits.poll_interval_ms == 0 {
            return Err(anyhow!("window_secs and poll_interval_ms must be positive"));
        }

        let chunking = &self.chunking;
        if chunking.chunk_lines == 0 || chunking.request_chunks == 0 || chunking.reduced_request_chunks == 0 {
            return Err(anyhow!("chunk_lines, request_chunks and reduced_request_chunks must be positive"));
        }
        if chunking.reduced_request_chunks > chunking.request_chunks
            || chunking.reduced_request_chars > chunking.request_chars
        {
            return Err(anyhow!("Reduced request budget cannot be larger than the request budget"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "English".to_string(),
            target_language: "Italian".to_string(),
            outfile_suffix: default_outfile_suffix(),
            provider: ProviderConfig::default(),
            limits: RateLimitConfig::default(),
            chunking: ChunkingConfig::default(),
            ass: AssSettings::default(),
            log_level: LogLevel::default(),
        }
    }
}
