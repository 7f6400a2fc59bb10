use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, TranscribeError};

/// Upload limit of the OpenAI transcription endpoint
pub const DEFAULT_THRESHOLD_BYTES: u64 = 25 * 1024 * 1024;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

pub const DEFAULT_MODEL: &str = "whisper-1";

/// Configuration for Chunkscribe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transcription service settings
    pub transcription: TranscriptionConfig,

    /// Chunk planning settings
    pub chunking: ChunkingConfig,

    /// External media tools
    pub tools: ToolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// API key for the transcription service. Never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Transcription endpoint URL
    pub endpoint: String,

    /// Model to use for transcription
    pub model: String,

    /// Language hint (ISO-639-1)
    pub language: Option<String>,

    /// Timeout for each segmentation or transcription call (seconds)
    pub timeout_seconds: u64,

    /// Retries for rate-limited or network failures (0 = fail on first error)
    pub max_retries: u32,

    /// First backoff delay, doubled on every retry (milliseconds)
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Files larger than this are split before upload
    pub threshold_bytes: u64,

    /// Directory for temporary segments (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// ffmpeg executable
    pub ffmpeg: PathBuf,

    /// ffprobe executable
    pub ffprobe: PathBuf,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            language: None,
            timeout_seconds: 600, // 10 minutes per request
            max_retries: 0,
            retry_base_delay_ms: 1000,
        }
    }
}

impl TranscriptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            temp_dir: None,
        }
    }
}

impl ChunkingConfig {
    /// Directory new segments are created in
    pub fn segment_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = ["chunkscribe.toml", "config/chunkscribe.toml"];

        let mut config = None;
        for path in &config_paths {
            let path = Path::new(path);
            if path.is_file() {
                config = Some(Self::from_file(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&config_str).map_err(|e| {
            TranscribeError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Override settings from environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = var("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.transcription.api_key = Some(api_key);
        }

        if let Some(model) = var("CHUNKSCRIBE_MODEL") {
            self.transcription.model = model;
        }

        if let Some(endpoint) = var("CHUNKSCRIBE_ENDPOINT") {
            self.transcription.endpoint = endpoint;
        }

        if let Some(threshold) = var("CHUNKSCRIBE_THRESHOLD_BYTES") {
            match threshold.parse() {
                Ok(bytes) => self.chunking.threshold_bytes = bytes,
                Err(_) => tracing::warn!(
                    "Ignoring CHUNKSCRIBE_THRESHOLD_BYTES={}: not a byte count",
                    threshold
                ),
            }
        }

        if let Some(temp_dir) = var("CHUNKSCRIBE_TEMP_DIR") {
            self.chunking.temp_dir = Some(PathBuf::from(temp_dir));
        }
    }

    /// Save configuration to file (the API key is omitted)
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| TranscribeError::Configuration(e.to_string()))?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration.
    ///
    /// The credential is not checked here; a run reports `MissingCredential`
    /// itself so the failure is attributed correctly.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.threshold_bytes == 0 {
            return Err(TranscribeError::Configuration(
                "threshold_bytes must be greater than 0".to_string(),
            ));
        }

        if self.transcription.timeout_seconds == 0 {
            return Err(TranscribeError::Configuration(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.transcription.model.trim().is_empty() {
            return Err(TranscribeError::Configuration(
                "model must not be empty".to_string(),
            ));
        }

        url::Url::parse(&self.transcription.endpoint).map_err(|e| {
            TranscribeError::Configuration(format!(
                "invalid endpoint {}: {}",
                self.transcription.endpoint, e
            ))
        })?;

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Chunkscribe Configuration:\n\
            - Model: {}\n\
            - Endpoint: {}\n\
            - Split Threshold: {:.1} MiB\n\
            - Timeout: {}s\n\
            - Max Retries: {}\n\
            - Segment Dir: {}",
            self.transcription.model,
            self.transcription.endpoint,
            self.chunking.threshold_bytes as f64 / (1024.0 * 1024.0),
            self.transcription.timeout_seconds,
            self.transcription.max_retries,
            self.chunking.segment_dir().display(),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.transcription.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.transcription.model = model.into();
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.config.transcription.language = language;
        self
    }

    pub fn with_threshold_bytes(mut self, threshold_bytes: u64) -> Self {
        self.config.chunking.threshold_bytes = threshold_bytes;
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.chunking.temp_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.config.transcription.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.config.transcription.max_retries = max_retries;
        self.config.transcription.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
