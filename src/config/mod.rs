use anyhow::{Context, Result};
use console::style;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::improve::ImprovementPolicy;
use crate::transcribe::backoff::BackoffPolicy;
use crate::transcribe::fetcher::RetrySettings;
use crate::utils::mask_secret;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Transcript fetching settings
    pub transcript: TranscriptConfig,

    /// Completion service settings
    pub improvement: ImprovementConfig,

    /// API key for the completion service, only ever read from the environment
    #[serde(skip)]
    pub openai_api_key: Option<String>,

    /// API key for the YouTube Data API, only ever read from the environment
    #[serde(skip)]
    pub youtube_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upper bound for a single request, `None` disables the limit
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Maximum fetch attempts per request
    pub max_retries: u32,

    /// Delay between attempts
    pub backoff: BackoffPolicy,

    /// Also wait before the first attempt
    pub wait_before_first_attempt: bool,

    /// Preferred caption languages, in order
    pub languages: Vec<String>,

    /// Ask the YouTube Data API when no transcript is found
    pub captions_fallback: bool,

    /// Timeout for each upstream HTTP call
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImprovementConfig {
    /// Failure policy for the completion call
    pub policy: ImprovementPolicy,

    /// Chat model name
    pub model: String,

    /// Base URL of an OpenAI compatible API
    pub api_base: String,

    /// Timeout for the completion call
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: Some(300),
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            wait_before_first_attempt: false,
            languages: vec!["en".to_string()],
            captions_fallback: false,
            http_timeout_secs: 30,
        }
    }
}

impl Default for ImprovementConfig {
    fn default() -> Self {
        Self {
            policy: ImprovementPolicy::Strict,
            model: "gpt-4".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        // A missing .env file is fine
        dotenvy::dotenv().ok();

        let mut config = match Self::config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Loading configuration from {}", path.display());

        let content = fs_err::read_to_string(path).context("Failed to read config file")?;
        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// First existing configuration file, if any
    pub fn config_path() -> Option<PathBuf> {
        // Current directory first for easy local runs
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        Self::user_config_path().filter(|path| path.exists())
    }

    /// Location of the per-user configuration file
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ytscribe").join("config.yaml"))
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("YOUTUBE_API_KEY") {
            self.youtube_api_key = Some(key);
        }
        if let Some(base) = lookup("OPENAI_API_BASE") {
            self.improvement.api_base = base;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.improvement.model = model;
        }
        if let Some(policy) = lookup("IMPROVEMENT_POLICY") {
            self.improvement.policy = policy.parse()?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", port))?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.transcript.max_retries == 0 {
            anyhow::bail!("transcript.max_retries must be at least 1");
        }

        if self.transcript.languages.is_empty() {
            anyhow::bail!("transcript.languages must list at least one language code");
        }

        self.transcript.backoff.validate()?;

        if self.improvement.model.trim().is_empty() {
            anyhow::bail!("improvement.model must not be empty");
        }

        url::Url::parse(&self.improvement.api_base)
            .with_context(|| format!("improvement.api_base is not a valid URL: {}", self.improvement.api_base))?;

        Ok(())
    }

    /// Retry settings for the transcript fetcher
    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_retries: self.transcript.max_retries,
            backoff: self.transcript.backoff,
            wait_before_first_attempt: self.transcript.wait_before_first_attempt,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.transcript.http_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.server.request_timeout_secs.map(Duration::from_secs)
    }

    /// API key for the completion service
    pub fn openai_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .context("OPENAI_API_KEY is not set")
    }

    /// Display current configuration
    pub fn display(&self) {
        let secret = |value: &Option<String>| match value {
            Some(value) => mask_secret(value),
            None => style("not set").red().to_string(),
        };

        println!("{}", style("Current Configuration:").bold());
        println!("  Listen address: {}:{}", self.server.host, self.server.port);
        match self.server.request_timeout_secs {
            Some(secs) => println!("  Request timeout: {}s", secs),
            None => println!("  Request timeout: none"),
        }
        println!("  Max fetch attempts: {}", self.transcript.max_retries);
        println!("  Backoff: {}", self.transcript.backoff);
        println!("  Wait before first attempt: {}", self.transcript.wait_before_first_attempt);
        println!("  Languages: {}", self.transcript.languages.join(", "));
        println!("  Captions fallback: {}", self.transcript.captions_fallback);
        println!("  Improvement policy: {}", self.improvement.policy);
        println!("  Model: {}", self.improvement.model);
        println!("  API base: {}", self.improvement.api_base);
        println!("  OpenAI API key: {}", secret(&self.openai_api_key));
        println!("  YouTube API key: {}", secret(&self.youtube_api_key));
    }
}
