//! Configuration module for the Fauna Gateway server
//!
//! Configuration is assembled from `.env` files (via dotenvy, loaded in
//! `main`), process environment variables, and optionally a YAML file passed
//! with `--config`. Priority: YAML > ENV vars > .env values > defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default chat-completion model
const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

/// Default synthesis voice
const DEFAULT_SYNTHESIS_VOICE: &str = "alloy";

/// Default timeout for every external service call, in seconds
const DEFAULT_EXTERNAL_CALL_TIMEOUT_SECS: u64 = 30;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Server configuration
///
/// Contains everything needed to run the gateway: bind address, CORS policy,
/// external-service credentials and endpoints, media storage directories,
/// the persona prompt table location, and dialogue history policy.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    /// Comma-separated allowed origins, or "*" for any. `None` allows any
    /// origin (the gateway carries no authentication surface).
    pub cors_allowed_origins: Option<String>,

    /// OpenAI API key for chat completion and speech synthesis
    pub openai_api_key: Option<String>,
    /// Chat-completion model identifier; also keys the persona prompt table
    pub completion_model: String,
    /// Voice used for speech synthesis
    pub synthesis_voice: String,

    /// Object-detection inference endpoint (POST, base64 image in, boxes out)
    pub detector_url: Option<String>,
    /// Optional bearer token for the detection endpoint
    pub detector_api_key: Option<String>,

    /// Directory for images received over the channel and the identify endpoint
    pub images_dir: PathBuf,
    /// Directory for voice messages received over the channel
    pub audios_dir: PathBuf,

    /// Path to the persona prompt table (JSON: model -> persona -> prompt)
    pub prompts_path: Option<PathBuf>,

    /// Maximum retained non-system turns per conversation. `None` keeps the
    /// full history for the process lifetime (source-compatible default).
    pub max_history_turns: Option<usize>,

    /// Timeout applied to each completion/synthesis/detection call
    pub external_call_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: None,
            openai_api_key: None,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            synthesis_voice: DEFAULT_SYNTHESIS_VOICE.to_string(),
            detector_url: None,
            detector_api_key: None,
            images_dir: PathBuf::from("received_images"),
            audios_dir: PathBuf::from("received_audios"),
            prompts_path: None,
            max_history_turns: None,
            external_call_timeout_secs: DEFAULT_EXTERNAL_CALL_TIMEOUT_SECS,
        }
    }
}

/// Optional overrides loaded from a YAML config file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlConfig {
    host: Option<String>,
    port: Option<u16>,
    cors_allowed_origins: Option<String>,
    openai_api_key: Option<String>,
    completion_model: Option<String>,
    synthesis_voice: Option<String>,
    detector_url: Option<String>,
    detector_api_key: Option<String>,
    images_dir: Option<PathBuf>,
    audios_dir: Option<PathBuf>,
    prompts_path: Option<PathBuf>,
    max_history_turns: Option<usize>,
    external_call_timeout_secs: Option<u64>,
}

impl YamlConfig {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(origins) = self.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(key) = self.openai_api_key {
            config.openai_api_key = Some(key);
        }
        if let Some(model) = self.completion_model {
            config.completion_model = model;
        }
        if let Some(voice) = self.synthesis_voice {
            config.synthesis_voice = voice;
        }
        if let Some(url) = self.detector_url {
            config.detector_url = Some(url);
        }
        if let Some(key) = self.detector_api_key {
            config.detector_api_key = Some(key);
        }
        if let Some(dir) = self.images_dir {
            config.images_dir = dir;
        }
        if let Some(dir) = self.audios_dir {
            config.audios_dir = dir;
        }
        if let Some(path) = self.prompts_path {
            config.prompts_path = Some(path);
        }
        if let Some(turns) = self.max_history_turns {
            config.max_history_turns = Some(turns);
        }
        if let Some(secs) = self.external_call_timeout_secs {
            config.external_call_timeout_secs = secs;
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_env_raw()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling anything the file leaves unset
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_env_raw()?;
        let yaml: YamlConfig = serde_yaml::from_str(&fs::read_to_string(path)?)?;
        yaml.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn from_env_raw() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port.parse().map_err(|e| ConfigError::Invalid {
                field: "PORT",
                message: format!("{e}"),
            })?;
        }
        if let Ok(origins) = env::var("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = Some(origins);
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config.openai_api_key = Some(key);
        }
        if let Ok(model) = env::var("COMPLETION_MODEL") {
            config.completion_model = model;
        }
        if let Ok(voice) = env::var("SYNTHESIS_VOICE") {
            config.synthesis_voice = voice;
        }
        if let Ok(url) = env::var("DETECTOR_URL") {
            config.detector_url = Some(url);
        }
        if let Ok(key) = env::var("DETECTOR_API_KEY") {
            config.detector_api_key = Some(key);
        }
        if let Ok(dir) = env::var("IMAGES_DIR") {
            config.images_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("AUDIOS_DIR") {
            config.audios_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("PROMPTS_PATH") {
            config.prompts_path = Some(PathBuf::from(path));
        }
        if let Ok(turns) = env::var("MAX_HISTORY_TURNS") {
            config.max_history_turns =
                Some(turns.parse().map_err(|e| ConfigError::Invalid {
                    field: "MAX_HISTORY_TURNS",
                    message: format!("{e}"),
                })?);
        }
        if let Ok(secs) = env::var("EXTERNAL_CALL_TIMEOUT_SECS") {
            config.external_call_timeout_secs =
                secs.parse().map_err(|e| ConfigError::Invalid {
                    field: "EXTERNAL_CALL_TIMEOUT_SECS",
                    message: format!("{e}"),
                })?;
        }

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.detector_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                field: "DETECTOR_URL",
                message: format!("must be an http(s) URL, got '{url}'"),
            });
        }
        if self.max_history_turns == Some(0) {
            return Err(ConfigError::Invalid {
                field: "MAX_HISTORY_TURNS",
                message: "must be at least 1 (unset it for unbounded history)".to_string(),
            });
        }
        if self.external_call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "EXTERNAL_CALL_TIMEOUT_SECS",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Bind address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
