//! Process configuration, resolved once at startup from the environment

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::types::QuotaLimits;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-5.2";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a warm, attentive personal growth coach. \
Listen closely, reflect back what you hear, and ask one thoughtful question at a time.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("Cannot determine a data directory; set DATA_DIR")]
    NoDataDir,
}

/// Settings for the upstream chat-completion API
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    /// Bearer credential; `None` disables chat
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_completion_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            max_completion_tokens: 1024,
            temperature: 0.5,
        }
    }
}

/// System prompts, chosen by the conversation's guardian
#[derive(Debug, Clone, PartialEq)]
pub struct SystemPrompts {
    pub default: String,
    pub by_guardian: HashMap<String, String>,
}

impl SystemPrompts {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            by_guardian: HashMap::new(),
        }
    }

    pub fn with_guardian(mut self, slug: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.by_guardian.insert(slug.into(), prompt.into());
        self
    }

    /// Prompt for `guardian_slug`, or the default when it has none of its own
    pub fn for_guardian(&self, guardian_slug: Option<&str>) -> &str {
        guardian_slug
            .and_then(|slug| self.by_guardian.get(slug))
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

/// Immutable application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub openai: OpenAiConfig,
    pub system_prompts: SystemPrompts,
    /// Number of prior messages sent to the model with each turn
    pub history_window: usize,
    pub quota: QuotaLimits,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values are treated the same as unset ones
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or("BIND_ADDR", get("BIND_ADDR"), DEFAULT_BIND_ADDR)?;

        let data_dir = match get("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|d| d.join("coach-server"))
                .ok_or(ConfigError::NoDataDir)?,
        };

        let defaults = OpenAiConfig::default();
        let openai = OpenAiConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: get("OPENAI_MODEL").unwrap_or(defaults.model),
            max_completion_tokens: parse_or(
                "OPENAI_MAX_COMPLETION_TOKENS",
                get("OPENAI_MAX_COMPLETION_TOKENS"),
                "1024",
            )?,
            temperature: parse_or("OPENAI_TEMPERATURE", get("OPENAI_TEMPERATURE"), "0.5")?,
        };

        // Guardian prompts come as a JSON object of slug -> prompt
        let by_guardian = match get("COACH_GUARDIAN_PROMPTS") {
            Some(raw) => serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|_| {
                ConfigError::Invalid {
                    key: "COACH_GUARDIAN_PROMPTS",
                    value: raw,
                }
            })?,
            None => HashMap::new(),
        };
        let system_prompts = SystemPrompts {
            default: get("COACH_SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            by_guardian,
        };

        Ok(Self {
            bind_addr,
            data_dir,
            openai,
            system_prompts,
            history_window: parse_or("CHAT_HISTORY_WINDOW", get("CHAT_HISTORY_WINDOW"), "20")?,
            quota: QuotaLimits::default(),
        })
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<T, ConfigError> {
    let raw = value.unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}
