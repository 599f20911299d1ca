//! Startup configuration read from the environment

use crate::emitter::DEFAULT_PACING;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GREETING: &str =
    "Bonjour ! 👋 Je suis votre assistant IA. Comment puis-je vous aider ?";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Settings for the agent gateway
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible endpoint (e.g. `http://localhost:4000/v1`)
    pub gateway: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub system_prompt: Option<String>,
}

/// Settings for the session controller
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause between released words
    pub pacing: Duration,
    pub greeting: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub agent: AgentConfig,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pacing = match parse_u64(&var, "CHATDECK_PACING_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_PACING,
        };
        let timeout = match parse_u64(&var, "CHATDECK_TIMEOUT_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            agent: AgentConfig {
                api_key: var("OPENAI_API_KEY"),
                gateway: var("LLM_GATEWAY"),
                model: var("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                timeout,
                system_prompt: var("CHATDECK_SYSTEM_PROMPT"),
            },
            session: SessionConfig {
                pacing,
                greeting: var("CHATDECK_GREETING").unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            },
        })
    }
}

fn parse_u64(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    var(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { var: key, value })
        })
        .transpose()
}
