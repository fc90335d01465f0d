//! Configuration loading from the environment

use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::client::DEFAULT_MAX_RETRIES;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the generation service, without trailing slash
    pub base_url: String,

    /// Attempts per request, including the first
    pub max_retries: u32,

    /// Timeout for a single HTTP attempt
    pub request_timeout: Duration,

    /// Whether the simulated microphone grants access
    pub microphone_enabled: bool,

    /// Fixed transcript replacing the simulated recognizer
    pub fixed_transcript: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("LOVE_AGENT_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("LOVE_AGENT_API_BASE_URL must be an http(s) URL, got {base_url:?}");
        }

        let max_retries = match lookup("LOVE_AGENT_MAX_RETRIES") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid LOVE_AGENT_MAX_RETRIES {raw:?}"))?,
            None => DEFAULT_MAX_RETRIES,
        };
        if max_retries == 0 {
            bail!("LOVE_AGENT_MAX_RETRIES must be at least 1");
        }

        let timeout_secs = match lookup("LOVE_AGENT_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid LOVE_AGENT_REQUEST_TIMEOUT_SECS {raw:?}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let microphone_enabled = match lookup("LOVE_AGENT_MICROPHONE").as_deref().map(str::trim) {
            None | Some("on") => true,
            Some("off") => false,
            Some(other) => bail!("LOVE_AGENT_MICROPHONE must be \"on\" or \"off\", got {other:?}"),
        };

        let fixed_transcript = lookup("LOVE_AGENT_TRANSCRIPT").filter(|t| !t.trim().is_empty());

        Ok(Self {
            base_url,
            max_retries,
            request_timeout: Duration::from_secs(timeout_secs),
            microphone_enabled,
            fixed_transcript,
        })
    }
}
