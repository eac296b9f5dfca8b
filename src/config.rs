use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AgentError, AgentResult};
use crate::state::mode::ModeConfig;
use crate::util::{is_local_endpoint_url, non_empty_trimmed, parse_bool_flag};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-opus-4-5-20251101";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_SESSION_DIR: &str = ".codeloop";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub anthropic_version: String,
    pub working_dir: PathBuf,
    pub mode: String,
    pub streaming: bool,
    pub max_tokens: u32,
    pub session_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = env_value("ANTHROPIC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = env_value("ANTHROPIC_API_KEY");
        let model = env_value("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let anthropic_version = env_value("ANTHROPIC_VERSION")
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string());
        let mode = env_value("CODELOOP_MODE").unwrap_or_else(|| "normal".to_string());
        let streaming = std::env::var("CODELOOP_STREAM")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(false);
        let max_tokens = match env_value("CODELOOP_MAX_TOKENS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("Invalid CODELOOP_MAX_TOKENS '{raw}'"))?
                .clamp(128, 64_000),
            None => DEFAULT_MAX_TOKENS,
        };
        let working_dir =
            std::env::current_dir().context("Failed to resolve current directory")?;
        let session_dir = env_value("CODELOOP_SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| working_dir.join(DEFAULT_SESSION_DIR));

        Ok(Self {
            api_key,
            model,
            api_url,
            anthropic_version,
            working_dir,
            mode,
            streaming,
            max_tokens,
            session_dir,
        })
    }

    pub fn validate(&self) -> AgentResult<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(config_error(format!(
                "Invalid ANTHROPIC_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            )));
        }

        let local_endpoint = self.is_local_endpoint();
        if !local_endpoint && self.api_key.is_none() {
            return Err(config_error(format!(
                "ANTHROPIC_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            )));
        }

        if !local_endpoint && self.model.starts_with("local/") {
            return Err(config_error(
                "Local models are only allowed for localhost endpoints",
            ));
        }

        if ModeConfig::builtin(&self.mode).is_none() {
            return Err(config_error(format!(
                "Unknown mode '{}'. Available modes: {}",
                self.mode,
                ModeConfig::names().join(", ")
            )));
        }

        if !self.working_dir.is_dir() {
            return Err(config_error(format!(
                "Working directory '{}' does not exist",
                self.working_dir.display()
            )));
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }

    /// Move the workspace. A session directory still at its default location
    /// follows the workspace; an explicitly configured one stays put.
    pub fn set_working_dir(&mut self, dir: PathBuf) {
        if self.session_dir == self.working_dir.join(DEFAULT_SESSION_DIR) {
            self.session_dir = dir.join(DEFAULT_SESSION_DIR);
        }
        self.working_dir = dir;
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .as_deref()
        .and_then(non_empty_trimmed)
        .map(str::to_string)
}

fn config_error(reason: impl Into<String>) -> AgentError {
    AgentError::Config {
        reason: reason.into(),
    }
}
