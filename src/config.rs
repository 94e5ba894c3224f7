//! Command-line and environment configuration shared by the `serve` and `chat` commands.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::constants::{
    API_KEY_ENV, DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, DEFAULT_WINDOW,
};
use crate::error::{ChatError, Result};

#[derive(Args, Debug, Clone)]
pub struct LibraryArgs {
    #[arg(
        long,
        env = "CHAPTER_CHAT_DIR",
        default_value = ".",
        help = "Directory containing chapter_*.txt / Chapter_*.txt files."
    )]
    pub dir: PathBuf,
}

// No Debug derive: the credential must never reach a log line.
#[derive(Args, Clone)]
pub struct ModelArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, help = "Chat-completion API key.")]
    pub api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_API_BASE, help = "Base URL of the chat-completion API.")]
    pub api_base: String,

    #[arg(long, env = "CHAPTER_CHAT_MODEL", default_value = DEFAULT_MODEL, help = "Model identifier sent with every request.")]
    pub model: String,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, help = "Seconds to wait for a completion before giving up.")]
    pub timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_WINDOW, help = "Number of recent turns replayed into each prompt.")]
    pub window: usize,
}

impl ModelArgs {
    pub fn resolve(&self) -> Result<CompletionSettings> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ChatError::Configuration(format!(
                    "please set the {} environment variable",
                    API_KEY_ENV
                ))
            })?;

        Ok(CompletionSettings {
            api_key: api_key.to_string(),
            api_base: self.api_base.trim_end_matches('/').to_string(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// Everything the completion client needs to reach the remote model.
#[derive(Clone)]
pub struct CompletionSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
