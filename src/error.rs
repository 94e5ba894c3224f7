use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Startup cannot proceed: missing credential, no chapter files, bad directory.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read chapter file {path}: {source}")]
    ChapterRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network, auth, rate-limit or malformed-response failures from the completion API.
    #[error("completion request failed: {0}")]
    Upstream(String),

    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),
}

impl ChatError {
    pub fn is_upstream(&self) -> bool {
        matches!(self, ChatError::Upstream(_) | ChatError::Timeout(_))
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
