//! Error taxonomy shared by the local and remote services.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller input rejected before any I/O.
    #[error("{0}")]
    Validation(String),

    /// Rate-limit retries were exhausted.
    #[error("RATE_LIMIT: rate limited after {attempts} attempts")]
    RateLimited { attempts: u32, retry_after_ms: Option<u64> },

    /// An external command exited non-zero with no recognizable status semantics.
    #[error("{command} failed (exit {status}): {stderr}")]
    CommandFailed { command: String, status: i32, stderr: String },

    #[error("{0} CLI not installed")]
    NotInstalled(String),

    #[error("{0}")]
    NotAuthenticated(String),

    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn parse(what: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Error::Parse { what: what.into(), detail: detail.to_string() }
    }

    /// Stable machine-readable code for the `{ok: false, code, error}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION",
            Error::RateLimited { .. } => "RATE_LIMIT",
            Error::CommandFailed { .. } => "COMMAND_FAILED",
            Error::NotInstalled(_) => "GH_NOT_INSTALLED",
            Error::NotAuthenticated(_) => "GH_NOT_AUTHED",
            Error::Parse { .. } => "PARSE",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
