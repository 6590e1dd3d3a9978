//! Typed failures returned by the request layer.
//!
//! The core never retries on its own. Every failure is handed back to the
//! caller, which decides whether to wait, switch model or give up.

use std::time::Duration;
use thiserror::Error;

use crate::rate_limiter::Window;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid local setup (credential, model name, sampling value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The local request ceiling for `window` is exhausted.
    #[error("Rate limit reached for the {window} window, retry in {}s", retry_after.as_secs().max(1))]
    RateLimit { window: Window, retry_after: Duration },

    /// Non-2xx status, transport failure or an unparseable body.
    #[error("Provider error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Provider { status: Option<u16>, message: String },

    #[error("Request timed out after {}s", timeout.as_secs_f32())]
    Timeout { timeout: Duration },

    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn bad_response_shape() -> Self {
        Self::provider(None, "bad response shape")
    }

    /// Whether trying the same request again later can succeed without
    /// the user changing their setup.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
