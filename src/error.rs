use std::path::PathBuf;

use thiserror::Error;

use crate::locale::Locale;

/// Failures while loading a menu dataset.
#[derive(Debug, Error)]
pub enum MenuError {
    #[error("failed to read menu file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("menu data is not a valid list of menu items: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures of a single generation round trip.
///
/// A malformed *successful* response is not an error: the client substitutes
/// the no-recommendation fallback instead.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request timed out")]
    Timeout,
    #[error("network error while calling the generation endpoint: {0}")]
    Network(#[source] reqwest::Error),
    #[error("generation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation client misconfigured: {0}")]
    Config(String),
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout | GenerationError::Network(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else {
            // The request URL carries the API key as a query parameter.
            GenerationError::Network(err.without_url())
        }
    }
}

/// Reasons a submission is refused before anything is appended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("input is empty")]
    Empty,
    #[error("input exceeds {max} characters")]
    TooLong { max: usize },
    #[error("input contains disallowed markup")]
    Unsafe,
    #[error("transcript is full")]
    TranscriptFull,
    #[error("a reply is still pending")]
    Busy,
}

impl Rejection {
    /// Short machine-readable tag, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Empty => "empty",
            Rejection::TooLong { .. } => "too_long",
            Rejection::Unsafe => "unsafe",
            Rejection::TranscriptFull => "limit_reached",
            Rejection::Busy => "busy",
        }
    }

    /// User-facing notice in the session's language.
    pub fn notice(&self, locale: Locale) -> String {
        let strings = locale.strings();
        match self {
            Rejection::Empty => strings.empty_notice.to_string(),
            Rejection::TooLong { max } => strings.too_long_notice.replace("{max}", &max.to_string()),
            Rejection::Unsafe => strings.unsafe_notice.to_string(),
            Rejection::TranscriptFull => strings.limit_notice.to_string(),
            Rejection::Busy => strings.busy_notice.to_string(),
        }
    }
}

/// Failures reading or writing persisted preferences.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("failed to access preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preferences file is corrupt: {0}")]
    Format(#[from] serde_json::Error),
}
