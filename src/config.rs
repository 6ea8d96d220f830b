use std::time::Duration;

use crate::constants;
use crate::gemini::RetryPolicy;

/// Limits applied by a conversation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Longest accepted question, in characters.
    pub max_input_chars: usize,
    /// Transcript size at which further submissions are refused.
    pub max_messages: usize,
    /// Number of prior messages rendered into each prompt.
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_input_chars: constants::MAX_INPUT_CHARS,
            max_messages: constants::MAX_TRANSCRIPT_MESSAGES,
            history_window: constants::HISTORY_WINDOW,
        }
    }
}

/// Connection settings for the generation endpoint.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: constants::GEMINI_API_URL.clone(),
            api_key: constants::GEMINI_API_KEY.clone(),
            timeout: Duration::from_secs(constants::REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}
