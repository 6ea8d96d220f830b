// Defaults loaded from the environment (after `.env` is read in main).

use std::env;

lazy_static::lazy_static! {
    pub static ref GEMINI_API_URL: String = env::var("GEMINI_API_URL").unwrap_or_else(|_| {
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string()
    });
    pub static ref GEMINI_API_KEY: String = env::var("GEMINI_API_KEY").unwrap_or_default();
    pub static ref PREFERENCES_PATH: String = env::var("MENUBOT_PREFS").unwrap_or_else(|_| ".menubot/preferences.json".to_string());
}

/// Longest accepted question, in characters.
pub const MAX_INPUT_CHARS: usize = 100;
/// Messages a session may hold before the user has to reset.
pub const MAX_TRANSCRIPT_MESSAGES: usize = 50;
/// Prior messages included in each prompt.
pub const HISTORY_WINDOW: usize = 5;

pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_RETRIES: usize = 2;
pub const RETRY_INITIAL_DELAY_MS: u64 = 500;
pub const RETRY_MAX_DELAY_MS: u64 = 4_000;
