//! Menu question-answering chat.
//!
//! A question flows through [`chat::Conversation`], which validates it,
//! builds a prompt from the [`menu::MenuStore`] and recent history with
//! [`prompt::build_prompt`], and hands it to a [`gemini::Generator`].

pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod gemini;
pub mod locale;
pub mod menu;
pub mod message;
pub mod preferences;
pub mod prompt;
pub mod validation;
pub mod web_server;

pub use chat::{Conversation, PendingTurn, SessionState};
pub use config::{ChatConfig, GeminiConfig};
pub use error::{GenerationError, MenuError, PreferenceError, Rejection};
pub use gemini::{GeminiClient, Generator, RetryPolicy, RetryingGenerator};
pub use locale::Locale;
pub use menu::{MenuItem, MenuStore};
pub use message::{ChatMessage, Role, Transcript};
