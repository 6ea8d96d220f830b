// Conversation state for one chat session, plus the interactive terminal chat.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::{GenerationError, Rejection};
use crate::gemini::Generator;
use crate::locale::Locale;
use crate::menu::MenuStore;
use crate::message::{ChatMessage, Transcript};
use crate::preferences::{remember_locale, PreferenceStore};
use crate::prompt::{self, LINE_BREAK_MARKUP};
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A generation call is in flight; new submissions are refused.
    Pending,
}

/// A user turn that has been accepted and is waiting for its reply.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub prompt: String,
    pub locale: Locale,
    epoch: u64,
}

/// Owns the transcript of one session and drives each question through the
/// prompt builder and a [`Generator`].
pub struct Conversation {
    menu: Arc<MenuStore>,
    config: ChatConfig,
    locale: Locale,
    transcript: Transcript,
    state: SessionState,
    // Bumped on every clear so replies to abandoned turns are dropped.
    epoch: u64,
}

impl Conversation {
    pub fn new(menu: Arc<MenuStore>, config: ChatConfig, locale: Locale) -> Self {
        Self {
            menu,
            config,
            locale,
            transcript: Transcript::new(),
            state: SessionState::Idle,
            epoch: 0,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == SessionState::Pending
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    /// Validate `text` and, if accepted, append it as a user message and
    /// return the prompt to generate from. A rejection leaves the transcript
    /// untouched.
    pub fn begin_turn(&mut self, text: &str) -> Result<PendingTurn, Rejection> {
        if self.is_pending() {
            return Err(Rejection::Busy);
        }
        // An accepted turn appends two messages, the question and its reply.
        if self.transcript.len() + 2 > self.config.max_messages {
            return Err(Rejection::TranscriptFull);
        }
        validation::validate_input(text, self.config.max_input_chars)?;

        // History is taken before the new message lands.
        let history = prompt::history_window(self.transcript.messages(), self.config.history_window);
        let prompt = prompt::build_prompt(self.menu.items(), text, history, self.locale);
        debug!(history_len = history.len(), prompt_len = prompt.len(), "Built prompt");

        self.transcript.push(ChatMessage::user(text));
        self.state = SessionState::Pending;
        Ok(PendingTurn {
            prompt,
            locale: self.locale,
            epoch: self.epoch,
        })
    }

    /// Append the assistant reply for `turn`. Failures become the localized
    /// error message so the conversation can continue. Returns `None` when the
    /// turn was abandoned by a reset in the meantime.
    pub fn finish_turn(
        &mut self,
        turn: PendingTurn,
        outcome: Result<String, GenerationError>,
    ) -> Option<&ChatMessage> {
        if turn.epoch != self.epoch {
            debug!("Dropping reply for a turn abandoned by reset");
            return None;
        }
        let text = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Generation failed: {}", e);
                turn.locale.strings().generation_error.to_string()
            }
        };
        self.state = SessionState::Idle;
        Some(self.transcript.push(ChatMessage::assistant(text)))
    }

    /// Accept `text`, generate a reply and append it.
    pub async fn submit<G>(&mut self, generator: &G, text: &str) -> Result<&ChatMessage, Rejection>
    where
        G: Generator + ?Sized,
    {
        let turn = self.begin_turn(text)?;
        let outcome = generator.generate(&turn.prompt, turn.locale).await;
        match self.finish_turn(turn, outcome) {
            Some(reply) => Ok(reply),
            // `&mut self` is held across the await, so nothing can reset in between.
            None => Err(Rejection::Busy),
        }
    }

    /// Drop every message and return to idle. Any turn still in flight is
    /// abandoned.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.state = SessionState::Idle;
        self.epoch += 1;
        info!(locale = %self.locale, "Conversation cleared");
    }

    /// Switch language. Always clears the transcript.
    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
        self.clear();
    }

    /// Start the opening "what's on the menu" exchange.
    pub fn begin_seed(&mut self) -> Result<PendingTurn, Rejection> {
        let seed = self.locale.strings().seed_utterance;
        self.begin_turn(seed)
    }

    pub async fn seed<G>(&mut self, generator: &G) -> Result<&ChatMessage, Rejection>
    where
        G: Generator + ?Sized,
    {
        let seed = self.locale.strings().seed_utterance;
        self.submit(generator, seed).await
    }

    /// Clear and re-issue the seed question.
    pub async fn reset<G>(&mut self, generator: &G) -> Result<&ChatMessage, Rejection>
    where
        G: Generator + ?Sized,
    {
        self.clear();
        self.seed(generator).await
    }

    /// Switch language, then re-issue the seed question in the new language.
    pub async fn change_locale<G>(&mut self, generator: &G, locale: Locale) -> Result<&ChatMessage, Rejection>
    where
        G: Generator + ?Sized,
    {
        self.set_locale(locale);
        self.seed(generator).await
    }
}

/// Render stored reply markup for a plain terminal.
pub fn to_plain_text(text: &str) -> String {
    text.replace(LINE_BREAK_MARKUP, "\n")
}

/// Interactive chat on stdin/stdout. `/reset`, `/lang <tag>` and `/quit`
/// are handled locally; anything else is a question.
pub async fn run_terminal_chat(
    mut conversation: Conversation,
    generator: Arc<dyn Generator>,
    preferences: Arc<dyn PreferenceStore>,
) -> Result<()> {
    info!("Starting terminal chat...");
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let reply = conversation.seed(generator.as_ref()).await.map(|m| m.text.clone());
    print_exchange(&mut stdout, conversation.locale(), reply).await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim_end();

        if line == "/quit" || line == "/exit" {
            break;
        }
        let reply = if line == "/reset" {
            conversation.reset(generator.as_ref()).await.map(|m| m.text.clone())
        } else if let Some(tag) = lang_argument(line) {
            let locale = Locale::parse_or_default(tag);
            remember_locale(preferences.as_ref(), locale);
            conversation
                .change_locale(generator.as_ref(), locale)
                .await
                .map(|m| m.text.clone())
        } else {
            conversation.submit(generator.as_ref(), line).await.map(|m| m.text.clone())
        };
        print_exchange(&mut stdout, conversation.locale(), reply).await?;
    }

    info!("Terminal chat finished.");
    Ok(())
}

/// The tag after a `/lang` command, or `None` if `line` is not one.
fn lang_argument(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("/lang")?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

async fn print_exchange(
    stdout: &mut tokio::io::Stdout,
    locale: Locale,
    reply: Result<String, Rejection>,
) -> Result<()> {
    let out = match reply {
        Ok(text) => format!("\n{}\n\n", to_plain_text(&text)),
        Err(rejection) => format!("! {}\n", rejection.notice(locale)),
    };
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records prompts and answers with a fixed reply.
    #[derive(Default)]
    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for Echo {
        async fn generate(&self, prompt: &str, _locale: Locale) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Here you go".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl Generator for Failing {
        async fn generate(&self, _prompt: &str, _locale: Locale) -> Result<String, GenerationError> {
            Err(GenerationError::Timeout)
        }
    }

    fn conversation(config: ChatConfig) -> Conversation {
        Conversation::new(Arc::new(MenuStore::bundled().unwrap()), config, Locale::Id)
    }

    #[tokio::test]
    async fn test_submit_appends_user_then_assistant() {
        let mut convo = conversation(ChatConfig::default());
        let reply = convo.submit(&Echo::default(), "Menu termurah?").await.unwrap();
        assert_eq!(reply.text, "Here you go");

        let messages = convo.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text, "Menu termurah?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(convo.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_generation_failure_becomes_error_turn() {
        let mut convo = conversation(ChatConfig::default());
        let reply = convo.submit(&Failing, "Menu termurah?").await.unwrap();
        assert_eq!(reply.text, "❌ Tolong ulangi pertanyaanmu!");
        assert_eq!(convo.messages().len(), 2);
        assert!(!convo.is_pending());
    }

    #[test]
    fn test_pending_blocks_new_submission() {
        let mut convo = conversation(ChatConfig::default());
        let turn = convo.begin_turn("first").unwrap();
        assert!(convo.is_pending());
        assert_eq!(convo.begin_turn("second").unwrap_err(), Rejection::Busy);
        assert_eq!(convo.messages().len(), 1);

        convo.finish_turn(turn, Ok("reply".into())).unwrap();
        assert!(convo.begin_turn("second").is_ok());
    }

    #[test]
    fn test_rejections_leave_transcript_unchanged() {
        let mut convo = conversation(ChatConfig::default());
        assert_eq!(convo.begin_turn("   ").unwrap_err(), Rejection::Empty);
        assert_eq!(convo.begin_turn("<script>alert(1)</script>").unwrap_err(), Rejection::Unsafe);
        assert_eq!(
            convo.begin_turn(&"x".repeat(101)).unwrap_err(),
            Rejection::TooLong { max: 100 }
        );
        assert!(convo.messages().is_empty());
        assert!(!convo.is_pending());
    }

    #[test]
    fn test_stale_reply_after_clear_is_dropped() {
        let mut convo = conversation(ChatConfig::default());
        let turn = convo.begin_turn("first").unwrap();
        convo.clear();
        assert!(convo.finish_turn(turn, Ok("late".into())).is_none());
        assert!(convo.messages().is_empty());
        assert!(!convo.is_pending());
    }

    #[tokio::test]
    async fn test_history_excludes_current_question() {
        let echo = Echo::default();
        let config = ChatConfig {
            history_window: 2,
            ..ChatConfig::default()
        };
        let mut convo = conversation(config);
        convo.submit(&echo, "pertama").await.unwrap();
        convo.submit(&echo, "kedua").await.unwrap();

        let prompts = echo.prompts.lock().unwrap();
        assert!(!prompts[0].contains("Percakapan Sebelumnya"));
        assert!(prompts[1].contains("Pembeli: pertama\nAsisten: Here you go\n"));
        assert!(!prompts[1].contains("Pembeli: kedua"));
    }

    #[tokio::test]
    async fn test_reset_reseeds_in_current_locale() {
        let echo = Echo::default();
        let mut convo = conversation(ChatConfig::default());
        convo.submit(&echo, "satu").await.unwrap();
        convo.submit(&echo, "dua").await.unwrap();

        convo.reset(&echo).await.unwrap();
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[0].text, "Ada apa saja menu disini?");
    }

    #[tokio::test]
    async fn test_locale_switch_clears_then_seeds() {
        let echo = Echo::default();
        let mut convo = conversation(ChatConfig::default());
        for q in ["satu", "dua", "tiga"] {
            convo.submit(&echo, q).await.unwrap();
        }
        assert_eq!(convo.messages().len(), 6);

        convo.set_locale(Locale::En);
        assert_eq!(convo.messages().len(), 0);

        convo.seed(&echo).await.unwrap();
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[0].text, "What's on the menu here?");
        assert!(echo.prompts.lock().unwrap().last().unwrap().contains("**Customer Question:**"));
    }

    #[tokio::test]
    async fn test_transcript_cap() {
        let echo = Echo::default();
        let config = ChatConfig {
            max_messages: 4,
            ..ChatConfig::default()
        };
        let mut convo = conversation(config);
        convo.submit(&echo, "satu").await.unwrap();
        convo.submit(&echo, "dua").await.unwrap();

        let err = convo.submit(&echo, "tiga").await.unwrap_err();
        assert_eq!(err, Rejection::TranscriptFull);
        assert_eq!(convo.messages().len(), 4);
        assert!(err.notice(Locale::Id).contains("Batas percakapan"));
    }

    #[tokio::test]
    async fn test_odd_transcript_cap_is_never_exceeded() {
        let echo = Echo::default();
        let config = ChatConfig {
            max_messages: 5,
            ..ChatConfig::default()
        };
        let mut convo = conversation(config);
        convo.submit(&echo, "satu").await.unwrap();
        convo.submit(&echo, "dua").await.unwrap();

        assert_eq!(convo.submit(&echo, "tiga").await.unwrap_err(), Rejection::TranscriptFull);
        assert_eq!(convo.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_full_transcript_is_reported_before_input_problems() {
        let echo = Echo::default();
        let config = ChatConfig {
            max_messages: 2,
            ..ChatConfig::default()
        };
        let mut convo = conversation(config);
        convo.submit(&echo, "satu").await.unwrap();

        assert_eq!(convo.begin_turn("").unwrap_err(), Rejection::TranscriptFull);
        assert_eq!(convo.begin_turn("<script>x</script>").unwrap_err(), Rejection::TranscriptFull);
        assert_eq!(convo.messages().len(), 2);
    }

    #[test]
    fn test_lang_argument() {
        assert_eq!(lang_argument("/lang en"), Some("en"));
        assert_eq!(lang_argument("/lang   id  "), Some("id"));
        assert_eq!(lang_argument("/lang"), Some(""));
        assert_eq!(lang_argument("/language en"), None);
        assert_eq!(lang_argument("/langx"), None);
        assert_eq!(lang_argument("what about /lang"), None);
    }

    #[tokio::test]
    async fn test_no_consecutive_user_messages() {
        let echo = Echo::default();
        let mut convo = conversation(ChatConfig::default());
        for q in ["a", "", "b", "<script>x</script>", "c"] {
            let _ = convo.submit(&echo, q).await;
        }
        for pair in convo.messages().windows(2) {
            assert!(!(pair[0].role == Role::User && pair[1].role == Role::User));
        }
        assert_eq!(convo.messages().len(), 6);
    }

    #[test]
    fn test_to_plain_text() {
        assert_eq!(to_plain_text("a<br>b<br>"), "a\nb\n");
    }
}
