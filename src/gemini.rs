use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::config::GeminiConfig;
use crate::constants;
use crate::error::GenerationError;
use crate::locale::Locale;
use crate::prompt::LINE_BREAK_MARKUP;

/// Anything that can turn a prompt into reply text.
///
/// A reply the backend returns in an unexpected shape is not an error:
/// implementations substitute `locale`'s no-recommendation string.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, locale: Locale) -> Result<String, GenerationError>;
}

// Request envelope for the generateContent endpoint
#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

// Response envelope. Every level is optional so that a partial payload
// still deserializes and falls through to the fallback string.
#[derive(Deserialize, Debug, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|text| !text.is_empty())
    }
}

/// Pull the first candidate's text out of a raw response body, converting
/// newlines to the markup line break. Falls back to the locale's
/// no-recommendation string when the body is not the expected shape.
pub fn extract_reply(body: &str, locale: Locale) -> String {
    let text = match serde_json::from_str::<GenerateResponse>(body) {
        Ok(parsed) => parsed.first_text(),
        Err(e) => {
            warn!("Generation response is not valid JSON: {}", e);
            None
        }
    };
    match text {
        Some(text) => text.replace('\n', LINE_BREAK_MARKUP),
        None => {
            warn!("Generation response had no candidate text, using fallback");
            locale.strings().no_recommendation.to_string()
        }
    }
}

/// HTTP client for a Gemini-style `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Generator for GeminiClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str, locale: Locale) -> Result<String, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::Config("no API key configured".to_string()));
        }

        let payload = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Generation request failed");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        debug!(body_len = body.len(), "Received generation response");
        Ok(extract_reply(&body, locale))
    }
}

/// How often and how patiently a failed generation is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: usize,
    pub initial_delay: Duration,
    /// Upper bound for the doubled delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: constants::MAX_RETRIES,
            initial_delay: Duration::from_millis(constants::RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(constants::RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op`, retrying while `should_retry` accepts the error.
    pub async fn retry_if<F, Fut, T, E, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && should_retry(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt = attempt + 1, ?delay, "Retrying after error: {}", e);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wraps a [`Generator`] and retries transient failures.
#[derive(Debug, Clone)]
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G> Generator for RetryingGenerator<G>
where
    G: Generator,
{
    async fn generate(&self, prompt: &str, locale: Locale) -> Result<String, GenerationError> {
        self.policy
            .retry_if(|| self.inner.generate(prompt, locale), GenerationError::is_retryable)
            .await
    }
}
