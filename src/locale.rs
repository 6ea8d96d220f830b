//! Supported response languages and the user-facing strings for each.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Indonesian.
    #[default]
    Id,
    /// English.
    En,
}

/// Fixed user-facing strings for one locale.
#[derive(Debug)]
pub struct UiStrings {
    /// Utterance sent automatically when a session starts or is reset.
    pub seed_utterance: &'static str,
    /// Substituted when the model reply cannot be read.
    pub no_recommendation: &'static str,
    /// Assistant turn used when the generation call fails.
    pub generation_error: &'static str,
    pub empty_notice: &'static str,
    /// Contains a `{max}` placeholder.
    pub too_long_notice: &'static str,
    pub unsafe_notice: &'static str,
    pub limit_notice: &'static str,
    pub busy_notice: &'static str,
    pub page_title: &'static str,
    pub input_placeholder: &'static str,
    pub send_label: &'static str,
    pub reset_label: &'static str,
    pub typing_label: &'static str,
}

const ID_STRINGS: UiStrings = UiStrings {
    seed_utterance: "Ada apa saja menu disini?",
    no_recommendation: "Tidak ada rekomendasi.",
    generation_error: "❌ Tolong ulangi pertanyaanmu!",
    empty_notice: "Tolong masukkan pertanyaan terlebih dahulu!",
    too_long_notice: "Pertanyaan terlalu panjang, maksimal {max} karakter.",
    unsafe_notice: "Pertanyaan mengandung karakter yang tidak diizinkan.",
    limit_notice: "Batas percakapan tercapai. Silakan mulai ulang percakapan.",
    busy_notice: "Tunggu sebentar, jawaban sebelumnya sedang diproses.",
    page_title: "Asisten Menu",
    input_placeholder: "Tulis pesanmu...",
    send_label: "Kirim",
    reset_label: "Mulai Ulang",
    typing_label: "💬 Mengetik...",
};

const EN_STRINGS: UiStrings = UiStrings {
    seed_utterance: "What's on the menu here?",
    no_recommendation: "No recommendation available.",
    generation_error: "❌ Please ask your question again!",
    empty_notice: "Please enter a question first!",
    too_long_notice: "Your question is too long, the maximum is {max} characters.",
    unsafe_notice: "Your question contains characters that are not allowed.",
    limit_notice: "Conversation limit reached. Please reset the chat.",
    busy_notice: "Please wait, the previous answer is still on its way.",
    page_title: "Menu Assistant",
    input_placeholder: "Type your message...",
    send_label: "Send",
    reset_label: "Reset",
    typing_label: "💬 Typing...",
};

#[derive(Debug, thiserror::Error)]
#[error("unsupported locale '{0}' (expected one of: id, en)")]
pub struct UnsupportedLocale(pub String);

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::Id, Locale::En];

    pub fn tag(self) -> &'static str {
        match self {
            Locale::Id => "id",
            Locale::En => "en",
        }
    }

    /// Parse a language tag, falling back to the default locale for anything
    /// unsupported.
    pub fn parse_or_default(tag: &str) -> Locale {
        tag.parse().unwrap_or_else(|err: UnsupportedLocale| {
            warn!("{}; falling back to '{}'", err, Locale::default());
            Locale::default()
        })
    }

    pub fn strings(self) -> &'static UiStrings {
        match self {
            Locale::Id => &ID_STRINGS,
            Locale::En => &EN_STRINGS,
        }
    }

    /// Rupiah amount with the locale's thousands separator, e.g. `Rp25.000`.
    pub fn format_price(self, price: u64) -> String {
        let separator = match self {
            Locale::Id => '.',
            Locale::En => ',',
        };
        let digits = price.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(separator);
            }
            grouped.push(ch);
        }
        format!("Rp{}", grouped)
    }
}

impl FromStr for Locale {
    type Err = UnsupportedLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only the primary subtag matters: "en-US" and "en_GB" are English.
        let primary = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "id" | "in" => Ok(Locale::Id),
            "en" => Ok(Locale::En),
            _ => Err(UnsupportedLocale(s.to_string())),
        }
    }
}

// Unsupported tags coming from stored preferences or clients fail closed.
impl<'de> Deserialize<'de> for Locale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Locale::parse_or_default(&tag))
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
