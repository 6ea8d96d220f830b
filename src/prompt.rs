//! Assembles the single text prompt sent to the generation endpoint from the
//! menu, a trailing window of the conversation and the current question.
//!
//! Output is a pure function of its inputs: building the same prompt twice
//! yields byte-identical text.

use std::fmt::Write;

use crate::locale::Locale;
use crate::menu::MenuItem;
use crate::message::{ChatMessage, Role};

/// Line break marker used in stored assistant replies.
pub const LINE_BREAK_MARKUP: &str = "<br>";

/// Labels and fixed prose for one prompt language.
struct Template {
    preamble: &'static str,
    menu_heading: &'static str,
    category_label: &'static str,
    price_label: &'static str,
    composition_label: &'static str,
    history_heading: &'static str,
    user_label: &'static str,
    assistant_label: &'static str,
    question_heading: &'static str,
    /// `{simple_menu}` is replaced with a compact `• name: price` list.
    guide: &'static str,
}

const ID_TEMPLATE: Template = Template {
    preamble: "Kamu adalah asisten menu digital yang membantu pembeli memahami pilihan makanan. \
Jawablah dengan **ramah, padat, dan mudah dipahami** tentang:

- **Nama menu & harga** (jawab singkat)
- **Detail lengkap** (jika diminta)
- **Preferensi kesehatan** (rendah kalori, vegetarian, tanpa gluten, tanpa gula, dll)
- **Rekomendasi menu** (berdasarkan kategori, harga, atau komposisi)",
    menu_heading: "**Daftar Menu:**",
    category_label: "Kategori",
    price_label: "Harga",
    composition_label: "Komposisi",
    history_heading: "**Percakapan Sebelumnya:**",
    user_label: "Pembeli",
    assistant_label: "Asisten",
    question_heading: "**Pertanyaan Pembeli:**",
    guide: "### Panduan Jawaban:
1. **Jawab hanya berdasarkan data menu di atas.** Jangan mengarang menu, harga, atau bahan yang tidak ada.
2. **Untuk pertanyaan umum tentang menu:**
   - Berikan daftar nama dan harga saja secara singkat dan sesuai kategori.
   - Contoh: \"Berikut pilihan menu:
{simple_menu}

Untuk detail komposisi, silakan tanyakan menu tertentu.\"
3. **Untuk pertanyaan spesifik:**
   - Berikan detail sesuai permintaan (harga, kategori, komposisi).
   - Pilih format terbaik: **tabel** untuk perbandingan, **list poin** untuk saran, **kalimat singkat** jika jawabannya langsung.
4. **Rekomendasi sehat:**
   - Sarankan menu berdasarkan komposisi (tanpa gluten, tanpa gorengan, rendah gula, vegetarian, dll) dan sebutkan keterangannya.
   - Contoh: \"Untuk pilihan sehat: Salad Sayur Segar (Rp25.000) - rendah kalori\"
5. **Pertanyaan tentang harga:**
   - Tunjukkan menu termurah, termahal, atau yang sesuai anggaran pembeli.
6. **Jika tidak relevan:**
   > \"Maaf, saya hanya bisa membantu tentang menu. Contoh pertanyaan:
   > - 'Menu vegetarian apa saja?'
   > - 'Apa saja makanan dibawah Rp30.000?'\"
7. **Jika pembeli ingin memesan:**
   - Sampaikan dengan sopan bahwa pesanan dilakukan langsung ke kasir, kamu tidak dapat mencatat pesanan.

**Prioritaskan jawaban singkat terlebih dahulu**, lalu tawarkan detail jika diperlukan. Jawab dalam Bahasa Indonesia.",
};

const EN_TEMPLATE: Template = Template {
    preamble: "You are a digital menu assistant that helps customers understand the food on offer. \
Answer in a **friendly, concise and easy to understand** way about:

- **Menu names & prices** (short answers)
- **Full details** (only when asked)
- **Health preferences** (low calorie, vegetarian, gluten free, sugar free, etc.)
- **Menu recommendations** (by category, price or composition)",
    menu_heading: "**Menu:**",
    category_label: "Category",
    price_label: "Price",
    composition_label: "Composition",
    history_heading: "**Conversation So Far:**",
    user_label: "User",
    assistant_label: "Assistant",
    question_heading: "**Customer Question:**",
    guide: "### Answer Guide:
1. **Answer only from the menu data above.** Never invent dishes, prices or ingredients.
2. **For general questions about the menu:**
   - List only names and prices, briefly and grouped by category.
   - Example: \"Here is what we have:
{simple_menu}

Ask about a specific dish to see its ingredients.\"
3. **For specific questions:**
   - Give the requested details (price, category, composition).
   - Pick the best format: a **table** for comparisons, a **bullet list** for suggestions, a **short sentence** when the answer is direct.
4. **Healthy recommendations:**
   - Suggest dishes based on their composition (gluten free, not fried, low sugar, vegetarian, etc.) and name the attribute.
   - Example: \"For a healthy choice: Salad Sayur Segar (Rp25,000) - low calorie\"
5. **Questions about prices:**
   - Point to the cheapest dish, the most expensive dish, or the dishes that fit the customer's budget.
6. **If the question is off-topic:**
   > \"Sorry, I can only help with the menu. Example questions:
   > - 'Which dishes are vegetarian?'
   > - 'What can I get under Rp30,000?'\"
7. **If the customer wants to order:**
   - Politely explain that orders are placed with the staff at the checkout; you cannot take orders.

**Give the short answer first**, then offer more detail if needed. Answer in English.",
};

fn template(locale: Locale) -> &'static Template {
    match locale {
        Locale::Id => &ID_TEMPLATE,
        Locale::En => &EN_TEMPLATE,
    }
}

/// The last `window` messages of `messages`, in their original order.
pub fn history_window(messages: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = messages.len().saturating_sub(window);
    &messages[start..]
}

/// Render every menu item as a nested bullet block.
pub fn render_menu(menu: &[MenuItem], locale: Locale) -> String {
    let t = template(locale);
    menu.iter()
        .map(|item| {
            format!(
                "- **{}**\n  - {}: {}\n  - {}: {}\n  - {}: {}",
                item.name,
                t.category_label,
                item.category,
                t.price_label,
                locale.format_price(item.price),
                t.composition_label,
                item.composition
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_simple_menu(menu: &[MenuItem], locale: Locale) -> String {
    menu.iter()
        .map(|item| format!("• {}: {}", item.name, locale.format_price(item.price)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render prior turns one per line. Empty when there is no history.
pub fn render_history(history: &[ChatMessage], locale: Locale) -> String {
    let t = template(locale);
    let mut out = String::new();
    for message in history {
        let label = match message.role {
            Role::User => t.user_label,
            Role::Assistant => t.assistant_label,
        };
        let text = message.text.replace(LINE_BREAK_MARKUP, "\n");
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}: {}", label, text.trim_end());
    }
    out
}

/// Build the full instruction prompt for one question.
///
/// `history` should already be windowed (see [`history_window`]) and must not
/// contain the current question. When it is empty the history section is
/// left out entirely.
pub fn build_prompt(
    menu: &[MenuItem],
    utterance: &str,
    history: &[ChatMessage],
    locale: Locale,
) -> String {
    let t = template(locale);
    let mut prompt = String::new();

    prompt.push_str(t.preamble);
    prompt.push_str("\n\n");

    prompt.push_str(t.menu_heading);
    prompt.push('\n');
    prompt.push_str(&render_menu(menu, locale));
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str(t.history_heading);
        prompt.push('\n');
        prompt.push_str(&render_history(history, locale));
        prompt.push('\n');
    }

    prompt.push_str(t.question_heading);
    prompt.push_str("\n\"");
    prompt.push_str(utterance);
    prompt.push_str("\"\n\n");

    prompt.push_str(
        &t.guide
            .replace("{simple_menu}", &render_simple_menu(menu, locale)),
    );
    prompt.push('\n');
    prompt
}
