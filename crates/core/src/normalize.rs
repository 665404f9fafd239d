//! Artist name to search query normalization.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Punctuation that separates words; replaced by a space rather than dropped.
const WORD_SEPARATORS: &[char] = &['-', '_', '.', '/', '–', '—', '‐', '‑'];

/// Letters that do not decompose into an ASCII base plus combining marks.
fn transliterate(c: char) -> Option<&'static str> {
    let replacement = match c {
        'ø' => "o",
        'Ø' => "O",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'ß' => "ss",
        'đ' | 'ð' => "d",
        'Đ' | 'Ð' => "D",
        'ł' => "l",
        'Ł' => "L",
        'þ' => "th",
        'Þ' => "Th",
        'ı' => "i",
        _ => return None,
    };
    Some(replacement)
}

/// Turn a display name into a search query.
///
/// The name is always trimmed. `remove_symbols` folds diacritics to ASCII,
/// turns word separators into spaces, drops any other character that is not
/// an ASCII letter, digit or whitespace, and collapses runs of whitespace.
/// `lowercase` applies Unicode lowercasing last. Idempotent for every flag
/// combination.
pub fn normalize(name: &str, lowercase: bool, remove_symbols: bool) -> String {
    let mut text = name.trim().to_string();

    if remove_symbols {
        text = strip_symbols(&text);
    }

    if lowercase {
        text = text.to_lowercase();
    }

    text
}

fn strip_symbols(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if let Some(replacement) = transliterate(c) {
            out.push_str(replacement);
        } else if c.is_ascii_alphanumeric() || c.is_whitespace() {
            out.push(c);
        } else if WORD_SEPARATORS.contains(&c) {
            out.push(' ');
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
