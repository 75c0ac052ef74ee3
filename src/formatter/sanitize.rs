//! ASCII-safe file names for devices that sort and display plain names

use sanitize_filename::{Options, sanitize_with_options};
use unicode_normalization::UnicodeNormalization;

/// Base name used when nothing printable survives sanitization
pub const FALLBACK_NAME: &str = "track";

/// Make `name` ASCII-only, filesystem-safe and at most `max_len` bytes
///
/// Accented letters lose their marks through NFKD decomposition (`ř` → `r`)
/// and a few letters without a decomposition are spelled out (`ß` → `ss`).
/// Other non-ASCII characters are dropped and unsafe characters become `_`.
/// Runs of whitespace collapse to one space; leading/trailing dots and spaces
/// are trimmed. Returns [`FALLBACK_NAME`] (truncated to `max_len`) when the
/// result would be empty.
pub fn ascii_safe(name: &str, max_len: usize) -> String {
    let mut ascii = String::with_capacity(name.len());
    for c in name.nfkd() {
        if c.is_whitespace() {
            ascii.push(' ');
        } else if c.is_ascii() {
            if !c.is_ascii_control() {
                ascii.push(c);
            }
        } else if let Some(folded) = fold(c) {
            ascii.push_str(folded);
        }
    }

    let collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = sanitize_with_options(
        collapsed.trim_matches(['.', ' ']),
        Options {
            windows: true,
            truncate: false,
            replacement: "_",
        },
    );

    let max_len = max_len.max(1);
    let trimmed = cleaned.trim_matches(['.', ' ']);
    // All ASCII, so byte offsets are char boundaries
    let truncated = &trimmed[..trimmed.len().min(max_len)];
    let result = truncated.trim_end_matches(['.', ' ']);

    if result.is_empty() || result.chars().all(|c| c == '_') {
        FALLBACK_NAME[..FALLBACK_NAME.len().min(max_len)].to_string()
    } else {
        result.to_string()
    }
}

/// ASCII spelling of letters and punctuation NFKD leaves alone
fn fold(c: char) -> Option<&'static str> {
    let s = match c {
        'Æ' => "AE",
        'æ' => "ae",
        'Ð' | 'Đ' => "D",
        'ð' | 'đ' => "d",
        'Ø' => "O",
        'ø' => "o",
        'Þ' => "TH",
        'þ' => "th",
        'ß' => "ss",
        'Œ' => "OE",
        'œ' => "oe",
        'Ł' => "L",
        'ł' => "l",
        'ı' => "i",
        '‘' | '’' => "'",
        '“' | '”' => "\"",
        '–' | '—' => "-",
        _ => return None,
    };
    Some(s)
}
