//! Ordering rules for version folders and the files inside them

use std::cmp::Ordering;

/// Version number embedded in a folder name
///
/// Matches `version` (any case) optionally followed by one of ` `, `_`, `-`
/// and then digits: `Version_3`, `version-12`, `VERSION 7`, `Version4`.
pub fn version_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let mut search = lower.as_str();
    while let Some(pos) = search.find("version") {
        let rest = &search[pos + "version".len()..];
        let rest = rest
            .strip_prefix([' ', '_', '-'])
            .unwrap_or(rest);
        let digits: &str = &rest[..rest.bytes().take_while(u8::is_ascii_digit).count()];
        if !digits.is_empty() {
            return digits.parse().ok();
        }
        search = &search[pos + 1..];
    }
    None
}

/// Leading ASCII digits of a file name, if any
fn leading_digits(name: &str) -> Option<&str> {
    let len = name.bytes().take_while(u8::is_ascii_digit).count();
    (len > 0).then(|| &name[..len])
}

/// Compare two digit strings numerically without overflow
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Total order of file names inside one source folder
///
/// Names with a leading number come first, ordered numerically (`2` before
/// `10`); names sharing the same number, and names without one, are ordered
/// by the full name.
pub fn compare_file_names(a: &str, b: &str) -> Ordering {
    match (leading_digits(a), leading_digits(b)) {
        (Some(x), Some(y)) => compare_digits(x, y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Whether `name` looks like formatter output (`<digits> - ...`)
pub fn is_serialized_name(name: &str) -> bool {
    leading_digits(name).is_some_and(|digits| name[digits.len()..].starts_with(" - "))
}
