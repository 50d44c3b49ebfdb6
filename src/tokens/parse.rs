//! Human-readable token counts ("12,345", "3.2k", "1.5M") to integers.

use std::sync::OnceLock;

use regex::Regex;

fn count_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d[\d,\s]*)(?:\.(\d+))?\s*([KkMm])?").ok())
        .as_ref()
}

/// Parse the first token count found in `text`.
///
/// Grouping commas and spaces are ignored, `k` multiplies by a thousand and
/// `m` by a million. Returns `None` (never zero) when nothing parses.
pub fn parse_token_count(text: &str) -> Option<u64> {
    let normalized = text.replace('\u{a0}', " ");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return None;
    }

    let caps = count_pattern()?.captures(normalized)?;
    let int_part: String = caps[1]
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let number = match caps.get(2) {
        Some(frac) => format!("{}.{}", int_part, frac.as_str()),
        None => int_part,
    };

    let mut value: f64 = number.parse().ok()?;
    match caps.get(3).map(|m| m.as_str()) {
        Some("k") | Some("K") => value *= 1_000.0,
        Some("m") | Some("M") => value *= 1_000_000.0,
        _ => {}
    }

    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_grouped() {
        assert_eq!(parse_token_count("12,345"), Some(12345));
        assert_eq!(parse_token_count("12 345"), Some(12345));
        assert_eq!(parse_token_count("0"), Some(0));
        assert_eq!(parse_token_count("  777 "), Some(777));
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(parse_token_count("3.2k"), Some(3200));
        assert_eq!(parse_token_count("3.2 K"), Some(3200));
        assert_eq!(parse_token_count("1.5M"), Some(1_500_000));
        assert_eq!(parse_token_count("2m"), Some(2_000_000));
    }

    #[test]
    fn test_rejects_non_numbers() {
        assert_eq!(parse_token_count(""), None);
        assert_eq!(parse_token_count("   "), None);
        assert_eq!(parse_token_count("abc"), None);
    }

    #[test]
    fn test_non_breaking_space_and_surrounding_text() {
        assert_eq!(parse_token_count("Tokens:\u{a0}4\u{a0}096"), Some(4096));
        assert_eq!(parse_token_count("12,345 / 50,000"), Some(12345));
    }

    #[test]
    fn test_rounds_fractions() {
        assert_eq!(parse_token_count("10.6"), Some(11));
        assert_eq!(parse_token_count("0.25k"), Some(250));
    }
}
