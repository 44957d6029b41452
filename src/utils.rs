//! Utility functions for text truncation and sizing.
//!
//! Telegram measures message and caption limits in UTF-16 code units, so the
//! length helpers here count those units and cut only at grapheme cluster
//! boundaries.

use unicode_segmentation::UnicodeSegmentation;

/// Marker appended to truncated text
pub const ELLIPSIS: &str = "…";

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use feed_relay::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Shortens `s` to at most `max_units` UTF-16 code units, ending in
/// [`ELLIPSIS`].
///
/// Whole grapheme clusters are kept or dropped together, so emoji and
/// combining sequences are never split. Text that already fits is returned
/// unchanged.
///
/// # Examples
///
/// ```
/// use feed_relay::utils::truncate_with_ellipsis;
/// assert_eq!(truncate_with_ellipsis("hello world", 6), "hello…");
/// assert_eq!(truncate_with_ellipsis("short", 10), "short");
/// // 😀 is two UTF-16 units
/// assert_eq!(truncate_with_ellipsis("😀😀😀", 4), "😀…");
/// ```
#[must_use]
pub fn truncate_with_ellipsis(s: &str, max_units: usize) -> String {
    if utf16_len(s) <= max_units {
        return s.to_string();
    }
    if max_units == 0 {
        return String::new();
    }

    let budget = max_units - utf16_len(ELLIPSIS);
    let mut out = String::with_capacity(s.len().min(budget * 4));
    let mut used = 0;
    for grapheme in s.graphemes(true) {
        let width = utf16_len(grapheme);
        if used + width > budget {
            break;
        }
        out.push_str(grapheme);
        used += width;
    }

    let mut trimmed = out.trim_end().to_string();
    trimmed.push_str(ELLIPSIS);
    trimmed
}

/// Length in UTF-16 code units, the unit of Telegram's text limits
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Human readable byte count, e.g. `12.5 MiB`
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_ellipsis_keeps_emoji_whole() {
        let s = "ab👨‍👩‍👧cd";
        let cut = truncate_with_ellipsis(s, 4);
        assert_eq!(cut, "ab…");
        assert!(cut.chars().all(|c| c != '\u{FFFD}'));
    }

    #[test]
    fn test_ellipsis_counts_utf16_units() {
        let s = "🔥".repeat(10);
        let cut = truncate_with_ellipsis(&s, 7);
        assert_eq!(cut, "🔥🔥🔥…");
        assert_eq!(utf16_len(&cut), 7);
        assert_eq!(utf16_len("👤"), 2);
    }

    #[test]
    fn test_ellipsis_zero_budget() {
        assert_eq!(truncate_with_ellipsis("abc", 0), "");
        assert_eq!(truncate_with_ellipsis("abc", 1), "…");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(50 * 1024 * 1024), "50.0 MiB");
    }

    proptest! {
        #[test]
        fn prop_truncation_respects_limit(
            s in "[\\PC😀🏷️👍]{0,200}",
            max in 0usize..120,
        ) {
            let out = truncate_with_ellipsis(&s, max);
            prop_assert!(utf16_len(&out) <= max);
            if utf16_len(&s) <= max {
                prop_assert_eq!(out, s);
            }
        }
    }
}
