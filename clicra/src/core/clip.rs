//! Character-bounded truncation shared by context collection and analysis.

/// Result of clipping text to a character budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clipped<'a> {
    pub text: &'a str,
    /// Number of characters dropped from the end.
    pub dropped_chars: usize,
}

impl Clipped<'_> {
    pub fn truncated(&self) -> bool {
        self.dropped_chars > 0
    }
}

/// Keep the first `max_chars` characters of `text`.
///
/// Text at or under the limit is returned unchanged. Cuts always land on a
/// char boundary, so the result is exactly `max_chars` characters long when
/// truncation happens.
pub fn truncate_chars(text: &str, max_chars: usize) -> Clipped<'_> {
    match text.char_indices().nth(max_chars) {
        None => Clipped {
            text,
            dropped_chars: 0,
        },
        Some((cut, _)) => Clipped {
            text: &text[..cut],
            dropped_chars: text[cut..].chars().count(),
        },
    }
}

/// Truncate and append a visible marker when anything was dropped.
///
/// Used for analysis prompts, where the model should know output was cut.
pub fn clip_with_notice(text: &str, max_chars: usize) -> String {
    let clipped = truncate_chars(text, max_chars);
    if clipped.truncated() {
        format!(
            "{}\n[truncated {} chars]",
            clipped.text, clipped.dropped_chars
        )
    } else {
        clipped.text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        let clipped = truncate_chars("hello", 2000);
        assert_eq!(clipped.text, "hello");
        assert!(!clipped.truncated());
    }

    #[test]
    fn exact_length_is_unchanged() {
        let clipped = truncate_chars("abcd", 4);
        assert_eq!(clipped.text, "abcd");
        assert_eq!(clipped.dropped_chars, 0);
    }

    #[test]
    fn long_text_keeps_exactly_max_chars_from_start() {
        let text = "x".repeat(2500);
        let clipped = truncate_chars(&text, 2000);
        assert_eq!(clipped.text.chars().count(), 2000);
        assert_eq!(clipped.dropped_chars, 500);
    }

    #[test]
    fn multibyte_text_cuts_on_char_boundary() {
        let clipped = truncate_chars("héllo wörld", 4);
        assert_eq!(clipped.text, "héll");
        assert_eq!(clipped.dropped_chars, 7);
    }

    #[test]
    fn notice_only_added_when_truncated() {
        assert_eq!(clip_with_notice("abc", 10), "abc");
        assert_eq!(clip_with_notice("abcdef", 3), "abc\n[truncated 3 chars]");
    }

    #[test]
    fn zero_budget_drops_everything() {
        let clipped = truncate_chars("abc", 0);
        assert_eq!(clipped.text, "");
        assert_eq!(clipped.dropped_chars, 3);
    }
}
