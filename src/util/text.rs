use std::borrow::Cow;
use std::fmt::Write;
use std::time::Duration;

/// Ellipsis appended to truncated text
const ELLIPSIS: &str = "...";

/// Formats a duration the compact way episode runtimes are shown: `1h5m`, `45m`, `30s`.
///
/// Zero components are omitted; a zero duration yields an empty string.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use episodic::util::human_duration;
///
/// assert_eq!(human_duration(Duration::from_secs(65 * 60)), "1h5m");
/// assert_eq!(human_duration(Duration::from_secs(45 * 60)), "45m");
/// assert_eq!(human_duration(Duration::from_secs(3600)), "1h");
/// ```
pub fn human_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    let mut out = String::new();

    let hours = secs / 3600;
    if hours > 0 {
        let _ = write!(out, "{hours}h");
        secs %= 3600;
    }

    let minutes = secs / 60;
    if minutes > 0 {
        let _ = write!(out, "{minutes}m");
        secs %= 60;
    }

    if secs > 0 {
        let _ = write!(out, "{secs}s");
    }

    out
}

/// Renders Discord user mentions separated by spaces (`<@1> <@2>`), keeping
/// only as many leading users as fit in `max_chars`. A mention is never cut
/// in half.
///
/// Returns the rendered text and the users it actually mentions.
pub fn mentions_within(user_ids: &[i64], max_chars: usize) -> (String, &[i64]) {
    let mut out = String::new();
    let mut count = 0;
    for id in user_ids {
        let sep = if out.is_empty() { "" } else { " " };
        let mention = format!("{sep}<@{id}>");
        if out.len() + mention.len() > max_chars {
            break;
        }
        out.push_str(&mention);
        count += 1;
    }
    (out, &user_ids[..count])
}

/// Truncates `s` to at most `max_chars` characters, ending with "..." when cut.
///
/// Discord rejects embeds whose title or description exceed fixed character
/// limits, so provider text is clipped before it is sent. Returns
/// `Cow::Borrowed` when no truncation is needed.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }

    let ellipsis_len = ELLIPSIS.chars().count();
    if max_chars <= ellipsis_len {
        return Cow::Owned(s.chars().take(max_chars).collect());
    }

    let mut out: String = s.chars().take(max_chars - ellipsis_len).collect();
    out.push_str(ELLIPSIS);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration_components() {
        assert_eq!(human_duration(Duration::from_secs(0)), "");
        assert_eq!(human_duration(Duration::from_secs(42)), "42s");
        assert_eq!(human_duration(Duration::from_secs(22 * 60)), "22m");
        assert_eq!(human_duration(Duration::from_secs(2 * 3600 + 61)), "2h1m1s");
    }

    #[test]
    fn test_mentions() {
        assert_eq!(mentions_within(&[], 100).0, "");
        assert_eq!(mentions_within(&[42], 100).0, "<@42>");
    }

    #[test]
    fn test_mentions_within_keeps_whole_mentions() {
        let ids = [1, 2, 3];
        assert_eq!(mentions_within(&ids, 100), ("<@1> <@2> <@3>".to_string(), &ids[..]));
        // "<@1> <@2>" is 9 chars; the third mention would need 5 more
        assert_eq!(mentions_within(&ids, 12), ("<@1> <@2>".to_string(), &ids[..2]));
        assert_eq!(mentions_within(&ids, 3), (String::new(), &ids[..0]));
    }

    #[test]
    fn test_truncate_short_text_borrowed() {
        let result = truncate_chars("Pilot", 10);
        assert!(matches!(result, Cow::Borrowed("Pilot")));
    }

    #[test]
    fn test_truncate_long_text() {
        assert_eq!(truncate_chars("The One Where", 8), "The O...");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        // Multi-byte characters must not be split
        assert_eq!(truncate_chars("ÉÉÉÉÉÉ", 5), "ÉÉ...");
        assert_eq!(truncate_chars("ÉÉÉ", 3), "ÉÉÉ");
    }

    #[test]
    fn test_truncate_tiny_limit_has_no_ellipsis() {
        assert_eq!(truncate_chars("abcdef", 2), "ab");
        assert_eq!(truncate_chars("abcdef", 0), "");
    }
}
