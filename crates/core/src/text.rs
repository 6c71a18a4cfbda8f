pub const ELLIPSIS: &str = "...";
pub const MAX_TITLE_CHARS: usize = 50;
pub const DEFAULT_SESSION_TITLE: &str = "New conversation";

/// Strips control characters (newline and tab survive) and hard-truncates to
/// `max_chars`, marking the cut with an ellipsis.
pub fn sanitize_message(content: &str, max_chars: usize) -> String {
    let cleaned =
        content.chars().filter(|ch| !ch.is_control() || matches!(ch, '\n' | '\t')).collect::<String>();

    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }

    let mut truncated = cleaned.chars().take(max_chars).collect::<String>();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Collapses whitespace and, for long messages, cuts at the last word
/// boundary so that the title plus ellipsis fits in `MAX_TITLE_CHARS`.
pub fn session_title(first_message: Option<&str>) -> String {
    let collapsed =
        first_message.unwrap_or_default().split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        return DEFAULT_SESSION_TITLE.to_string();
    }
    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return collapsed;
    }

    let budget = MAX_TITLE_CHARS - ELLIPSIS.len();
    let head = collapsed.chars().take(budget + 1).collect::<String>();
    let cut = match head.rfind(' ') {
        Some(index) if index > 0 => head[..index].to_string(),
        _ => head.chars().take(budget).collect(),
    };

    format!("{}{ELLIPSIS}", cut.trim_end())
}

/// Char-boundary-safe prefix used when shortening free text for the model.
pub fn truncate_chars(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut truncated = content.chars().take(max_chars).collect::<String>();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::{sanitize_message, session_title, truncate_chars, DEFAULT_SESSION_TITLE};

    #[test]
    fn sanitize_strips_controls_but_keeps_layout() {
        let input = "line one\u{0007}\nline\ttwo\u{001b}[0m";
        assert_eq!(sanitize_message(input, 2000), "line one\nline\ttwo[0m");
    }

    #[test]
    fn sanitize_truncates_with_marker() {
        let input = "a".repeat(2100);
        let output = sanitize_message(&input, 2000);
        assert_eq!(output.chars().count(), 2003);
        assert!(output.ends_with("..."));
    }

    #[test]
    fn short_titles_are_whitespace_collapsed() {
        assert_eq!(session_title(Some("  quick   pasta\n ideas  ")), "quick pasta ideas");
        assert_eq!(session_title(Some("   ")), DEFAULT_SESSION_TITLE);
        assert_eq!(session_title(None), DEFAULT_SESSION_TITLE);
    }

    #[test]
    fn long_titles_cut_at_word_boundary() {
        let title = session_title(Some(
            "I would like a vegetarian lasagna recipe that my kids will actually eat tonight",
        ));
        assert!(title.chars().count() <= 50, "title too long: {title}");
        assert!(title.ends_with("..."));
        assert_eq!(title, "I would like a vegetarian lasagna recipe that...");
    }

    #[test]
    fn unbroken_long_title_is_hard_cut() {
        let title = session_title(Some(&"x".repeat(80)));
        assert_eq!(title.chars().count(), 50);
    }

    #[test]
    fn truncate_respects_multibyte_characters() {
        assert_eq!(truncate_chars("jalapeño", 7), "jalapeñ...");
        assert_eq!(truncate_chars("ajo", 7), "ajo");
    }
}
