//! Helpers for line-length budgeting and text wrapping.
//!
//! Outbound PRIVMSG/NOTICE text is wrapped so that the line as *relayed* by
//! the server stays inside 512 bytes. The relayed form carries our own full
//! prefix, which we cannot know exactly, so the budget assumes the
//! worst-case user (10 bytes) and host (63 bytes) lengths.

/// Truncate a string to at most `max_bytes` bytes without splitting a
/// multi-byte UTF-8 codepoint.
///
/// # Examples
///
/// ```
/// use corvid_proto::util::truncate_utf8_safe;
///
/// assert_eq!(truncate_utf8_safe("hello world", 5), "hello");
/// assert_eq!(truncate_utf8_safe("hi", 10), "hi");
/// ```
#[inline]
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Compute the wrap width for a `command target :text` line.
///
/// Starts from 510 (512 minus CRLF) and subtracts the worst-case relayed
/// prefix `:nick!user@host` (user capped at 10 bytes, host at 63), the
/// command with its surrounding spaces, the target, and the ` :` before
/// the text. Never returns less than 1.
pub fn wrap_width(nick: &str, command: &str, target: &str) -> usize {
    let overhead = 1 + nick.len()       // ":<nick>"
        + 1 + 10                        // "!<user>"
        + 1 + 63                        // "@<host>"
        + command.len() + 2             // " <command> "
        + target.len()
        + 2; // " :"
    510usize.saturating_sub(overhead).max(1)
}

/// Wrap text into lines of at most `width` bytes, breaking on whitespace.
///
/// Runs of whitespace collapse to a single space and leading/trailing
/// whitespace is dropped, so the output is a clean sequence of filled
/// lines. Words longer than the width are split at UTF-8 boundaries.
/// Empty or all-whitespace input yields no lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;

        // Oversized words get hard-split onto their own lines.
        if word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            while word.len() > width {
                let head = truncate_utf8_safe(word, width);
                if head.is_empty() {
                    // A codepoint wider than the whole line; emit it anyway
                    // rather than loop forever.
                    break;
                }
                lines.push(head.to_string());
                word = &word[head.len()..];
            }
        }

        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo";
        assert_eq!(truncate_utf8_safe(s, 2), "h");
        assert_eq!(truncate_utf8_safe(s, 3), "hé");
    }

    #[test]
    fn wrap_width_matches_privmsg_budget() {
        // 510 - 1-6 - 11 - 64 - 9 - 5 - 2 with nick "corvid", target "#chan"
        assert_eq!(wrap_width("corvid", "PRIVMSG", "#chan"), 412);
        // NOTICE is one byte shorter than PRIVMSG
        assert_eq!(wrap_width("corvid", "NOTICE", "#chan"), 413);
    }

    #[test]
    fn wrap_width_never_zero() {
        let target: String = std::iter::repeat('x').take(600).collect();
        assert_eq!(wrap_width("corvid", "PRIVMSG", &target), 1);
    }

    #[test]
    fn short_text_is_one_line() {
        assert_eq!(wrap_text("hello world", 40), vec!["hello world"]);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap_text("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(wrap_text("  a \t b  ", 10), vec!["a b"]);
        assert!(wrap_text("   ", 10).is_empty());
        assert!(wrap_text("", 10).is_empty());
    }

    #[test]
    fn splits_oversized_words() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("hi abcdefghij", 4), vec!["hi", "abcd", "efgh", "ij"]);
    }
}
