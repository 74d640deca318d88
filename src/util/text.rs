use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Ellipsis appended to truncated table cells
const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Returns the number of terminal columns `s` occupies.
///
/// CJK characters and emoji count as two columns, combining marks as zero.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncates `s` so it fits in `max_width` terminal columns.
///
/// Strings that already fit are returned borrowed. Longer strings are cut on a
/// character boundary and suffixed with `...`. Widths of three columns or less
/// have no room for the ellipsis, so as many characters as fit are returned.
///
/// # Examples
///
/// ```
/// use feedscout::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Example Feed", 20), "Example Feed");
/// assert_eq!(truncate_to_width("Example Feed", 10), "Example...");
/// assert_eq!(truncate_to_width("Feed", 2), "Fe");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    if max_width <= ELLIPSIS_WIDTH {
        let mut byte_end = 0;
        let mut used = 0;
        for (idx, c) in s.char_indices() {
            let w = UnicodeWidthChar::width(c).unwrap_or(0);
            if used + w > max_width {
                break;
            }
            used += w;
            byte_end = idx + c.len_utf8();
        }
        if byte_end == s.len() {
            return Cow::Borrowed(s);
        }
        return Cow::Owned(s[..byte_end].to_string());
    }

    let target_width = max_width - ELLIPSIS_WIDTH;
    let mut used = 0;
    let mut cut_point = None;

    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if cut_point.is_none() && used + w > target_width {
            cut_point = Some(idx);
        }
        if used + w > max_width {
            let cut = cut_point.unwrap_or(idx);
            return Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS));
        }
        used += w;
    }

    Cow::Borrowed(s)
}

/// SEC-001: Removes terminal control characters and ANSI escape sequences.
///
/// Feed titles come from remote documents and search services and end up
/// printed in the terminal, so CSI (`ESC [`), OSC (`ESC ]`, ended by BEL or
/// `ESC \`) and bare ESC sequences are dropped together with C0 controls and
/// DEL. Tab, newline and carriage return survive.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    fn is_control(b: u8) -> bool {
        b == 0x1b || b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
    }

    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| is_control(b)) {
        return Cow::Borrowed(s);
    }

    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        if b == 0x1b {
            match bytes.get(i + 1) {
                Some(b'[') => {
                    i += 2;
                    while i < len {
                        let c = bytes[i];
                        i += 1;
                        if (0x40..=0x7e).contains(&c) {
                            break;
                        }
                    }
                }
                Some(b']') => {
                    i += 2;
                    while i < len {
                        if bytes[i] == 0x07 {
                            i += 1;
                            break;
                        }
                        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        } else if is_control(b) {
            i += 1;
        } else {
            let start = i;
            i += 1;
            while i < len && !is_control(bytes[i]) {
                i += 1;
            }
            // Control bytes are ASCII, so they never split a code point.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}

/// Reduces a markup-bearing title to plain text.
///
/// Search services return titles such as `<b>Example</b> &amp; Co`. Tags are
/// removed, the five predefined XML entities are decoded, control characters
/// are stripped and runs of whitespace collapse to one space.
///
/// ```
/// use feedscout::util::strip_tags;
///
/// assert_eq!(strip_tags("<b>Rust</b> &amp; <i>Feeds</i>"), "Rust & Feeds");
/// ```
pub fn strip_tags(s: &str) -> String {
    let mut text = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    strip_control_chars(&decoded)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_fits() {
        assert_eq!(truncate_to_width("Short", 10), "Short");
        assert_eq!(truncate_to_width("12345", 5), "12345");
        assert!(matches!(truncate_to_width("Short", 10), Cow::Borrowed(_)));
    }

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_width("Testing", 4), "T...");
    }

    #[test]
    fn test_truncate_wide_chars() {
        // Each CJK char is two columns wide
        assert_eq!(truncate_to_width("日本語テスト", 7), "日本...");
        assert_eq!(truncate_to_width("日本", 10), "日本");
    }

    #[test]
    fn test_truncate_narrow_widths() {
        assert_eq!(truncate_to_width("Test", 0), "");
        assert_eq!(truncate_to_width("Test", 1), "T");
        assert_eq!(truncate_to_width("Test", 3), "Tes");
        assert_eq!(truncate_to_width("日本", 1), "");
        assert_eq!(truncate_to_width("日本", 3), "日");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("feed"), 4);
        assert_eq!(display_width("日本"), 4);
    }

    #[test]
    fn test_strip_clean_text_borrows() {
        let input = "Plain feed title";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_ansi_and_controls() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_control_chars("a\x00b\x07c\x7fd"), "abcd");
        assert_eq!(strip_control_chars("\x1b]0;title\x07rest"), "rest");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\rest"), "rest");
        assert_eq!(strip_control_chars("x\x1by"), "xy");
    }

    #[test]
    fn test_strip_keeps_whitespace_controls() {
        let input = "one\ttwo\r\nthree";
        assert_eq!(strip_control_chars(input), input);
    }

    #[test]
    fn test_strip_tags_removes_markup() {
        assert_eq!(strip_tags("<b>Example</b> Blog"), "Example Blog");
        assert_eq!(strip_tags("Line<br/>Break"), "Line Break");
        assert_eq!(strip_tags("no markup"), "no markup");
    }

    #[test]
    fn test_strip_tags_decodes_entities_once() {
        assert_eq!(strip_tags("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(strip_tags("&amp;lt;"), "&lt;");
        assert_eq!(strip_tags("&quot;quoted&quot;"), "\"quoted\"");
    }

    #[test]
    fn test_strip_tags_strips_escapes() {
        assert_eq!(strip_tags("Evil\x1b[31m Feed"), "Evil Feed");
    }

    #[test]
    fn test_strip_tags_empty() {
        assert_eq!(strip_tags(""), "");
        assert_eq!(strip_tags("<p></p>"), "");
    }
}
