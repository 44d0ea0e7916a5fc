use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

const ELLIPSIS: &str = "...";

/// SEC-001: Reduce feed-supplied text to a single printable line.
///
/// Feed titles and descriptions are remote input and end up on the operator's
/// terminal, so ANSI escape sequences (CSI and OSC) and C0/DEL control
/// characters are removed, and runs of whitespace (including newlines) collapse
/// to a single space.
///
/// Returns `Cow::Borrowed` when nothing needs changing.
pub fn sanitize_line(s: &str) -> Cow<'_, str> {
    let clean = !s.bytes().any(|b| b < 0x20 || b == 0x7f)
        && !s.contains("  ")
        && s.trim() == s;
    if clean {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                // CSI: parameters until a final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ST (ESC \)
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if c.is_control() {
            continue;
        }

        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    Cow::Owned(out)
}

/// Truncates a string to fit within `max_width` terminal columns.
///
/// Wide characters (CJK, emoji) count as two columns. When the text does not
/// fit, it is cut and `"..."` appended; widths of three or less get no ellipsis.
///
/// ```
/// use gator::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    let ellipsis_width = ELLIPSIS.len();
    let budget = if max_width > ellipsis_width {
        max_width - ellipsis_width
    } else {
        max_width
    };

    let mut width = 0;
    let mut cut = None;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if cut.is_none() && width + w > budget {
            cut = Some(idx);
        }
        width += w;
        if width > max_width {
            let end = cut.unwrap_or(idx);
            return if max_width > ellipsis_width {
                Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
            } else {
                Cow::Owned(s[..end].to_string())
            };
        }
    }

    Cow::Borrowed(s)
}
