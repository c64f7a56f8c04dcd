//! Log sanitizing for externally supplied identifiers and names.
//! Guild and user ids arrive from the chat platform as opaque strings;
//! escaping control characters keeps each log record on one line.

/// Escape a string for single-line logging and clip it to a short
/// preview. Newlines, carriage returns, and tabs become their escape
/// sequences; other control characters are rendered as `\xNN`.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 120;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_log;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("guild\n123\t"), "guild\\n123\\t");
    }

    #[test]
    fn clips_long_identifiers() {
        let long = "x".repeat(500);
        let escaped = escape_log(&long);
        assert!(escaped.ends_with('…'));
        assert!(escaped.chars().count() <= 121);
    }
}
