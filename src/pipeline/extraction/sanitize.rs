/// Upper bound on persisted text, in bytes.
pub const MAX_TEXT_BYTES: usize = 512 * 1024;

pub const TRUNCATION_MARKER: &str = "[Text truncated]";

/// Sanitize extracted text before persistence.
/// Strips NUL and control characters (newlines and tabs survive), trims
/// trailing whitespace per line, collapses blank-line runs and caps the
/// result at [`MAX_TEXT_BYTES`].
pub fn sanitize_extracted_text(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .map(|c| if c == '\r' { '\n' } else { c })
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();

    let mut out = String::with_capacity(filtered.len().min(MAX_TEXT_BYTES));
    let mut blank_run = 0;
    for line in filtered.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);

    cap_text(out)
}

/// Cut at a char boundary and append the marker when over the cap.
fn cap_text(mut text: String) -> String {
    if text.len() <= MAX_TEXT_BYTES {
        return text;
    }
    let budget = MAX_TEXT_BYTES - TRUNCATION_MARKER.len() - 1;
    let mut cut = budget;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push('\n');
    text.push_str(TRUNCATION_MARKER);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_null_and_control_bytes() {
        let clean = sanitize_extracted_text("Invoice\x00 42\x01\x02\x03\nDue: 2024-01-15");
        assert_eq!(clean, "Invoice 42\nDue: 2024-01-15");
    }

    #[test]
    fn keeps_tabs_for_table_detection() {
        assert_eq!(sanitize_extracted_text("a\tb\tc"), "a\tb\tc");
    }

    #[test]
    fn collapses_blank_runs() {
        let clean = sanitize_extracted_text("\n\nLine one\n\n\n\nLine two\r\n\r\nLine three\n\n");
        assert_eq!(clean, "Line one\n\nLine two\n\nLine three");
    }

    #[test]
    fn preserves_unicode_punctuation() {
        let raw = "Coût: 15,50€ «total» 37.5°C";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn caps_large_text_with_marker() {
        let raw = "é".repeat(MAX_TEXT_BYTES);
        let clean = sanitize_extracted_text(&raw);
        assert!(clean.len() <= MAX_TEXT_BYTES);
        assert!(clean.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn empty_and_control_only() {
        assert_eq!(sanitize_extracted_text(""), "");
        assert_eq!(sanitize_extracted_text("\x00\x01\x02"), "");
    }
}
