use std::borrow::Cow;

/// Returns true for characters that may not appear in an XML 1.0 document.
///
/// Allowed: tab, newline, carriage return, U+0020..=U+D7FF,
/// U+E000..=U+FFFD and the supplementary planes. Surrogates cannot occur in
/// a Rust `char`, so only C0 controls and the two non-characters remain.
fn is_xml_illegal(c: char) -> bool {
    matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}'
    )
}

/// Strips characters that are illegal in XML 1.0 from scraped text.
///
/// Scraped titles and descriptions end up inside the generated feed; a single
/// stray form feed or NUL would make the whole document unparsable.
///
/// Preserves: tab (0x09), newline (0x0A), carriage return (0x0D).
///
/// Returns `Cow::Borrowed` when the input needs no changes (common case).
///
/// # Examples
///
/// ```
/// use feedscout::util::strip_control_chars;
///
/// assert_eq!(strip_control_chars("Breaking\x0c news"), "Breaking news");
/// assert_eq!(strip_control_chars("line\nbreak"), "line\nbreak");
/// ```
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    // Fast path: nothing to strip
    if !s.chars().any(is_xml_illegal) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|c| !is_xml_illegal(*c)).collect())
}

/// Collapses every run of whitespace into a single space and trims both ends.
///
/// Element text from rendered pages is full of indentation and line breaks
/// from the markup; feed titles should read as one line.
///
/// # Examples
///
/// ```
/// use feedscout::util::collapse_whitespace;
///
/// assert_eq!(collapse_whitespace("  Local\n\t  elections  "), "Local elections");
/// assert_eq!(collapse_whitespace("   "), "");
/// ```
pub fn collapse_whitespace(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim();

    let needs_collapse = trimmed
        .as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_whitespace() && w[1].is_ascii_whitespace())
        || trimmed.chars().any(|c| c.is_whitespace() && c != ' ');

    if !needs_collapse {
        return Cow::Borrowed(trimmed);
    }

    let mut out = String::with_capacity(trimmed.len());
    for word in trimmed.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    Cow::Owned(out)
}

/// Truncates a string to at most `max_chars` characters, never splitting a
/// code point. Appends an ellipsis when something was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(format!("{}…", &s[..idx])),
        None => Cow::Borrowed(s),
    }
}
