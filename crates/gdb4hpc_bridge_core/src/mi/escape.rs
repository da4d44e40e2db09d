/// Decodes the backslash escapes gdb4hpc emits inside quoted MI strings.
///
/// Unknown escapes are kept verbatim, backslash included.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('v') => out.push('\u{0B}'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Human-facing form of a decoded value: line breaks become single spaces.
pub fn to_display(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}
