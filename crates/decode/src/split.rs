//! Splitting of YAML streams on document boundaries.

const SEPARATOR: &str = "---";

/// Split a multi-document YAML stream into raw segments. Never fails; segments may be
/// empty or unparseable and are judged later, one by one.
///
/// A line consisting of `---`, or `---` followed by whitespace and then inline content or
/// a comment, starts a new document; a `...` line ends the current one. `---` glued to
/// other text (`---x`) is an ordinary scalar line.
pub fn split(text: &str) -> Vec<&str> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == SEPARATOR || trimmed == "..." {
            out.push(&text[start..offset]);
            start = offset + line.len();
        } else if let Some(rest) = marker_tail(line) {
            out.push(&text[start..offset]);
            let inline = rest.trim_start();
            start = if inline.starts_with('#') {
                offset + line.len()
            } else {
                // keep inline content after the marker
                offset + line.len() - inline.len()
            };
        }
        offset += line.len();
    }
    out.push(&text[start..]);
    out
}

/// Text after a `---` marker that is followed by whitespace.
fn marker_tail(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(SEPARATOR)?;
    rest.starts_with([' ', '\t']).then_some(rest)
}

/// Join documents into one stream, the inverse of [`split`] for well-formed documents.
pub fn join<I, S>(docs: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, d) in docs.into_iter().enumerate() {
        if i > 0 {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(SEPARATOR);
            out.push('\n');
        }
        out.push_str(d.as_ref());
    }
    out
}
