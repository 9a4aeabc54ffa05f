/// Clean extracted text before it reaches synthesis.
///
/// Strips control characters (keeping newlines and tabs), the U+FFFD
/// replacement character and soft hyphens, trims each line and collapses
/// runs of blank lines into one.
pub fn sanitize_extracted_text(raw: &str) -> String {
    let filtered: String = raw
        .replace("\r\n", "\n")
        .chars()
        .filter(|c| {
            !matches!(c, '\u{FFFD}' | '\u{00AD}' | '\u{FEFF}')
                && (!c.is_control() || matches!(c, '\n' | '\t'))
        })
        .collect();

    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = true;
    for line in filtered.lines().map(str::trim) {
        if line.is_empty() {
            if !previous_blank {
                out.push("");
            }
            previous_blank = true;
        } else {
            out.push(line);
            previous_blank = false;
        }
    }
    while out.last() == Some(&"") {
        out.pop();
    }
    out.join("\n")
}
