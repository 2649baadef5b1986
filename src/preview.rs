use std::path::Path;

/// Line returned in place of a preview for binary content.
pub const BINARY_SENTINEL: &str = "[binary file]";

/// Bytes inspected for a null byte when sniffing binary content.
const BINARY_SNIFF_LEN: usize = 512;

const ELLIPSIS: &str = "...";

/// Reads `path` and returns its last `max_lines` non-blank lines.
///
/// Read failures yield `None`, as does a file without any non-blank line.
pub fn extract_preview<P: AsRef<Path>>(path: P, max_lines: usize, width: usize) -> Option<Vec<String>> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(data) => preview_from_bytes(&data, max_lines, width),
        Err(err) => {
            tracing::debug!("No preview for {}: {}", path.display(), err);
            None
        }
    }
}

pub fn preview_from_bytes(data: &[u8], max_lines: usize, width: usize) -> Option<Vec<String>> {
    if is_binary(data) {
        return Some(vec![BINARY_SENTINEL.to_string()]);
    }

    let text = String::from_utf8_lossy(data);
    let mut preview: Vec<String> = text
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .map(|line| truncate(line, width))
        .collect();

    if preview.is_empty() {
        return None;
    }
    preview.reverse();
    Some(preview)
}

fn is_binary(data: &[u8]) -> bool {
    data.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

/// Shortens `line` to at most `width` characters, ending in an ellipsis when cut.
fn truncate(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    let keep = width.saturating_sub(ELLIPSIS.len());
    let mut out: String = line.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
