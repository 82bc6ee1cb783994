use crate::OutputFormat;

/// Longest sanitized title, in characters, before the ellipsis marker is appended.
pub const MAX_TITLE_CHARS: usize = 128;
pub const ELLIPSIS_MARKER: &str = "...";
const FALLBACK_NAME: &str = "untitled";

/// Turn an article title into a file-name stem that is safe on every platform.
///
/// Unsafe characters become `-`, whitespace runs collapse to one space, the ends
/// are trimmed, and an empty result becomes `untitled`. Titles longer than
/// [`MAX_TITLE_CHARS`] are cut and suffixed with [`ELLIPSIS_MARKER`].
pub fn sanitize_file_name(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if c.is_whitespace() {
                ' '
            } else if is_forbidden(c) {
                '-'
            } else {
                c
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for word in replaced.split_whitespace() {
        if !collapsed.is_empty() {
            collapsed.push(' ');
        }
        collapsed.push_str(word);
    }

    // Leading dots would hide the file on unix.
    let mut name = collapsed.trim_start_matches('.').trim().to_string();
    if name.is_empty() {
        name = FALLBACK_NAME.to_string();
    }

    if name.chars().count() > MAX_TITLE_CHARS {
        name = name.chars().take(MAX_TITLE_CHARS).collect::<String>();
        name = name.trim_end().to_string();
        name.push_str(ELLIPSIS_MARKER);
    }

    if is_reserved_windows_name(&name) {
        name.push('_');
    }
    name
}

/// `{sanitized title}.{extension}` for one output format.
pub fn output_file_name(title: &str, format: OutputFormat) -> String {
    format!("{}.{}", sanitize_file_name(title), format.extension())
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}' | '\u{7F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
