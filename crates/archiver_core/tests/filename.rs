use archiver_core::{
    output_file_name, sanitize_file_name, OutputFormat, ELLIPSIS_MARKER, MAX_TITLE_CHARS,
};
use pretty_assertions::assert_eq;

#[test]
fn unsafe_characters_become_dashes() {
    assert_eq!(sanitize_file_name("My: Title?/Bad"), "My- Title--Bad");
}

#[test]
fn whitespace_is_collapsed_and_trimmed() {
    assert_eq!(sanitize_file_name("  Hello \t\n  world  "), "Hello world");
}

#[test]
fn empty_or_blank_titles_become_untitled() {
    assert_eq!(sanitize_file_name(""), "untitled");
    assert_eq!(sanitize_file_name("   \n "), "untitled");
    assert_eq!(sanitize_file_name("..."), "untitled");
}

#[test]
fn all_invalid_characters_still_produce_a_safe_name() {
    let name = sanitize_file_name("\\/:*?\"<>|");
    assert!(!name.is_empty());
    assert!(name.chars().all(|c| c == '-'));
}

#[test]
fn long_titles_are_truncated_with_marker() {
    let title = "a".repeat(MAX_TITLE_CHARS + 40);
    let name = sanitize_file_name(&title);
    assert!(name.ends_with(ELLIPSIS_MARKER));
    assert_eq!(name.chars().count(), MAX_TITLE_CHARS + ELLIPSIS_MARKER.len());
}

#[test]
fn truncation_counts_characters_not_bytes() {
    let title = "é".repeat(MAX_TITLE_CHARS + 1);
    let name = sanitize_file_name(&title);
    assert_eq!(
        name.chars().count(),
        MAX_TITLE_CHARS + ELLIPSIS_MARKER.chars().count()
    );
}

#[test]
fn title_at_limit_is_kept_whole() {
    let title = "b".repeat(MAX_TITLE_CHARS);
    assert_eq!(sanitize_file_name(&title), title);
}

#[test]
fn sanitizer_is_total_over_awkward_inputs() {
    let inputs = [
        "",
        "\0\u{1}\u{1f}",
        "CON",
        "..hidden",
        "emoji 🚀 title",
        "tab\tseparated",
    ];
    for input in inputs {
        let name = sanitize_file_name(input);
        assert!(!name.is_empty(), "empty name for {input:?}");
        assert!(
            name.chars().count() <= MAX_TITLE_CHARS + ELLIPSIS_MARKER.len(),
            "too long for {input:?}"
        );
        assert!(
            !name
                .chars()
                .any(|c| matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
                    || c.is_control()),
            "unsafe character in {name:?}"
        );
    }
}

#[test]
fn reserved_windows_names_are_patched() {
    assert_eq!(sanitize_file_name("con"), "con_");
}

#[test]
fn output_names_use_format_extensions() {
    assert_eq!(output_file_name("Post", OutputFormat::Html), "Post.html");
    assert_eq!(output_file_name("Post", OutputFormat::FullHtml), "Post.full.html");
    assert_eq!(output_file_name("Post", OutputFormat::Markdown), "Post.md");
    assert_eq!(output_file_name("Post", OutputFormat::Pdf), "Post.pdf");
}
