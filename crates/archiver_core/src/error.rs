use thiserror::Error;

/// Construction-time configuration failures. These abort before any I/O.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported output format `{0}` (expected one of html, full_html, markdown, pdf)")]
    UnsupportedFormat(String),
    #[error("no output formats requested")]
    EmptyFormatList,
    #[error("zenrows and oxylabs evasion providers are mutually exclusive")]
    ConflictingEvasionProviders,
    #[error("invalid evasion credential: {0}")]
    InvalidCredential(String),
}
