//! Archiver core: pure domain rules shared by the engine and front-ends.
mod block;
mod error;
mod evasion;
mod filename;
mod format;
mod state;
mod update;

pub use block::{BlockDetector, DEFAULT_CHALLENGE_MARKERS};
pub use error::ConfigError;
pub use evasion::{EvasionConfig, OxylabsCredentials, ZenRowsCredentials};
pub use filename::{output_file_name, sanitize_file_name, ELLIPSIS_MARKER, MAX_TITLE_CHARS};
pub use format::{parse_formats, OutputFormat};
pub use state::{FormatProgress, RunState, Stage};
pub use update::{update, Msg};
