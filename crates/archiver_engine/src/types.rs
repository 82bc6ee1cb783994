use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use archiver_core::{ConfigError, OutputFormat, Stage};
use base64::Engine as _;
use serde_json::{json, Value};

use crate::persist::PersistError;

/// Free-form article metadata (`title`, `byline`, `siteName`, ...) plus `url`.
pub type Metadata = serde_json::Map<String, Value>;

/// How the top-level document reached the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderSource {
    Direct,
    Evasion { provider: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHtml {
    pub html: String,
    pub status: u16,
    pub source: RenderSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolishedContent {
    pub html: String,
    pub metadata: Metadata,
}

/// Which HTML a downstream stage was fed. Used for progress text and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HtmlVariant {
    Rendered,
    Polished,
    EmbeddedPolished,
    EmbeddedRendered,
}

impl HtmlVariant {
    pub fn key(self) -> &'static str {
        match self {
            HtmlVariant::Rendered => "rendered",
            HtmlVariant::Polished => "polished",
            HtmlVariant::EmbeddedPolished => "embedded-polished",
            HtmlVariant::EmbeddedRendered => "embedded-rendered",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HtmlVariant::Rendered => "rendered HTML",
            HtmlVariant::Polished => "polished HTML",
            HtmlVariant::EmbeddedPolished => "embedded HTML",
            HtmlVariant::EmbeddedRendered => "embedded full HTML",
        }
    }

    /// The variant produced by embedding resources of `self`.
    pub fn embedded(self) -> HtmlVariant {
        match self {
            HtmlVariant::Polished | HtmlVariant::EmbeddedPolished => HtmlVariant::EmbeddedPolished,
            HtmlVariant::Rendered | HtmlVariant::EmbeddedRendered => HtmlVariant::EmbeddedRendered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedHtml {
    pub html: String,
    /// The variant the resources were inlined into.
    pub source: HtmlVariant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Text(String),
    Binary(Vec<u8>),
}

impl ArtifactContent {
    pub fn is_empty(&self) -> bool {
        match self {
            ArtifactContent::Text(text) => text.trim().is_empty(),
            ArtifactContent::Binary(bytes) => bytes.is_empty(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ArtifactContent::Text(text) => text.as_bytes(),
            ArtifactContent::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub content: ArtifactContent,
    /// Set when the artifact was written to the output directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveResult {
    pub metadata: Metadata,
    /// Only formats that produced non-empty content.
    pub files: BTreeMap<OutputFormat, Artifact>,
    /// Formats that failed, with the reason reported to the progress sink.
    pub failures: Vec<(OutputFormat, String)>,
}

impl ArchiveResult {
    /// `{metadata, files}` where each file is its path, or the inline content
    /// (base64 for binary) when nothing was persisted.
    pub fn to_json(&self) -> Value {
        let files: serde_json::Map<String, Value> = self
            .files
            .iter()
            .map(|(format, artifact)| {
                let value = match (&artifact.path, &artifact.content) {
                    (Some(path), _) => Value::String(path.display().to_string()),
                    (None, ArtifactContent::Text(text)) => Value::String(text.clone()),
                    (None, ArtifactContent::Binary(bytes)) => {
                        Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
                    }
                };
                (format.name().to_string(), value)
            })
            .collect();
        json!({
            "metadata": Value::Object(self.metadata.clone()),
            "files": Value::Object(files),
        })
    }

    pub fn title(&self) -> &str {
        self.metadata
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// One human-readable progress step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEvent {
    pub stage: Stage,
    pub format: Option<OutputFormat>,
    pub message: String,
}

impl ArchiveEvent {
    pub fn run(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            format: None,
            message: message.into(),
        }
    }

    pub fn format(format: OutputFormat, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            format: Some(format),
            message: message.into(),
        }
    }
}

impl fmt::Display for ArchiveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Blocked,
    EmptyContent,
    Timeout,
    Network,
    Browser,
    Evasion,
    Polish,
    Embed,
    Convert,
    Persist,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Blocked => write!(f, "blocked by anti-bot challenge"),
            FailureKind::EmptyContent => write!(f, "empty content"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Browser => write!(f, "browser error"),
            FailureKind::Evasion => write!(f, "evasion provider error"),
            FailureKind::Polish => write!(f, "polish error"),
            FailureKind::Embed => write!(f, "embed error"),
            FailureKind::Convert => write!(f, "conversion error"),
            FailureKind::Persist => write!(f, "persist error"),
            FailureKind::Internal => write!(f, "internal error"),
        }
    }
}

/// A stage failure. `Clone` so the stage cache can replay it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StageError {
    pub kind: FailureKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}
