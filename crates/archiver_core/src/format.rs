use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// An archive output kind. Each variant knows its name and file extension;
/// the engine maps variants to processing steps in a single `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Readable article with resources inlined.
    Html,
    /// Whole rendered page with resources inlined, no readability pass.
    FullHtml,
    Markdown,
    Pdf,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Html,
        OutputFormat::FullHtml,
        OutputFormat::Markdown,
        OutputFormat::Pdf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::FullHtml => "full_html",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::FullHtml => "full.html",
            OutputFormat::Markdown => "md",
            OutputFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.name() == trimmed)
            .ok_or_else(|| ConfigError::UnsupportedFormat(trimmed.to_string()))
    }
}

/// Parse requested format names into an ordered set.
///
/// Order of first appearance is kept and duplicates are dropped. Any unknown
/// name rejects the whole list.
pub fn parse_formats<S: AsRef<str>>(names: &[S]) -> Result<Vec<OutputFormat>, ConfigError> {
    let mut formats = Vec::with_capacity(names.len());
    for name in names {
        let format = name.as_ref().parse::<OutputFormat>()?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if formats.is_empty() {
        return Err(ConfigError::EmptyFormatList);
    }
    Ok(formats)
}
