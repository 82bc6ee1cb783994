use std::sync::Arc;

use scraper::{Html, Selector};
use serde::Deserialize;

use crate::process::{CommandSpec, ProcessRunner};
use crate::{FailureKind, Metadata, PolishedContent, StageError};

/// Extracts the readable article and its metadata from a full page.
#[async_trait::async_trait]
pub trait Polisher: Send + Sync {
    async fn polish(&self, html: &str) -> Result<PolishedContent, StageError>;
}

#[derive(Debug, Deserialize)]
struct ReadabilityOutput {
    html: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// Runs a readability extractor that reads HTML on stdin and prints
/// `{"html": ..., "metadata": {...}}` on stdout.
pub struct ReadabilityPolisher {
    runner: Arc<dyn ProcessRunner>,
    command: CommandSpec,
}

impl ReadabilityPolisher {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: CommandSpec) -> Self {
        Self { runner, command }
    }
}

#[async_trait::async_trait]
impl Polisher for ReadabilityPolisher {
    async fn polish(&self, html: &str) -> Result<PolishedContent, StageError> {
        let output = self
            .runner
            .run(&self.command, &[], html.as_bytes())
            .await
            .map_err(|err| {
                StageError::new(
                    FailureKind::Polish,
                    format!("could not run `{}`: {err}", self.command.display()),
                )
            })?;
        if !output.success() {
            return Err(StageError::new(
                FailureKind::Polish,
                output.describe_failure(&self.command),
            ));
        }
        if !output.stderr.is_empty() {
            engine_logging::engine_warn!(
                "`{}` succeeded with stderr: {}",
                self.command.display(),
                output.stderr_text()
            );
        }

        let parsed: ReadabilityOutput = serde_json::from_slice(&output.stdout).map_err(|err| {
            StageError::new(
                FailureKind::Polish,
                format!("malformed readability output: {err}"),
            )
        })?;
        Ok(PolishedContent {
            html: parsed.html,
            metadata: parsed.metadata.unwrap_or_default(),
        })
    }
}

/// `<title>` text of a document, used when the extractor found no title.
pub fn document_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    doc.select(&selector)
        .next()
        .map(|node| node.text().collect::<String>())
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::document_title;

    #[test]
    fn title_is_whitespace_normalized() {
        let html = "<html><head><title>\n  Hello\n  world </title></head><body></body></html>";
        assert_eq!(document_title(html).as_deref(), Some("Hello world"));
    }

    #[test]
    fn missing_or_blank_title_is_none() {
        assert_eq!(document_title("<html><body><p>x</p></body></html>"), None);
        assert_eq!(document_title("<title>   </title>"), None);
    }
}
