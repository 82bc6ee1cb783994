use std::sync::Arc;

use crate::process::{CommandSpec, ProcessRunner};
use crate::{EmbeddedHtml, FailureKind, HtmlVariant, StageError};

/// Inlines every external resource of a document into a single HTML file.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(
        &self,
        url: &str,
        html: &str,
        source: HtmlVariant,
    ) -> Result<EmbeddedHtml, StageError>;
}

/// Default single-file tool invocation: read stdin, isolate the document,
/// drop audio and video. The base URL is appended per call.
pub fn default_embedder_command() -> CommandSpec {
    CommandSpec::new("monolith", ["-", "-I", "-a", "-v"])
}

pub struct MonolithEmbedder {
    runner: Arc<dyn ProcessRunner>,
    command: CommandSpec,
}

impl MonolithEmbedder {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: CommandSpec) -> Self {
        Self { runner, command }
    }
}

#[async_trait::async_trait]
impl Embedder for MonolithEmbedder {
    async fn embed(
        &self,
        url: &str,
        html: &str,
        source: HtmlVariant,
    ) -> Result<EmbeddedHtml, StageError> {
        let base = vec!["-b".to_string(), url.to_string()];
        let output = self
            .runner
            .run(&self.command, &base, html.as_bytes())
            .await
            .map_err(|err| {
                StageError::new(
                    FailureKind::Embed,
                    format!("could not run `{}`: {err}", self.command.display()),
                )
            })?;
        if !output.success() {
            return Err(StageError::new(
                FailureKind::Embed,
                output.describe_failure(&self.command),
            ));
        }
        // Unreachable assets are reported on stderr; they are not fatal.
        if !output.stderr.is_empty() {
            engine_logging::engine_debug!(
                "embedder warnings for {} ({}): {}",
                url,
                source.label(),
                output.stderr_text()
            );
        }
        Ok(EmbeddedHtml {
            html: output.stdout_text(),
            source,
        })
    }
}
