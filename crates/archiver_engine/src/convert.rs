use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::process::{CommandSpec, ProcessRunner};
use crate::{FailureKind, StageError};

#[async_trait::async_trait]
pub trait MarkdownConverter: Send + Sync {
    async fn to_markdown(&self, html: &str) -> Result<String, StageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkdownBackend {
    /// External document converter (pandoc).
    #[default]
    Pandoc,
    /// In-process html2md; lower fidelity, no external dependency.
    Builtin,
}

/// GitHub-flavored Markdown, no line wrapping. `raw_html` keeps inline HTML
/// the Markdown dialect cannot express.
pub fn pandoc_args(raw_html: bool) -> Vec<String> {
    let target = if raw_html { "gfm+raw_html" } else { "gfm-raw_html" };
    ["-f", "html", "-t", target, "--wrap=none"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub struct PandocConverter {
    runner: Arc<dyn ProcessRunner>,
    command: CommandSpec,
    raw_html: bool,
}

impl PandocConverter {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: CommandSpec, raw_html: bool) -> Self {
        Self {
            runner,
            command,
            raw_html,
        }
    }
}

#[async_trait::async_trait]
impl MarkdownConverter for PandocConverter {
    async fn to_markdown(&self, html: &str) -> Result<String, StageError> {
        let output = self
            .runner
            .run(&self.command, &pandoc_args(self.raw_html), html.as_bytes())
            .await
            .map_err(|err| {
                StageError::new(
                    FailureKind::Convert,
                    format!("could not run `{}`: {err}", self.command.display()),
                )
            })?;
        if !output.success() {
            return Err(StageError::new(
                FailureKind::Convert,
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
        Ok(output.stdout_text())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Html2MdConverter;

#[async_trait::async_trait]
impl MarkdownConverter for Html2MdConverter {
    async fn to_markdown(&self, html: &str) -> Result<String, StageError> {
        Ok(html2md::parse_html(html).trim().to_string())
    }
}

fn lazy_loading_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?i)(<img\b[^>]*?)\s+loading\s*=\s*(?:"lazy"|'lazy'|lazy\b)"#).ok()
        })
        .as_ref()
}

/// Drop `loading="lazy"` from `<img>` tags. The PDF printer never scrolls, so
/// lazy images would otherwise stay blank.
pub fn strip_lazy_loading(html: &str) -> Result<String, StageError> {
    let pattern = lazy_loading_pattern()
        .ok_or_else(|| StageError::new(FailureKind::Internal, "invalid lazy-loading pattern"))?;
    Ok(pattern.replace_all(html, "$1").into_owned())
}
