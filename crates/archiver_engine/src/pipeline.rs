//! The archive orchestrator.
//!
//! Rendering and polishing run once per URL and are shared by every format
//! through the stage cache. Each format is then produced independently: a
//! failing format is reported and left out of the result, it never aborts its
//! siblings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use archiver_core::{
    output_file_name, parse_formats, update, BlockDetector, ConfigError, EvasionConfig, Msg,
    OutputFormat, RunState, Stage,
};
use serde_json::Value;

use crate::browser::{ChromiumBrowser, PageRenderer, PdfPrinter};
use crate::cache::{CacheStage, StageCache};
use crate::convert::{Html2MdConverter, MarkdownBackend, MarkdownConverter, PandocConverter};
use crate::embed::{Embedder, MonolithEmbedder};
use crate::evasion::build_provider;
use crate::frontmatter::{build_markdown_document, FrontmatterSettings};
use crate::persist::{ensure_output_dir, AtomicFileWriter};
use crate::polish::{document_title, Polisher, ReadabilityPolisher};
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::progress::{NoopSink, ProgressSink};
use crate::settings::ArchiveSettings;
use crate::{
    ArchiveError, ArchiveEvent, ArchiveResult, Artifact, ArtifactContent, EmbeddedHtml,
    FailureKind, HtmlVariant, Metadata, PolishedContent, RenderedHtml, StageError,
};

/// The external collaborators a pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn PageRenderer>,
    pub pdf: Arc<dyn PdfPrinter>,
    pub polisher: Arc<dyn Polisher>,
    pub embedder: Arc<dyn Embedder>,
    pub converter: Arc<dyn MarkdownConverter>,
}

pub struct ArchivePipeline {
    formats: Vec<OutputFormat>,
    parts: Collaborators,
    cache: Arc<StageCache>,
    writer: Option<AtomicFileWriter>,
    frontmatter: Option<FrontmatterSettings>,
    concurrent: bool,
    progress: Arc<dyn ProgressSink>,
}

impl ArchivePipeline {
    /// Build the production pipeline. Bad format names and conflicting
    /// evasion credentials are rejected here, before any network activity.
    pub fn new(settings: ArchiveSettings) -> Result<Self, ArchiveError> {
        let formats = parse_formats(settings.formats.as_slice())?;
        let evasion = EvasionConfig::from_credentials(settings.zenrows, settings.oxylabs)?;
        if let Some(name) = evasion.provider_name() {
            engine_logging::engine_info!("evasion provider configured: {}", name);
        }

        let cache = Arc::new(StageCache::new());
        let provider = build_provider(&evasion, settings.evasion_timeout)?;
        let browser = Arc::new(ChromiumBrowser::new(
            settings.browser,
            settings.fetch,
            BlockDetector::with_markers(settings.block_markers),
            provider,
            cache.clone(),
        ));

        let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new(settings.tools.timeout));
        let converter: Arc<dyn MarkdownConverter> = match settings.markdown.backend {
            MarkdownBackend::Pandoc => Arc::new(PandocConverter::new(
                runner.clone(),
                settings.tools.pandoc,
                settings.markdown.raw_html,
            )),
            MarkdownBackend::Builtin => Arc::new(Html2MdConverter),
        };
        let parts = Collaborators {
            renderer: browser.clone(),
            pdf: browser,
            polisher: Arc::new(ReadabilityPolisher::new(runner.clone(), settings.tools.readability)),
            embedder: Arc::new(MonolithEmbedder::new(runner, settings.tools.embedder)),
            converter,
        };

        let mut pipeline = Self::assemble(formats, parts, cache)
            .with_frontmatter(settings.markdown.frontmatter)
            .with_concurrency(settings.concurrent_formats);
        if let Some(dir) = settings.output_dir {
            pipeline = pipeline.with_output_dir(dir);
        }
        Ok(pipeline)
    }

    /// Build a pipeline around caller-supplied collaborators.
    pub fn from_parts<S: AsRef<str>>(
        formats: &[S],
        parts: Collaborators,
    ) -> Result<Self, ConfigError> {
        let formats = parse_formats(formats)?;
        Ok(Self::assemble(formats, parts, Arc::new(StageCache::new())))
    }

    fn assemble(formats: Vec<OutputFormat>, parts: Collaborators, cache: Arc<StageCache>) -> Self {
        Self {
            formats,
            parts,
            cache,
            writer: None,
            frontmatter: None,
            concurrent: true,
            progress: Arc::new(NoopSink),
        }
    }

    /// Persist artifacts under `dir`. Without it, artifacts stay in memory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.writer = Some(AtomicFileWriter::new(dir.into()));
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_frontmatter(mut self, frontmatter: Option<FrontmatterSettings>) -> Self {
        self.frontmatter = frontmatter;
        self
    }

    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn formats(&self) -> &[OutputFormat] {
        &self.formats
    }

    pub fn cache(&self) -> &StageCache {
        &self.cache
    }

    pub async fn archive(&self, url: &str) -> Result<ArchiveResult, ArchiveError> {
        if let Some(writer) = &self.writer {
            ensure_output_dir(writer.dir())?;
        }
        let reporter = Reporter::new(&self.formats, self.progress.as_ref());

        let shared = async {
            let rendered = self.render(url, &reporter).await?;
            let polished = self.polish(url, &reporter).await?;
            Ok::<_, StageError>((rendered, polished))
        };
        let (rendered, polished) = match shared.await {
            Ok(shared) => shared,
            Err(err) => {
                engine_logging::engine_error!("archiving {} failed: {}", url, err);
                reporter.run_failed();
                return Err(err.into());
            }
        };

        let metadata = merge_metadata(&polished.metadata, &rendered.html, url);
        let title = metadata
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(url)
            .to_string();

        let jobs = self
            .formats
            .iter()
            .map(|&format| self.produce(format, url, &metadata, &reporter));
        let outcomes: Vec<Result<ArtifactContent, StageError>> = if self.concurrent {
            futures_util::future::join_all(jobs).await
        } else {
            let mut outcomes = Vec::with_capacity(self.formats.len());
            for job in jobs {
                outcomes.push(job.await);
            }
            outcomes
        };

        let mut files = BTreeMap::new();
        for (&format, outcome) in self.formats.iter().zip(outcomes) {
            let stored = outcome
                .and_then(|content| {
                    if content.is_empty() {
                        Err(StageError::new(
                            FailureKind::EmptyContent,
                            format!("{format} produced no content"),
                        ))
                    } else {
                        Ok(content)
                    }
                })
                .and_then(|content| self.store(format, &title, content, &reporter));
            match stored {
                Ok(artifact) => {
                    reporter.format_done(format, &artifact);
                    files.insert(format, artifact);
                }
                Err(err) => reporter.format_failed(format, &err),
            }
        }

        let state = reporter.finish();
        Ok(ArchiveResult {
            metadata,
            files,
            failures: state.failures(),
        })
    }

    async fn produce(
        &self,
        format: OutputFormat,
        url: &str,
        metadata: &Metadata,
        reporter: &Reporter<'_>,
    ) -> Result<ArtifactContent, StageError> {
        match format {
            OutputFormat::Html => {
                let polished = self.polish(url, reporter).await?;
                let embedded = self
                    .embed(url, &polished.html, HtmlVariant::Polished, format, reporter)
                    .await?;
                Ok(ArtifactContent::Text(embedded.html))
            }
            OutputFormat::FullHtml => {
                let embedded = self.full_html(url, format, reporter).await?;
                Ok(ArtifactContent::Text(embedded.html))
            }
            OutputFormat::Markdown => {
                let markdown = self.markdown(url, reporter).await?;
                match &self.frontmatter {
                    Some(settings) => Ok(ArtifactContent::Text(build_markdown_document(
                        metadata,
                        settings,
                        chrono::Local::now(),
                        &markdown,
                    )?)),
                    None => Ok(ArtifactContent::Text(markdown)),
                }
            }
            OutputFormat::Pdf => {
                let embedded = self.full_html(url, format, reporter).await?;
                reporter.emit(ArchiveEvent::format(
                    format,
                    Stage::Converting,
                    "Rendering PDF from embedded full HTML",
                ));
                let printer = &self.parts.pdf;
                let pdf = self
                    .cache
                    .get_or_compute(CacheStage::Pdf, &[&embedded.html], || async {
                        printer.print_pdf(&embedded.html).await
                    })
                    .await?;
                Ok(ArtifactContent::Binary(pdf))
            }
        }
    }

    /// Embedded polished HTML, then the polished HTML, then the rendered HTML.
    /// The first variant that converts to non-empty Markdown wins.
    async fn markdown(&self, url: &str, reporter: &Reporter<'_>) -> Result<String, StageError> {
        let format = OutputFormat::Markdown;
        let rendered = self.render(url, reporter).await?;
        let polished = self.polish(url, reporter).await?;

        let embedded = match self
            .embed(url, &polished.html, HtmlVariant::Polished, format, reporter)
            .await
        {
            Ok(embedded) => Some(embedded),
            Err(err) => {
                engine_logging::engine_error!("embedding polished HTML of {} failed: {}", url, err);
                None
            }
        };

        let mut candidates: Vec<(HtmlVariant, &str)> = Vec::with_capacity(3);
        if let Some(embedded) = &embedded {
            candidates.push((embedded.source.embedded(), embedded.html.as_str()));
        }
        candidates.push((HtmlVariant::Polished, polished.html.as_str()));
        candidates.push((HtmlVariant::Rendered, rendered.html.as_str()));

        for (variant, html) in candidates {
            reporter.emit(ArchiveEvent::format(
                format,
                Stage::Converting,
                format!("Converting {} to Markdown", variant.label()),
            ));
            let converter = &self.parts.converter;
            let outcome = self
                .cache
                .get_or_compute(CacheStage::Markdown, &[html, variant.key()], || async {
                    converter.to_markdown(html).await
                })
                .await;
            match outcome {
                Ok(markdown) if !markdown.trim().is_empty() => return Ok(markdown),
                Ok(_) => engine_logging::engine_error!(
                    "{} of {} converted to empty Markdown",
                    variant.label(),
                    url
                ),
                Err(err) => engine_logging::engine_error!(
                    "converting {} of {} to Markdown failed: {}",
                    variant.label(),
                    url,
                    err
                ),
            }
        }
        Err(StageError::new(
            FailureKind::Convert,
            "no HTML variant could be converted to Markdown",
        ))
    }

    async fn full_html(
        &self,
        url: &str,
        format: OutputFormat,
        reporter: &Reporter<'_>,
    ) -> Result<EmbeddedHtml, StageError> {
        let rendered = self.render(url, reporter).await?;
        self.embed(url, &rendered.html, HtmlVariant::Rendered, format, reporter)
            .await
    }

    async fn render(&self, url: &str, reporter: &Reporter<'_>) -> Result<RenderedHtml, StageError> {
        let renderer = self.parts.renderer.clone();
        self.cache
            .get_or_compute(CacheStage::Render, &[url], || async move {
                renderer.render(url, reporter).await
            })
            .await
    }

    async fn polish(&self, url: &str, reporter: &Reporter<'_>) -> Result<PolishedContent, StageError> {
        let rendered = self.render(url, reporter).await?;
        let polisher = &self.parts.polisher;
        self.cache
            .get_or_compute(CacheStage::Polish, &[&rendered.html], || async {
                reporter.emit(ArchiveEvent::run(Stage::Polishing, "Polishing HTML"));
                let polished = polisher.polish(&rendered.html).await?;
                reporter.emit(ArchiveEvent::run(Stage::Polished, "Extracted article"));
                Ok(polished)
            })
            .await
    }

    async fn embed(
        &self,
        url: &str,
        html: &str,
        variant: HtmlVariant,
        format: OutputFormat,
        reporter: &Reporter<'_>,
    ) -> Result<EmbeddedHtml, StageError> {
        let embedder = self.parts.embedder.clone();
        self.cache
            .get_or_compute(CacheStage::Embed, &[url, html, variant.key()], || async move {
                reporter.emit(ArchiveEvent::format(
                    format,
                    Stage::Embedding,
                    format!("Embedding resources of {}", variant.label()),
                ));
                embedder.embed(url, html, variant).await
            })
            .await
    }

    fn store(
        &self,
        format: OutputFormat,
        title: &str,
        content: ArtifactContent,
        reporter: &Reporter<'_>,
    ) -> Result<Artifact, StageError> {
        let Some(writer) = &self.writer else {
            return Ok(Artifact {
                content,
                path: None,
            });
        };
        let name = output_file_name(title, format);
        reporter.emit(ArchiveEvent::format(
            format,
            Stage::Writing,
            format!("Writing {name}"),
        ));
        let path = writer
            .write(&name, content.as_bytes())
            .map_err(|err| StageError::new(FailureKind::Persist, err.to_string()))?;
        Ok(Artifact {
            content,
            path: Some(path),
        })
    }
}

/// Readability metadata plus `url`, with a `title` that is never missing.
fn merge_metadata(polished: &Metadata, rendered_html: &str, url: &str) -> Metadata {
    let mut metadata = polished.clone();
    let has_title = metadata
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|title| !title.trim().is_empty());
    if !has_title {
        let title = document_title(rendered_html).unwrap_or_else(|| url.to_string());
        metadata.insert("title".to_string(), Value::String(title));
    }
    metadata.insert("url".to_string(), Value::String(url.to_string()));
    metadata
}

/// Folds progress events into the run state and forwards them to the caller's sink.
struct Reporter<'a> {
    state: Mutex<RunState>,
    sink: &'a dyn ProgressSink,
}

impl<'a> Reporter<'a> {
    fn new(formats: &[OutputFormat], sink: &'a dyn ProgressSink) -> Self {
        Self {
            state: Mutex::new(RunState::new(formats)),
            sink,
        }
    }

    fn apply(&self, msg: Msg) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = std::mem::take(&mut *state);
        *state = update(current, msg);
    }

    fn format_done(&self, format: OutputFormat, artifact: &Artifact) {
        self.apply(Msg::FormatDone { format });
        let message = match &artifact.path {
            Some(path) => format!("Saved {format} to {}", path.display()),
            None => format!("Produced {format}"),
        };
        engine_logging::engine_info!("{}", message);
        self.sink
            .emit(ArchiveEvent::format(format, Stage::Done, message));
    }

    fn format_failed(&self, format: OutputFormat, err: &StageError) {
        let reason = err.to_string();
        engine_logging::engine_warn!("{} failed: {}", format, reason);
        self.apply(Msg::FormatFailed {
            format,
            reason: reason.clone(),
        });
        self.sink.emit(ArchiveEvent::format(
            format,
            Stage::Failed,
            format!("Failed to produce {format}: {reason}"),
        ));
    }

    fn run_failed(&self) {
        self.apply(Msg::RunFailed);
    }

    fn finish(self) -> RunState {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for Reporter<'_> {
    fn emit(&self, event: ArchiveEvent) {
        match event.format {
            Some(format) => self.apply(Msg::Format {
                format,
                stage: event.stage,
            }),
            None => self.apply(Msg::Run(event.stage)),
        }
        engine_logging::engine_info!("{}", event.message);
        self.sink.emit(event);
    }
}
