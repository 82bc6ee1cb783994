//! Archiver engine: rendering, external tools, persistence and the archive pipeline.
mod browser;
mod cache;
mod convert;
mod decode;
mod embed;
mod evasion;
mod fetch;
mod frontmatter;
mod navigation;
mod persist;
mod pipeline;
mod polish;
mod postprocess;
mod process;
mod progress;
mod settings;
mod types;

pub use browser::{ChromiumBrowser, PageRenderer, PdfPrinter};
pub use cache::{CacheKey, CacheStage, StageCache};
pub use convert::{
    pandoc_args, strip_lazy_loading, Html2MdConverter, MarkdownBackend, MarkdownConverter,
    PandocConverter,
};
pub use decode::{decode_body, DecodedBody};
pub use embed::{default_embedder_command, Embedder, MonolithEmbedder};
pub use evasion::{
    build_provider, EvasionProvider, EvasionResponse, OxylabsProvider, ZenRowsProvider,
    DEFAULT_EVASION_TIMEOUT, OXYLABS_ENDPOINT, ZENROWS_ENDPOINT,
};
pub use fetch::{DirectFetcher, FetchSettings, FetchedPage, STEALTH_USER_AGENT};
pub use frontmatter::{
    build_markdown_document, parse_key_mapping, FrontmatterSettings, DEFAULT_TIMESTAMP_FORMAT,
};
pub use navigation::{render_with_retry, Attempt, NavigationPlanner, NavigationResponse};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{ArchivePipeline, Collaborators};
pub use polish::{document_title, Polisher, ReadabilityPolisher};
pub use postprocess::post_process;
pub use process::{CapturedOutput, CommandSpec, ProcessRunner, TokioProcessRunner};
pub use progress::{NoopSink, ProgressSink};
pub use settings::{ArchiveSettings, BrowserSettings, MarkdownSettings, ToolSettings};
pub use types::{
    ArchiveError, ArchiveEvent, ArchiveResult, Artifact, ArtifactContent, EmbeddedHtml,
    FailureKind, HtmlVariant, Metadata, PolishedContent, RenderSource, RenderedHtml, StageError,
};
