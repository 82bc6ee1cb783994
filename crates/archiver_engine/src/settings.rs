use std::path::PathBuf;
use std::time::Duration;

use archiver_core::{OxylabsCredentials, ZenRowsCredentials, DEFAULT_CHALLENGE_MARKERS};

use crate::convert::MarkdownBackend;
use crate::embed::default_embedder_command;
use crate::evasion::DEFAULT_EVASION_TIMEOUT;
use crate::fetch::{FetchSettings, STEALTH_USER_AGENT};
use crate::frontmatter::FrontmatterSettings;
use crate::process::CommandSpec;

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Upper bound for one whole browser session (launch, navigate, settle).
    pub context_timeout: Duration,
    /// How long to wait for a challenge page to clear by itself.
    pub challenge_wait: Duration,
    pub challenge_poll_interval: Duration,
    /// Quiet period with no in-flight requests that counts as network idle.
    pub network_idle: Duration,
    /// Give up waiting for network idle after this long and read the DOM anyway.
    pub network_idle_timeout: Duration,
    pub user_agent: String,
    pub extensions: Vec<PathBuf>,
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
    /// Parent of the throwaway browser profiles; the system temp dir when unset.
    pub profile_root: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            context_timeout: Duration::from_secs(300),
            challenge_wait: Duration::from_secs(10),
            challenge_poll_interval: Duration::from_secs(1),
            network_idle: Duration::from_millis(500),
            network_idle_timeout: Duration::from_secs(30),
            user_agent: STEALTH_USER_AGENT.to_string(),
            extensions: Vec::new(),
            chrome_executable: None,
            headless: true,
            profile_root: None,
        }
    }
}

/// Command lines of the external collaborators.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub readability: CommandSpec,
    pub embedder: CommandSpec,
    pub pandoc: CommandSpec,
    pub timeout: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            readability: CommandSpec::new("node", ["index.mjs"]),
            embedder: default_embedder_command(),
            pandoc: CommandSpec::new("pandoc", Vec::<String>::new()),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownSettings {
    pub backend: MarkdownBackend,
    pub raw_html: bool,
    pub frontmatter: Option<FrontmatterSettings>,
}

impl Default for MarkdownSettings {
    fn default() -> Self {
        Self {
            backend: MarkdownBackend::Pandoc,
            raw_html: true,
            frontmatter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    /// Format names, validated when the pipeline is built.
    pub formats: Vec<String>,
    /// `None` keeps artifacts in memory only.
    pub output_dir: Option<PathBuf>,
    pub zenrows: Option<ZenRowsCredentials>,
    pub oxylabs: Option<OxylabsCredentials>,
    pub evasion_timeout: Duration,
    pub browser: BrowserSettings,
    pub fetch: FetchSettings,
    pub tools: ToolSettings,
    pub markdown: MarkdownSettings,
    pub block_markers: Vec<String>,
    pub concurrent_formats: bool,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            formats: vec!["html".to_string()],
            output_dir: None,
            zenrows: None,
            oxylabs: None,
            evasion_timeout: DEFAULT_EVASION_TIMEOUT,
            browser: BrowserSettings::default(),
            fetch: FetchSettings::default(),
            tools: ToolSettings::default(),
            markdown: MarkdownSettings::default(),
            block_markers: DEFAULT_CHALLENGE_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
            concurrent_formats: true,
        }
    }
}
