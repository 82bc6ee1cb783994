//! RON configuration file and its overlay with command-line flags.
//!
//! Every field is optional; whatever the file leaves out keeps the engine default,
//! and whatever the command line sets wins over the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use archiver_core::{OxylabsCredentials, ZenRowsCredentials};
use archiver_engine::{
    parse_key_mapping, ArchiveSettings, CommandSpec, FrontmatterSettings, MarkdownBackend,
};
use engine_logging::engine_info;
use ron::extensions::Extensions;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

pub const DEFAULT_CONFIG_FILE: &str = "archiver.ron";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub formats: Option<Vec<String>>,
    pub output_dir: Option<PathBuf>,
    pub zenrows: Option<ZenRowsCredentials>,
    pub oxylabs: Option<OxylabsCredentials>,
    pub evasion_timeout_secs: Option<u64>,
    pub browser: BrowserConfig,
    pub tools: ToolConfig,
    pub markdown: MarkdownConfig,
    pub block_markers: Option<Vec<String>>,
    pub concurrent_formats: Option<bool>,
    pub post_process: Option<CommandSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub context_timeout_secs: Option<u64>,
    pub challenge_wait_secs: Option<u64>,
    pub network_idle_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub extensions: Vec<PathBuf>,
    pub chrome_executable: Option<PathBuf>,
    pub headless: Option<bool>,
    pub profile_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub readability: Option<CommandSpec>,
    pub embedder: Option<CommandSpec>,
    pub pandoc: Option<CommandSpec>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    pub backend: Option<MarkdownBackend>,
    pub raw_html: Option<bool>,
    pub frontmatter: Option<FrontmatterSettings>,
}

/// Read `explicit`, or `./archiver.ron` when it exists. An explicit path must exist.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.is_file() {
                return Ok(FileConfig::default());
            }
            fallback
        }
    };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("invalid config file {}", path.display()))?;
    engine_info!("Loaded configuration from {:?}", path);
    Ok(config)
}

pub fn parse(text: &str) -> anyhow::Result<FileConfig> {
    ron::Options::default()
        .with_default_extension(Extensions::IMPLICIT_SOME)
        .from_str(text)
        .map_err(|err| anyhow!("{err}"))
}

/// Engine settings from the file, overlaid with the command line.
pub fn resolve(file: FileConfig, cli: &Cli) -> anyhow::Result<ArchiveSettings> {
    let mut settings = ArchiveSettings::default();

    if let Some(formats) = file.formats {
        settings.formats = formats;
    }
    if !cli.formats.is_empty() {
        settings.formats = cli.formats.clone();
    }
    settings.output_dir = cli.output_dir.clone().or(file.output_dir);

    settings.zenrows = cli
        .zenrows_api_key
        .clone()
        .map(|api_key| ZenRowsCredentials { api_key })
        .or(file.zenrows);
    settings.oxylabs = match (&cli.oxylabs_username, &cli.oxylabs_password) {
        (Some(username), Some(password)) => Some(OxylabsCredentials {
            username: username.clone(),
            password: password.clone(),
        }),
        (None, None) => file.oxylabs,
        _ => return Err(anyhow!("oxylabs needs both a username and a password")),
    };
    if let Some(secs) = file.evasion_timeout_secs {
        settings.evasion_timeout = Duration::from_secs(secs);
    }

    let browser = &mut settings.browser;
    if let Some(secs) = file.browser.context_timeout_secs {
        browser.context_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.browser.challenge_wait_secs {
        browser.challenge_wait = Duration::from_secs(secs);
    }
    if let Some(ms) = file.browser.network_idle_ms {
        browser.network_idle = Duration::from_millis(ms);
    }
    if let Some(user_agent) = file.browser.user_agent {
        settings.fetch.user_agent = user_agent.clone();
        browser.user_agent = user_agent;
    }
    browser.extensions = file.browser.extensions;
    browser.extensions.extend(cli.extensions.iter().cloned());
    browser.chrome_executable = cli.chrome.clone().or(file.browser.chrome_executable);
    if let Some(headless) = file.browser.headless {
        browser.headless = headless;
    }
    if cli.headful {
        browser.headless = false;
    }
    browser.profile_root = file.browser.profile_root;

    let tools = &mut settings.tools;
    if let Some(command) = file.tools.readability {
        tools.readability = command;
    }
    if let Some(command) = file.tools.embedder {
        tools.embedder = command;
    }
    if let Some(command) = file.tools.pandoc {
        tools.pandoc = command;
    }
    if let Some(secs) = file.tools.timeout_secs {
        tools.timeout = Duration::from_secs(secs);
    }

    let markdown = &mut settings.markdown;
    if let Some(backend) = cli
        .markdown_backend
        .map(MarkdownBackend::from)
        .or(file.markdown.backend)
    {
        markdown.backend = backend;
    }
    if let Some(raw_html) = file.markdown.raw_html {
        markdown.raw_html = raw_html;
    }
    if cli.no_raw_html {
        markdown.raw_html = false;
    }
    markdown.frontmatter = file.markdown.frontmatter;
    if cli.frontmatter {
        let mut frontmatter = markdown.frontmatter.take().unwrap_or_default();
        if let Some(raw) = &cli.key_mapping {
            frontmatter.key_mapping = Some(parse_key_mapping(raw).map_err(|err| anyhow!(err))?);
        }
        if let Some(key) = &cli.timestamp_key {
            frontmatter.timestamp_key = Some(key.clone());
        }
        if let Some(format) = &cli.timestamp_format {
            frontmatter.timestamp_format = format.clone();
        }
        markdown.frontmatter = Some(frontmatter);
    }

    if let Some(markers) = file.block_markers {
        settings.block_markers = markers;
    }
    if let Some(concurrent) = file.concurrent_formats {
        settings.concurrent_formats = concurrent;
    }
    if cli.sequential {
        settings.concurrent_formats = false;
    }

    Ok(settings)
}

/// The command-line post-process command wins over the configured one.
pub fn post_process_command(file: &FileConfig, cli: &Cli) -> Option<CommandSpec> {
    match cli.post_process.split_first() {
        Some((program, args)) => Some(CommandSpec::new(program.clone(), args.iter().cloned())),
        None => file.post_process.clone(),
    }
}
