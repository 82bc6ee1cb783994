use std::path::PathBuf;

use archiver_engine::MarkdownBackend;
use clap::{Parser, ValueEnum};

/// Archive web pages as readable HTML, self-contained HTML, Markdown and PDF.
#[derive(Parser, Debug, Default)]
#[command(name = "archiver", version, about)]
pub struct Cli {
    /// Page to archive. Without it, URLs are read from stdin one per line.
    pub url: Option<String>,

    /// Output formats: html, full_html, markdown, pdf (repeatable or comma separated)
    #[arg(short, long = "format", value_delimiter = ',')]
    pub formats: Vec<String>,

    /// Directory for the archived files. Without it, results stay in memory.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// RON configuration file (defaults to ./archiver.ron when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "ZENROWS_API_KEY", hide_env_values = true)]
    pub zenrows_api_key: Option<String>,

    #[arg(long, env = "OXYLABS_USERNAME")]
    pub oxylabs_username: Option<String>,

    #[arg(long, env = "OXYLABS_PASSWORD", hide_env_values = true)]
    pub oxylabs_password: Option<String>,

    /// Unpacked browser extension to load (repeatable)
    #[arg(long = "extension")]
    pub extensions: Vec<PathBuf>,

    /// Chrome or Chromium executable
    #[arg(long)]
    pub chrome: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    #[arg(long, value_enum)]
    pub markdown_backend: Option<BackendArg>,

    /// Strip raw HTML from pandoc's Markdown output
    #[arg(long)]
    pub no_raw_html: bool,

    /// Prefix Markdown with a YAML frontmatter block
    #[arg(long)]
    pub frontmatter: bool,

    /// Frontmatter key mapping, e.g. `title:name,url:source`
    #[arg(long, requires = "frontmatter")]
    pub key_mapping: Option<String>,

    /// Frontmatter key that receives the archive timestamp
    #[arg(long, requires = "frontmatter")]
    pub timestamp_key: Option<String>,

    /// strftime format of the frontmatter timestamp
    #[arg(long, requires = "frontmatter")]
    pub timestamp_format: Option<String>,

    /// Produce formats one after another instead of concurrently
    #[arg(long)]
    pub sequential: bool,

    /// Log file written alongside terminal output
    #[arg(long, default_value = "archiver.log")]
    pub log_file: PathBuf,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Command that receives the JSON result on stdin; its output replaces the JSON
    #[arg(last = true)]
    pub post_process: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Pandoc,
    Builtin,
}

impl From<BackendArg> for MarkdownBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Pandoc => MarkdownBackend::Pandoc,
            BackendArg::Builtin => MarkdownBackend::Builtin,
        }
    }
}
