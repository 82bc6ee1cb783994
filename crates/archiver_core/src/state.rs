use crate::OutputFormat;

/// Where a pipeline run (or one of its formats) currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    #[default]
    Idle,
    Rendering,
    Evading,
    Rendered,
    Polishing,
    Polished,
    Embedding,
    Converting,
    Writing,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Legal run-level moves. Format-level stages are not checked here.
    pub fn allows(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Idle, Rendering)
                | (Rendering, Rendering)
                | (Rendering, Evading)
                | (Rendering, Rendered)
                | (Evading, Rendering)
                | (Evading, Rendered)
                | (Rendered, Polishing)
                | (Polishing, Polished)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatProgress {
    pub format: OutputFormat,
    pub stage: Stage,
    pub failure: Option<String>,
}

/// Progress of one `archive()` call: the shared render/polish stages plus one
/// entry per requested format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunState {
    run: Stage,
    formats: Vec<FormatProgress>,
}

impl RunState {
    pub fn new(formats: &[OutputFormat]) -> Self {
        Self {
            run: Stage::Idle,
            formats: formats
                .iter()
                .map(|&format| FormatProgress {
                    format,
                    stage: Stage::Idle,
                    failure: None,
                })
                .collect(),
        }
    }

    pub fn run_stage(&self) -> Stage {
        self.run
    }

    pub fn formats(&self) -> &[FormatProgress] {
        &self.formats
    }

    pub fn format_stage(&self, format: OutputFormat) -> Option<Stage> {
        self.entry(format).map(|entry| entry.stage)
    }

    pub fn completed(&self) -> Vec<OutputFormat> {
        self.formats
            .iter()
            .filter(|entry| entry.stage == Stage::Done)
            .map(|entry| entry.format)
            .collect()
    }

    pub fn failures(&self) -> Vec<(OutputFormat, String)> {
        self.formats
            .iter()
            .filter(|entry| entry.stage == Stage::Failed)
            .map(|entry| (entry.format, entry.failure.clone().unwrap_or_default()))
            .collect()
    }

    pub(crate) fn entry(&self, format: OutputFormat) -> Option<&FormatProgress> {
        self.formats.iter().find(|entry| entry.format == format)
    }

    pub(crate) fn entry_mut(&mut self, format: OutputFormat) -> Option<&mut FormatProgress> {
        self.formats.iter_mut().find(|entry| entry.format == format)
    }

    pub(crate) fn set_run(&mut self, stage: Stage) {
        self.run = stage;
    }

    pub(crate) fn all_formats_terminal(&self) -> bool {
        self.formats.iter().all(|entry| entry.stage.is_terminal())
    }
}
