use crate::{OutputFormat, RunState, Stage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Shared stage transition (render, evasion, polish).
    Run(Stage),
    /// A format moved to a non-terminal stage.
    Format { format: OutputFormat, stage: Stage },
    FormatDone { format: OutputFormat },
    FormatFailed { format: OutputFormat, reason: String },
    /// Render or polish failed; nothing can be produced.
    RunFailed,
}

/// Pure update function: applies a message to the run state.
///
/// Terminal states are sticky and illegal run-level moves are ignored.
pub fn update(mut state: RunState, msg: Msg) -> RunState {
    if state.run_stage().is_terminal() {
        return state;
    }
    match msg {
        Msg::Run(stage) => {
            if state.run_stage().allows(stage) {
                state.set_run(stage);
            }
        }
        Msg::Format { format, stage } => {
            if let Some(entry) = state.entry_mut(format) {
                if !entry.stage.is_terminal() && !stage.is_terminal() {
                    entry.stage = stage;
                }
            }
        }
        Msg::FormatDone { format } => {
            finish_format(&mut state, format, Stage::Done, None);
        }
        Msg::FormatFailed { format, reason } => {
            finish_format(&mut state, format, Stage::Failed, Some(reason));
        }
        Msg::RunFailed => state.set_run(Stage::Failed),
    }
    state
}

fn finish_format(state: &mut RunState, format: OutputFormat, stage: Stage, reason: Option<String>) {
    let Some(entry) = state.entry_mut(format) else {
        return;
    };
    if entry.stage.is_terminal() {
        return;
    }
    entry.stage = stage;
    entry.failure = reason;
    if state.all_formats_terminal() {
        state.set_run(Stage::Done);
    }
}
