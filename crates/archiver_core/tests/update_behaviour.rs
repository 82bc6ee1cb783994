use std::sync::Once;

use archiver_core::{update, Msg, OutputFormat, RunState, Stage};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn polished(formats: &[OutputFormat]) -> RunState {
    let state = RunState::new(formats);
    let state = update(state, Msg::Run(Stage::Rendering));
    let state = update(state, Msg::Run(Stage::Rendered));
    let state = update(state, Msg::Run(Stage::Polishing));
    update(state, Msg::Run(Stage::Polished))
}

#[test]
fn run_walks_through_shared_stages() {
    init_logging();
    let state = polished(&[OutputFormat::Html]);
    assert_eq!(state.run_stage(), Stage::Polished);
    assert_eq!(state.format_stage(OutputFormat::Html), Some(Stage::Idle));
}

#[test]
fn blocked_render_passes_through_evading() {
    init_logging();
    let state = RunState::new(&[OutputFormat::Markdown]);
    let state = update(state, Msg::Run(Stage::Rendering));
    let state = update(state, Msg::Run(Stage::Evading));
    assert_eq!(state.run_stage(), Stage::Evading);
    let state = update(state, Msg::Run(Stage::Rendering));
    let state = update(state, Msg::Run(Stage::Rendered));
    assert_eq!(state.run_stage(), Stage::Rendered);
}

#[test]
fn illegal_run_transition_is_ignored() {
    init_logging();
    let state = RunState::new(&[OutputFormat::Html]);
    let next = update(state.clone(), Msg::Run(Stage::Polished));
    assert_eq!(next, state);
}

#[test]
fn run_is_done_once_every_format_is_terminal() {
    init_logging();
    let state = polished(&[OutputFormat::Html, OutputFormat::Pdf]);
    let state = update(
        state,
        Msg::Format {
            format: OutputFormat::Html,
            stage: Stage::Embedding,
        },
    );
    let state = update(
        state,
        Msg::FormatDone {
            format: OutputFormat::Html,
        },
    );
    assert_eq!(state.run_stage(), Stage::Polished);

    let state = update(
        state,
        Msg::FormatFailed {
            format: OutputFormat::Pdf,
            reason: "browser crashed".into(),
        },
    );
    assert_eq!(state.run_stage(), Stage::Done);
    assert_eq!(state.completed(), vec![OutputFormat::Html]);
    assert_eq!(
        state.failures(),
        vec![(OutputFormat::Pdf, "browser crashed".to_string())]
    );
}

#[test]
fn terminal_format_states_are_sticky() {
    init_logging();
    let state = polished(&[OutputFormat::Markdown, OutputFormat::Pdf]);
    let state = update(
        state,
        Msg::FormatFailed {
            format: OutputFormat::Markdown,
            reason: "all variants empty".into(),
        },
    );
    let state = update(
        state,
        Msg::Format {
            format: OutputFormat::Markdown,
            stage: Stage::Converting,
        },
    );
    let state = update(
        state,
        Msg::FormatDone {
            format: OutputFormat::Markdown,
        },
    );
    assert_eq!(state.format_stage(OutputFormat::Markdown), Some(Stage::Failed));
}

#[test]
fn run_failure_is_terminal() {
    init_logging();
    let state = RunState::new(&[OutputFormat::Html]);
    let state = update(state, Msg::Run(Stage::Rendering));
    let state = update(state, Msg::RunFailed);
    let state = update(state, Msg::Run(Stage::Rendered));
    assert_eq!(state.run_stage(), Stage::Failed);
}

#[test]
fn messages_for_unrequested_formats_are_ignored() {
    init_logging();
    let state = polished(&[OutputFormat::Html]);
    let next = update(
        state.clone(),
        Msg::FormatDone {
            format: OutputFormat::Pdf,
        },
    );
    assert_eq!(next, state);
}
