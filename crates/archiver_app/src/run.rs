use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use archiver_engine::{
    post_process, ArchiveEvent, ArchivePipeline, ArchiveResult, ArchiveSettings, CommandSpec,
    TokioProcessRunner,
};
use engine_logging::{engine_info, engine_warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::Cli;
use crate::config;

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let file = config::load(cli.config.as_deref())?;
    let post = config::post_process_command(&file, &cli);
    let settings = config::resolve(file, &cli)?;

    match &cli.url {
        Some(url) => {
            let complete = archive_url(&settings, url, post.as_ref()).await?;
            Ok(if complete {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => interactive(&settings, post.as_ref()).await,
    }
}

fn print_progress(event: ArchiveEvent) {
    match event.format {
        Some(format) => eprintln!("[{format}] {}", event.message),
        None => eprintln!("{}", event.message),
    }
}

/// Archive one URL and print the result. `Ok(false)` when some format failed.
async fn archive_url(
    settings: &ArchiveSettings,
    url: &str,
    post: Option<&CommandSpec>,
) -> anyhow::Result<bool> {
    let pipeline = ArchivePipeline::new(settings.clone())
        .context("invalid archive configuration")?
        .with_progress(Arc::new(print_progress));
    let result = pipeline
        .archive(url)
        .await
        .with_context(|| format!("could not archive {url}"))?;

    for (format, reason) in &result.failures {
        engine_warn!("{} failed for {}: {}", format, url, reason);
    }
    emit(&result, post, settings).await?;
    Ok(result.failures.is_empty())
}

async fn emit(
    result: &ArchiveResult,
    post: Option<&CommandSpec>,
    settings: &ArchiveSettings,
) -> anyhow::Result<()> {
    match post {
        Some(command) => {
            let runner = TokioProcessRunner::new(settings.tools.timeout);
            let printed = post_process(&runner, command, result)
                .await
                .with_context(|| format!("post-process command `{}` failed", command.display()))?;
            println!("{printed}");
        }
        None => {
            let json = serde_json::to_string_pretty(&result.to_json())?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Archive URLs read from stdin until EOF, each with a fresh pipeline.
async fn interactive(
    settings: &ArchiveSettings,
    post: Option<&CommandSpec>,
) -> anyhow::Result<ExitCode> {
    // Surface configuration errors before waiting on input.
    ArchivePipeline::new(settings.clone()).context("invalid archive configuration")?;
    eprintln!("Enter URLs to archive, one per line (Ctrl-D to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failed = 0usize;
    while let Some(line) = lines.next_line().await.context("could not read stdin")? {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        match archive_url(settings, url, post).await {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(err) => {
                failed += 1;
                eprintln!("error: {err:#}");
            }
        }
    }

    engine_info!("Interactive session finished, {} URL(s) with failures", failed);
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
