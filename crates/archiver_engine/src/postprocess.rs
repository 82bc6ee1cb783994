use crate::process::{CommandSpec, ProcessRunner};
use crate::{ArchiveResult, FailureKind, StageError};

/// Pipe the JSON form of `result` into `command` and return what it printed.
pub async fn post_process(
    runner: &dyn ProcessRunner,
    command: &CommandSpec,
    result: &ArchiveResult,
) -> Result<String, StageError> {
    let payload = serde_json::to_vec(&result.to_json())
        .map_err(|err| StageError::new(FailureKind::Internal, err.to_string()))?;
    let output = runner.run(command, &[], &payload).await.map_err(|err| {
        StageError::new(
            FailureKind::Internal,
            format!("could not run `{}`: {err}", command.display()),
        )
    })?;
    if !output.success() {
        return Err(StageError::new(
            FailureKind::Internal,
            output.describe_failure(command),
        ));
    }
    if !output.stderr.is_empty() {
        engine_logging::engine_warn!(
            "`{}` succeeded with stderr: {}",
            command.display(),
            output.stderr_text()
        );
    }
    Ok(output.stdout_text())
}
