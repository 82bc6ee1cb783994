use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// An external tool invocation: program plus fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Summary used in error messages for a failed run.
    pub fn describe_failure(&self, command: &CommandSpec) -> String {
        let mut message = match self.exit_code {
            Some(code) => format!("`{}` failed with exit code {code}", command.display()),
            None => format!("`{}` was terminated by a signal", command.display()),
        };
        let stderr = self.stderr_text();
        if !stderr.is_empty() {
            message.push_str(&format!(". stderr: {stderr}"));
        }
        let stdout = self.stdout_text();
        if !stdout.is_empty() {
            message.push_str(&format!(". stdout: {}", truncate_for_log(&stdout, 512)));
        }
        message
    }
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

/// Runs an external command with `stdin`, capturing stdout, stderr and exit code.
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &CommandSpec,
        extra_args: &[String],
        stdin: &[u8],
    ) -> io::Result<CapturedOutput>;
}

#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    timeout: Duration,
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl TokioProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        extra_args: &[String],
        stdin: &[u8],
    ) -> io::Result<CapturedOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future (timeout or caller cancellation) must not leak the child.
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin not captured"))?;
        let input = stdin.to_vec();
        // Feed stdin concurrently so a tool that streams output never deadlocks on a full pipe.
        let writer = tokio::spawn(async move {
            let result = child_stdin.write_all(&input).await;
            drop(child_stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "`{}` timed out after {}s",
                        command.display(),
                        self.timeout.as_secs()
                    ),
                )
            })??;

        match writer.await {
            Ok(Err(err)) if err.kind() != io::ErrorKind::BrokenPipe => return Err(err),
            Err(join_err) => return Err(io::Error::new(io::ErrorKind::Other, join_err)),
            _ => {}
        }

        Ok(CapturedOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_from_stdin() {
        let runner = TokioProcessRunner::default();
        let output = runner
            .run(&CommandSpec::new("cat", Vec::<String>::new()), &[], b"hello")
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_text(), "hello");
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let runner = TokioProcessRunner::default();
        let command = CommandSpec::new("sh", ["-c", "echo boom >&2; exit 3"]);
        let output = runner.run(&command, &[], b"").await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(output.describe_failure(&command).contains("stderr: boom"));
    }

    #[tokio::test]
    async fn times_out_slow_commands() {
        let runner = TokioProcessRunner::new(Duration::from_millis(50));
        let command = CommandSpec::new("sleep", ["5"]);
        let err = runner.run(&command, &[], b"").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
