use std::{fmt, process::Stdio};

use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use crate::error::{Result, ScanError};

/// Thin wrapper over an external CLI (`docker`, `ctr`) with a fixed argument
/// prefix. Every call captures stdout; a non-zero exit becomes
/// [`ScanError::Runtime`] carrying the trimmed stderr.
#[derive(Clone)]
pub struct CliTool {
    program: String,
    prefix: Vec<String>,
}

impl fmt::Debug for CliTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliTool")
            .field("program", &self.program)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl CliTool {
    pub fn new(program: impl Into<String>, prefix: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn run(&self, args: &[&str]) -> Result<String> {
        self.run_with_input(args, None).await
    }

    pub async fn run_with_input(&self, args: &[&str], input: Option<&[u8]>) -> Result<String> {
        debug!(target: "bulwark::runtime", program = %self.program, args = ?args, "exec");

        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| {
            ScanError::Runtime(format!("failed to start {}: {err}", self.program))
        })?;

        if let Some(bytes) = input
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin.write_all(bytes).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::Runtime(format!(
                "{} {} failed ({}): {}",
                self.program,
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Non-empty trimmed lines, first occurrence only.
pub(crate) fn unique_lines(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_lines_skips_blanks_and_repeats() {
        let lines = unique_lines("sha256:a\n\n  sha256:b \nsha256:a\n");
        assert_eq!(lines, vec!["sha256:a", "sha256:b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = test_tools::write_tool(dir.path(), "docker", "echo 'no such image' >&2\nexit 1");
        let cli = CliTool::new(tool.display().to_string(), Vec::new());

        let err = cli.run(&["image", "rm", "x"]).await.unwrap_err();
        match err {
            ScanError::Runtime(message) => assert!(message.contains("no such image"), "{message}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn prefix_and_stdin_reach_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let tool = test_tools::write_tool(dir.path(), "ctr", "cat");
        let cli = CliTool::new(tool.display().to_string(), vec!["-n".into(), "scan".into()]);

        let out = cli
            .run_with_input(&["login"], Some(b"secret"))
            .await
            .unwrap();
        assert_eq!(out, "secret");
        assert_eq!(test_tools::calls(dir.path(), "ctr"), vec!["-n scan login"]);
    }
}
