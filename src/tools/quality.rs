//! Quality checks that shell out to the project's own toolchain

use super::{ExecutionSpeed, TokenCost, Tool, ToolError, ToolOutput, ToolParams, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const TYPE_CHECK: &str = "type_check";
pub const LINT_CHECK: &str = "lint_check";
pub const TEST_RUNNER: &str = "test_runner";

const OUTPUT_TAIL_CHARS: usize = 4000;

/// Outcome of a quality command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub command: String,
    pub exit_code: i32,
    pub passed: bool,
    /// Output lines mentioning an error
    pub error_lines: usize,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a fixed command in the project directory under a timeout.
///
/// A non-zero exit is reported as `passed: false`; only a missing program,
/// an I/O failure or the timeout count as tool errors.
pub struct CommandTool {
    spec: ToolSpec,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(spec: ToolSpec, program: impl Into<String>, args: &[&str], timeout: Duration) -> Self {
        Self {
            spec,
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout,
        }
    }

    /// `npx tsc --noEmit`
    pub fn type_check(timeout: Duration) -> Self {
        let spec = ToolSpec::new(TYPE_CHECK, "Type-check the project with the TypeScript compiler")
            .with_capabilities(["type check", "type errors", "compile", "typescript"])
            .with_token_cost(TokenCost::Medium)
            .with_execution_time(ExecutionSpeed::Slow)
            .with_reliability(0.85);
        Self::new(spec, "npx", &["tsc", "--noEmit"], timeout)
    }

    /// `npx eslint .`
    pub fn lint_check(timeout: Duration) -> Self {
        let spec = ToolSpec::new(LINT_CHECK, "Lint the project with ESLint")
            .with_capabilities(["lint", "code style", "code quality", "review"])
            .with_token_cost(TokenCost::Medium)
            .with_execution_time(ExecutionSpeed::Slow)
            .with_reliability(0.85);
        Self::new(spec, "npx", &["eslint", "."], timeout)
    }

    /// `npm test`, run after type checking
    pub fn test_runner(timeout: Duration) -> Self {
        let spec = ToolSpec::new(TEST_RUNNER, "Run the project's test suite")
            .with_capabilities(["test", "unit test", "coverage", "regression"])
            .with_token_cost(TokenCost::High)
            .with_execution_time(ExecutionSpeed::Slow)
            .with_dependencies([TYPE_CHECK])
            .sequential()
            .with_reliability(0.8);
        Self::new(spec, "npm", &["test"], timeout)
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(&self, workdir: &Path) -> Result<CheckResult, ToolError> {
        info!("Running `{}` in {}", self.command_line(), workdir.display());
        let started = Instant::now();

        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ToolError::Unavailable(format!("{} is not installed", self.program))
                }
                _ => ToolError::Io(e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            warn!("`{}` exited with {}", self.command_line(), exit_code);
            debug!("stderr: {}", stderr);
        }

        Ok(CheckResult {
            command: self.command_line(),
            exit_code,
            passed: exit_code == 0,
            error_lines: count_error_lines(&stdout) + count_error_lines(&stderr),
            duration_ms: started.elapsed().as_millis() as u64,
            stdout: tail(&stdout, OUTPUT_TAIL_CHARS),
            stderr: tail(&stderr, OUTPUT_TAIL_CHARS),
        })
    }
}

fn count_error_lines(output: &str) -> usize {
    output
        .lines()
        .filter(|l| l.to_lowercase().contains("error"))
        .count()
}

/// Last `max_chars` characters of `text`
fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

#[async_trait]
impl Tool for CommandTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError> {
        if !params.project_path.is_dir() {
            return Err(ToolError::Invalid(format!(
                "not a directory: {}",
                params.project_path.display()
            )));
        }
        let result = self.run(&params.project_path).await?;
        Ok(ToolOutput::new(serde_json::to_value(result)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_commands() {
        let tool = CommandTool::type_check(Duration::from_secs(120));
        assert_eq!(tool.name(), TYPE_CHECK);
        assert_eq!(tool.command_line(), "npx tsc --noEmit");

        let tests = CommandTool::test_runner(Duration::from_secs(300));
        assert_eq!(tests.command_line(), "npm test");
        assert!(!tests.spec().parallelizable);
        assert_eq!(tests.spec().dependencies, vec![TYPE_CHECK.to_string()]);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let tool = CommandTool::new(
            ToolSpec::new("ghost", "missing"),
            "definitely-not-a-real-binary-xyz",
            &[],
            Duration::from_secs(5),
        );
        let err = tool.execute(&ToolParams::new(dir.path(), "")).await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_not_passed() {
        let dir = TempDir::new().unwrap();
        let tool = CommandTool::new(
            ToolSpec::new("failing", "exits 3"),
            "sh",
            &["-c", "echo 'error: broken' >&2; exit 3"],
            Duration::from_secs(5),
        );
        let output = tool.execute(&ToolParams::new(dir.path(), "")).await.unwrap();
        assert_eq!(output.data["passed"], false);
        assert_eq!(output.data["exitCode"], 3);
        assert_eq!(output.data["errorLines"], 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let tool = CommandTool::new(
            ToolSpec::new("slow", "sleeps"),
            "sleep",
            &["5"],
            Duration::from_millis(100),
        );
        let err = tool.execute(&ToolParams::new(dir.path(), "")).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }
}
