//! Spawning host tools.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use super::ToolError;

/// Run `program` with `args`, capturing output.
///
/// The child is killed if `timeout` elapses first.
///
/// # Returns
///
/// The stdout of the command on success (trimmed).
pub async fn run_tool<I, S>(program: &str, args: I, timeout: Option<Duration>) -> Result<String, ToolError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let mut command = Command::new(program);
  command
    .args(args)
    .stdin(Stdio::null())
    .kill_on_drop(true)
    .env("LANG", "C")
    .env("LC_ALL", "C");

  info!(program = %program, "running tool");
  debug!(command = ?command.as_std(), "spawning process");

  let output = match timeout {
    Some(after) => tokio::time::timeout(after, command.output())
      .await
      .map_err(|_| ToolError::Timeout {
        program: program.to_string(),
        after,
      })?,
    None => command.output().await,
  }
  .map_err(|source| ToolError::Spawn {
    program: program.to_string(),
    source,
  })?;

  let stderr = String::from_utf8_lossy(&output.stderr);
  let stdout = String::from_utf8_lossy(&output.stdout);

  if !output.status.success() {
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(ToolError::Failed {
      program: program.to_string(),
      code: output.status.code(),
      stderr: stderr.trim().to_string(),
    });
  }

  if !stderr.is_empty() {
    debug!(stderr = %stderr, "command stderr");
  }

  Ok(stdout.trim().to_string())
}

/// Run `program` attached to the caller's terminal.
pub async fn run_interactive<I, S>(program: &str, args: I) -> Result<(), ToolError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  info!(program = %program, "running interactive tool");

  let status = Command::new(program)
    .args(args)
    .stdin(Stdio::inherit())
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit())
    .status()
    .await
    .map_err(|source| ToolError::Spawn {
      program: program.to_string(),
      source,
    })?;

  if !status.success() {
    return Err(ToolError::Failed {
      program: program.to_string(),
      code: status.code(),
      stderr: String::new(),
    });
  }

  Ok(())
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn captures_trimmed_stdout() {
    let out = run_tool("/bin/sh", ["-c", "echo hello"], None).await.unwrap();
    assert_eq!(out, "hello");
  }

  #[tokio::test]
  async fn non_zero_exit_carries_stderr() {
    let err = run_tool("/bin/sh", ["-c", "echo boom >&2; exit 3"], None)
      .await
      .unwrap_err();
    match err {
      ToolError::Failed { code, stderr, .. } => {
        assert_eq!(code, Some(3));
        assert_eq!(stderr, "boom");
      }
      other => panic!("expected Failed, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn missing_program_is_spawn_error() {
    let err = run_tool("/nonexistent/strata-tool", Vec::<String>::new(), None)
      .await
      .unwrap_err();
    assert!(matches!(err, ToolError::Spawn { .. }));
  }

  #[tokio::test]
  async fn timeout_kills_slow_tool() {
    let err = run_tool("/bin/sh", ["-c", "sleep 5"], Some(Duration::from_millis(100)))
      .await
      .unwrap_err();
    assert!(matches!(err, ToolError::Timeout { .. }));
  }
}
