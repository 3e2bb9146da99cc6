use std::time::Duration;

use anyhow::{anyhow, Result};
use regex_lite::Regex;
use semver::Version;
use tokio::process::Command;
use tracing::debug;

use crate::Error;

/// Extract the `<major>.<minor>` portion of the version string provided
///
/// Juju reports workload versions such as `1.28.3`, `v1.15` or `1.24.13-eks-0a21954`;
/// the patch component is not needed for gating so it is normalized to zero
pub fn get_minor_version(ver: &str) -> Result<Version> {
  let re = Regex::new(r"v?(\d+)\.(\d+)")?;
  let cap = re
    .captures(ver)
    .ok_or_else(|| Error::UnparsableVersion(ver.to_owned()))?;

  let major = cap[1].parse::<u64>()?;
  let minor = cap[2].parse::<u64>()?;

  Ok(Version::new(major, minor, 0))
}

#[derive(Debug)]
pub struct CmdResult {
  pub stdout: String,
  pub stderr: String,
  pub status: i32,
}

/// Execute a command locally, bounded by `timeout`, and return its output
///
/// Exceeding the timeout kills the child and is reported as `Error::CommandTimeout`
pub async fn cmd_exec(cmd: &str, args: Vec<&str>, timeout: Duration) -> Result<CmdResult> {
  let shown = format!("{cmd} {}", args.join(" "));
  cmd_exec_shown(cmd, args, &shown, timeout).await
}

/// Same as `cmd_exec`, with `shown` standing in for the command line in logs and errors
pub async fn cmd_exec_shown(cmd: &str, args: Vec<&str>, shown: &str, timeout: Duration) -> Result<CmdResult> {
  debug!("exec: {shown}");
  let child = Command::new(cmd).args(&args).kill_on_drop(true).output();

  let output = match tokio::time::timeout(timeout, child).await {
    Ok(output) => output.map_err(|e| anyhow!("Error executing command {cmd}: {e}"))?,
    Err(_) => {
      return Err(
        Error::CommandTimeout {
          command: shown.to_owned(),
          timeout,
        }
        .into(),
      )
    }
  };

  Ok(CmdResult {
    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    status: output.status.code().unwrap_or(1),
  })
}

#[cfg(test)]
mod tests {
  use rstest::*;

  use super::*;

  #[rstest]
  #[case("1.15.0", 1, 15)]
  #[case("1.28.3", 1, 28)]
  #[case("v1.14", 1, 14)]
  #[case("1.24.13-eks-0a21954", 1, 24)]
  #[case("Kubernetes v1.27.1", 1, 27)]
  fn it_gets_minor_version(#[case] ver: &str, #[case] major: u64, #[case] minor: u64) {
    let result = get_minor_version(ver).unwrap();
    assert_eq!(result, Version::new(major, minor, 0));
  }

  #[rstest]
  #[case("")]
  #[case("latest")]
  #[case("1")]
  fn it_rejects_unparsable_version(#[case] ver: &str) {
    let err = get_minor_version(ver).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnparsableVersion(_))));
  }

  #[tokio::test]
  async fn it_executes_commands() {
    let result = cmd_exec("sh", vec!["-c", "echo out; echo err >&2; exit 3"], Duration::from_secs(5))
      .await
      .unwrap();
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert_eq!(result.status, 3);
  }

  #[tokio::test]
  async fn it_times_out_commands() {
    let err = cmd_exec("sleep", vec!["5"], Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::CommandTimeout { .. })));
  }

  #[tokio::test]
  async fn it_reports_shown_command_on_timeout() {
    let err = cmd_exec_shown("sleep", vec!["5"], "sleep <redacted>", Duration::from_millis(50))
      .await
      .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("sleep <redacted>"));
    assert!(!message.contains("sleep 5"));
  }
}
