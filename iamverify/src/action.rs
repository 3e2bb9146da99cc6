use std::{collections::BTreeMap, fmt};

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Terminal state reported by Juju for a command executed on a unit
///
/// Only `Completed` is treated as success; `Completed` only means the command was
/// executed, the command's own exit code is carried separately in `ActionOutput`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
  Completed,
  Failed,
  Cancelled,
  Aborted,
  Pending,
  Running,
  #[serde(other)]
  Unknown,
}

impl fmt::Display for ActionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let status = match self {
      ActionStatus::Completed => "completed",
      ActionStatus::Failed => "failed",
      ActionStatus::Cancelled => "cancelled",
      ActionStatus::Aborted => "aborted",
      ActionStatus::Pending => "pending",
      ActionStatus::Running => "running",
      ActionStatus::Unknown => "unknown",
    };
    write!(f, "{status}")
  }
}

/// Result of running a command on a unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutput {
  pub status: ActionStatus,
  pub stdout: String,
  pub stderr: String,
  pub return_code: i32,
}

impl ActionOutput {
  pub fn completed(stdout: &str, stderr: &str) -> Self {
    ActionOutput {
      status: ActionStatus::Completed,
      stdout: stdout.to_owned(),
      stderr: stderr.to_owned(),
      return_code: 0,
    }
  }

  pub fn is_completed(&self) -> bool {
    self.status == ActionStatus::Completed
  }
}

/// One entry of `juju exec --format json`, keyed by unit name
#[derive(Debug, Deserialize)]
struct ExecEntry {
  status: ActionStatus,
  #[serde(default)]
  results: ExecResults,
}

#[derive(Debug, Default, Deserialize)]
struct ExecResults {
  #[serde(default)]
  stdout: String,
  #[serde(default)]
  stderr: String,
  #[serde(default, rename = "return-code")]
  return_code: i32,
}

/// Extract the output for `unit` from the JSON printed by `juju exec`
pub fn parse_exec_output(unit: &str, json: &str) -> Result<ActionOutput> {
  let mut entries: BTreeMap<String, ExecEntry> = serde_json::from_str(json)?;
  let entry = entries
    .remove(unit)
    .ok_or_else(|| anyhow!("no result for unit {unit} in exec output"))?;

  Ok(ActionOutput {
    status: entry.status,
    stdout: entry.results.stdout,
    stderr: entry.results.stderr,
    return_code: entry.results.return_code,
  })
}
