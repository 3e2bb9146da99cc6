use std::{collections::BTreeMap, fmt, time::Duration};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
  action::{self, ActionOutput},
  utils, Error,
};

/// Budget for `juju` client calls that only talk to the controller
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Slack added on top of a remote command timeout to cover the controller round trip
const EXEC_OVERHEAD: Duration = Duration::from_secs(60);

/// Operations the verification needs from the orchestration platform
///
/// Trait wrapper to support testing; `JujuCli` is the real implementation
#[allow(async_fn_in_trait)]
pub trait Model {
  /// Workload version reported for the application, e.g. `1.28.3`
  async fn workload_version(&self, app: &str) -> Result<String>;

  /// Names of the units of the application, e.g. `kubernetes-master/0`
  async fn units(&self, app: &str) -> Result<Vec<String>>;

  async fn deploy(&self, charm: &str, app: &str, num_units: u32) -> Result<()>;

  async fn relate(&self, app: &str, other: &str) -> Result<()>;

  /// Block until the model has settled
  async fn wait(&self) -> Result<()>;

  async fn set_config(&self, app: &str, key: &str, value: &str) -> Result<()>;

  async fn remove_application(&self, app: &str) -> Result<()>;

  /// Execute a shell command on a unit
  async fn run(&self, unit: &str, command: &RemoteCommand, timeout: Duration) -> Result<ActionOutput>;
}

/// Value substituted for masked text when a command is displayed
pub const REDACTED: &str = "<redacted>";

/// Shell command for a unit
///
/// `Display` and `Debug` show the command with every masked value replaced by
/// `REDACTED`; only `as_str` returns the text that is actually executed
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCommand {
  text: String,
  shown: String,
}

impl RemoteCommand {
  pub fn new(text: impl Into<String>) -> Self {
    let text = text.into();
    RemoteCommand {
      shown: text.clone(),
      text,
    }
  }

  /// Hide `secret` wherever the command is displayed
  pub fn masking(mut self, secret: &str) -> Self {
    if !secret.is_empty() {
      self.shown = self.shown.replace(secret, REDACTED);
    }
    self
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }
}

impl From<String> for RemoteCommand {
  fn from(text: String) -> Self {
    RemoteCommand::new(text)
  }
}

impl From<&str> for RemoteCommand {
  fn from(text: &str) -> Self {
    RemoteCommand::new(text)
  }
}

impl fmt::Display for RemoteCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.shown)
  }
}

impl fmt::Debug for RemoteCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("RemoteCommand").field(&self.shown).finish()
  }
}

/// A unit chosen to receive every remote command of a run
pub struct Node<'a, M: Model> {
  model: &'a M,
  pub unit: String,
}

impl<'a, M: Model> Node<'a, M> {
  pub fn new(model: &'a M, unit: impl Into<String>) -> Self {
    Node {
      model,
      unit: unit.into(),
    }
  }

  /// Run a command and return its output regardless of the reported status
  pub async fn run(&self, command: impl Into<RemoteCommand>, timeout: Duration) -> Result<ActionOutput> {
    self.exec(&command.into(), timeout).await
  }

  /// Run a command and require that Juju reports it `completed`
  pub async fn run_completed(&self, command: impl Into<RemoteCommand>, timeout: Duration) -> Result<ActionOutput> {
    let command = command.into();
    let output = self.exec(&command, timeout).await?;
    if !output.is_completed() {
      return Err(
        Error::CommandNotCompleted {
          unit: self.unit.to_owned(),
          command: command.to_string(),
          status: output.status,
        }
        .into(),
      );
    }

    Ok(output)
  }

  async fn exec(&self, command: &RemoteCommand, timeout: Duration) -> Result<ActionOutput> {
    debug!("{}: {command}", self.unit);
    self.model.run(&self.unit, command, timeout).await
  }
}

/// Subset of `juju status --format json`
#[derive(Debug, Deserialize)]
struct Status {
  #[serde(default)]
  applications: BTreeMap<String, ApplicationStatus>,
}

#[derive(Debug, Deserialize)]
struct ApplicationStatus {
  /// Workload version as set by the charm
  #[serde(default)]
  version: Option<String>,

  #[serde(default)]
  units: BTreeMap<String, serde_json::Value>,
}

impl Status {
  fn application(&self, app: &str) -> Result<&ApplicationStatus> {
    Ok(
      self
        .applications
        .get(app)
        .ok_or_else(|| Error::UnknownApplication(app.to_owned()))?,
    )
  }
}

/// `Model` backed by the `juju` client and the `juju-wait` plugin
#[derive(Debug)]
pub struct JujuCli {
  /// Model to target, the client's current model when unset
  model: Option<String>,

  /// Upper bound for `juju-wait`
  settle_timeout: Duration,
}

impl JujuCli {
  pub fn new(model: Option<String>, settle_timeout: Duration) -> Self {
    JujuCli { model, settle_timeout }
  }

  /// Prefix `args` with the model selector, when one is set
  fn scoped<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
    let mut scoped = args.to_vec();
    if let Some(model) = &self.model {
      scoped.insert(1, model.as_str());
      scoped.insert(1, "-m");
    }
    scoped
  }

  /// Arguments of `juju exec` running `command` on `unit`
  fn exec_args<'a>(&'a self, unit: &'a str, exec_timeout: &'a str, command: &'a str) -> Vec<&'a str> {
    self.scoped(&[
      "exec",
      "--unit",
      unit,
      "--format",
      "json",
      "--timeout",
      exec_timeout,
      "--",
      command,
    ])
  }

  async fn juju(&self, args: &[&str], timeout: Duration) -> Result<String> {
    let result = utils::cmd_exec("juju", self.scoped(args), timeout).await?;
    if result.status != 0 {
      bail!("juju {} failed ({}): {}", args.join(" "), result.status, result.stderr.trim());
    }

    Ok(result.stdout)
  }

  async fn status(&self) -> Result<Status> {
    let stdout = self.juju(&["status", "--format", "json"], CLIENT_TIMEOUT).await?;
    serde_json::from_str(&stdout).context("unable to parse juju status")
  }
}

impl Model for JujuCli {
  async fn workload_version(&self, app: &str) -> Result<String> {
    let status = self.status().await?;
    let version = status.application(app)?.version.clone().unwrap_or_default();

    Ok(version)
  }

  async fn units(&self, app: &str) -> Result<Vec<String>> {
    let status = self.status().await?;
    Ok(status.application(app)?.units.keys().cloned().collect())
  }

  async fn deploy(&self, charm: &str, app: &str, num_units: u32) -> Result<()> {
    info!("deploying {charm} as {app}");
    let num_units = num_units.to_string();
    self
      .juju(&["deploy", charm, app, "-n", &num_units], CLIENT_TIMEOUT)
      .await
      .map(|_| ())
  }

  async fn relate(&self, app: &str, other: &str) -> Result<()> {
    info!("relating {app} to {other}");
    self.juju(&["integrate", app, other], CLIENT_TIMEOUT).await.map(|_| ())
  }

  async fn wait(&self) -> Result<()> {
    let mut args = vec!["-w"];
    if let Some(model) = &self.model {
      args.extend(["-m", model.as_str()]);
    }

    let result = utils::cmd_exec("juju-wait", args, self.settle_timeout).await?;
    if result.status != 0 {
      bail!("juju-wait failed ({}): {}", result.status, result.stderr.trim());
    }

    Ok(())
  }

  async fn set_config(&self, app: &str, key: &str, value: &str) -> Result<()> {
    info!("setting {app} {key}={value}");
    let setting = format!("{key}={value}");
    self.juju(&["config", app, &setting], CLIENT_TIMEOUT).await.map(|_| ())
  }

  async fn remove_application(&self, app: &str) -> Result<()> {
    info!("removing {app}");
    self
      .juju(&["remove-application", app], CLIENT_TIMEOUT)
      .await
      .map(|_| ())
  }

  async fn run(&self, unit: &str, command: &RemoteCommand, timeout: Duration) -> Result<ActionOutput> {
    let exec_timeout = format!("{}s", timeout.as_secs());
    let args = self.exec_args(unit, &exec_timeout, command.as_str());
    let shown = command.to_string();
    let shown = format!("juju {}", self.exec_args(unit, &exec_timeout, &shown).join(" "));

    // `juju exec` exits non-zero when the command fails but still reports the results
    let result = utils::cmd_exec_shown("juju", args, &shown, timeout + EXEC_OVERHEAD).await?;
    action::parse_exec_output(unit, &result.stdout)
      .with_context(|| format!("juju exec on {unit} returned {}: {}", result.status, result.stderr.trim()))
  }
}
