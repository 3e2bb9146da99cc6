//! In-memory stand-ins for Juju and the release index used by unit tests
//!
//! `FakeModel` simulates just enough of a control plane with the aws-iam add-on to
//! answer the commands the driver issues: the generated kubeconfig gains the aws-iam
//! user once the add-on is related, and authenticated `kubectl` calls are answered
//! according to the authorization mode and whether the RBAC grant was applied.

use std::{
  cell::RefCell,
  collections::{HashSet, VecDeque},
  time::Duration,
};

use anyhow::{bail, Result};

use crate::{
  action::{ActionOutput, ActionStatus},
  juju::{Model, RemoteCommand},
  release::{Asset, Release, ReleaseIndex},
};

const FORBIDDEN: &str =
  "Error from server (Forbidden): pods is forbidden: User \"test-user\" cannot list resource \"pods\" in API group \"\"";

#[derive(Debug)]
struct Cluster {
  authorization_mode: String,
  deployed: bool,
  related: HashSet<String>,
  kubeconfig_reads: u32,
  patched: bool,
  authenticator: bool,
  rbac_granted: bool,
  identity_mappings: u32,
}

pub struct FakeModel {
  version: String,
  units: Vec<String>,
  /// Reads of the generated kubeconfig that miss before the aws-iam user shows up
  kubeconfig_delay: u32,
  log: RefCell<Vec<String>>,
  commands: RefCell<Vec<String>>,
  outputs: RefCell<VecDeque<ActionOutput>>,
  fail_command: Option<String>,
  fail_op: Option<&'static str>,
  cluster: RefCell<Cluster>,
}

impl FakeModel {
  pub fn new() -> Self {
    FakeModel {
      version: "1.28.3".to_owned(),
      units: vec!["kubernetes-master/0".to_owned(), "kubernetes-master/1".to_owned()],
      kubeconfig_delay: 0,
      log: RefCell::new(Vec::new()),
      commands: RefCell::new(Vec::new()),
      outputs: RefCell::new(VecDeque::new()),
      fail_command: None,
      fail_op: None,
      cluster: RefCell::new(Cluster {
        authorization_mode: "AlwaysAllow".to_owned(),
        deployed: false,
        related: HashSet::new(),
        kubeconfig_reads: 0,
        patched: false,
        authenticator: false,
        rbac_granted: false,
        identity_mappings: 0,
      }),
    }
  }

  pub fn with_version(mut self, version: &str) -> Self {
    self.version = version.to_owned();
    self
  }

  pub fn with_units(mut self, units: &[&str]) -> Self {
    self.units = units.iter().map(|u| u.to_string()).collect();
    self
  }

  pub fn with_kubeconfig_delay(mut self, misses: u32) -> Self {
    self.kubeconfig_delay = misses;
    self
  }

  /// Queue a scripted answer; queued answers take precedence over the simulation
  pub fn with_output(self, output: ActionOutput) -> Self {
    self.push_output(output);
    self
  }

  pub fn push_output(&self, output: ActionOutput) {
    self.outputs.borrow_mut().push_back(output);
  }

  /// Report `failed` for any unit command containing `fragment`
  pub fn failing_command(mut self, fragment: &str) -> Self {
    self.fail_command = Some(fragment.to_owned());
    self
  }

  /// Return an error from the named model operation, e.g. `deploy`
  pub fn failing_op(mut self, op: &'static str) -> Self {
    self.fail_op = Some(op);
    self
  }

  /// Every interaction with the model, in order
  pub fn log(&self) -> Vec<String> {
    self.log.borrow().clone()
  }

  /// Commands executed on units, in order
  pub fn commands(&self) -> Vec<String> {
    self.commands.borrow().clone()
  }

  pub fn authorization_mode(&self) -> String {
    self.cluster.borrow().authorization_mode.clone()
  }

  pub fn deployed(&self) -> bool {
    self.cluster.borrow().deployed
  }

  /// Times an identity mapping was applied
  pub fn identity_mappings(&self) -> u32 {
    self.cluster.borrow().identity_mappings
  }

  fn record(&self, op: &'static str, entry: String) -> Result<()> {
    self.log.borrow_mut().push(entry);
    if self.fail_op == Some(op) {
      bail!("{op} failed");
    }
    Ok(())
  }

  fn simulate(&self, command: &str) -> ActionOutput {
    let mut cluster = self.cluster.borrow_mut();

    if command.starts_with("cat /home/ubuntu/config") {
      cluster.kubeconfig_reads += 1;
      let ready = cluster.deployed && cluster.related.contains("kubernetes-master");
      return match ready && cluster.kubeconfig_reads > self.kubeconfig_delay {
        true => ActionOutput::completed("users:\n- name: aws-iam-user\n", ""),
        false => ActionOutput::completed("users:\n- name: admin\n", ""),
      };
    }

    if command.starts_with("cp /home/ubuntu/config") {
      cluster.patched = true;
    } else if command.starts_with("wget") {
      cluster.authenticator = true;
    } else if command.contains("apply -f -") && command.contains("kind: IAMIdentityMapping") {
      cluster.identity_mappings += 1;
    } else if command.contains("apply -f -") && command.contains("kind: RoleBinding") {
      cluster.rbac_granted = true;
    } else if command.contains("--context=aws-iam-authenticator") {
      if !cluster.patched || !cluster.authenticator {
        return ActionOutput::completed("", "error: unable to load kubeconfig");
      }
      let in_default = !command.contains("-n kube-system");
      let allowed = cluster.authorization_mode == "AlwaysAllow" || (cluster.rbac_granted && in_default);
      return match allowed {
        true => ActionOutput::completed("No resources found in default namespace.\n", ""),
        false => ActionOutput::completed("", FORBIDDEN),
      };
    }

    ActionOutput::completed("", "")
  }
}

impl Model for FakeModel {
  async fn workload_version(&self, app: &str) -> Result<String> {
    self.record("workload_version", format!("version {app}"))?;
    Ok(self.version.clone())
  }

  async fn units(&self, app: &str) -> Result<Vec<String>> {
    self.record("units", format!("units {app}"))?;
    Ok(self.units.clone())
  }

  async fn deploy(&self, charm: &str, app: &str, num_units: u32) -> Result<()> {
    self.record("deploy", format!("deploy {charm} as {app} -n {num_units}"))?;
    self.cluster.borrow_mut().deployed = true;
    Ok(())
  }

  async fn relate(&self, app: &str, other: &str) -> Result<()> {
    self.record("relate", format!("relate {app} {other}"))?;
    self.cluster.borrow_mut().related.insert(other.to_owned());
    Ok(())
  }

  async fn wait(&self) -> Result<()> {
    self.record("wait", "wait".to_owned())
  }

  async fn set_config(&self, app: &str, key: &str, value: &str) -> Result<()> {
    self.record("set_config", format!("config {app} {key}={value}"))?;
    if key == "authorization-mode" {
      self.cluster.borrow_mut().authorization_mode = value.to_owned();
    }
    Ok(())
  }

  async fn remove_application(&self, app: &str) -> Result<()> {
    self.record("remove_application", format!("remove {app}"))?;
    self.cluster.borrow_mut().deployed = false;
    Ok(())
  }

  async fn run(&self, unit: &str, command: &RemoteCommand, _timeout: Duration) -> Result<ActionOutput> {
    let command = command.as_str();
    self.record("run", format!("run {unit}"))?;
    self.commands.borrow_mut().push(command.to_owned());

    if let Some(output) = self.outputs.borrow_mut().pop_front() {
      return Ok(output);
    }

    if let Some(fragment) = &self.fail_command {
      if command.contains(fragment.as_str()) {
        let mut output = ActionOutput::completed("", "");
        output.status = ActionStatus::Failed;
        return Ok(output);
      }
    }

    Ok(self.simulate(command))
  }
}

pub struct FakeReleases {
  urls: Vec<String>,
}

impl FakeReleases {
  pub fn new(urls: &[&str]) -> Self {
    FakeReleases {
      urls: urls.iter().map(|u| u.to_string()).collect(),
    }
  }
}

impl ReleaseIndex for FakeReleases {
  async fn latest(&self) -> Result<Release> {
    Ok(Release {
      tag_name: Some("v0.6.14".to_owned()),
      assets: self
        .urls
        .iter()
        .map(|url| Asset {
          browser_download_url: url.to_owned(),
        })
        .collect(),
    })
  }
}
