//! End-to-end verification of the aws-iam add-on
//!
//! The sequence is:
//! 1. Skip unless the control plane runs Kubernetes 1.15 or newer
//! 2. Deploy aws-iam and relate it to the control plane and easyrsa
//! 3. Apply an `IAMIdentityMapping` for the test principal
//! 4. Wait for the aws-iam user in the generated kubeconfig and patch in the principal
//! 5. Install aws-iam-authenticator on the chosen unit
//! 6. Verify the principal is served while authorization is `AlwaysAllow`
//! 7. Turn on RBAC and verify the principal is refused
//! 8. Grant pod read access in `default` and verify it is served there, but not in `kube-system`
//! 9. Turn RBAC back off and remove aws-iam

use std::time::Duration;

use anyhow::Result;
use rand::{seq::SliceRandom, thread_rng};
use semver::Version;
use tracing::{error, info, warn};

use crate::{
  auth,
  config::Settings,
  juju::{Model, Node},
  kubeconfig,
  manifest::{IamIdentityMapping, Manifest, Role, RoleBinding},
  poll::Poll,
  release::{self, ReleaseIndex},
  utils, Error,
};

/// Application name the add-on is deployed under
pub const ADDON_APP: &str = "aws-iam";

/// Certificate authority the add-on needs a relation to
pub const EASYRSA_APP: &str = "easyrsa";

pub const AUTHORIZATION_MODE: &str = "authorization-mode";
pub const MODE_PERMISSIVE: &str = "AlwaysAllow";
pub const MODE_RBAC: &str = "RBAC,Node";

/// The identity mapping CRD is not served before 1.15
const MIN_VERSION: Version = Version::new(1, 15, 0);

const APPLY_TIMEOUT: Duration = Duration::from_secs(15);

/// How a run ended when it did not fail
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
  Passed,
  /// The control plane version is too old for the add-on
  Skipped { version: String },
}

/// Whether the add-on can be verified against the reported workload version
pub fn version_supported(version: &str) -> Result<bool> {
  Ok(utils::get_minor_version(version)? >= MIN_VERSION)
}

pub struct Driver<'a, M: Model, R: ReleaseIndex> {
  model: &'a M,
  releases: &'a R,
  settings: &'a Settings,
  poll: Poll,
}

impl<'a, M: Model, R: ReleaseIndex> Driver<'a, M, R> {
  pub fn new(model: &'a M, releases: &'a R, settings: &'a Settings) -> Self {
    Driver {
      model,
      releases,
      settings,
      poll: kubeconfig::default_poll(),
    }
  }

  /// Override how the generated kubeconfig is polled
  pub fn with_poll(mut self, poll: Poll) -> Self {
    self.poll = poll;
    self
  }

  /// Run the verification
  ///
  /// Once deployment has been attempted the cluster is restored on every exit path,
  /// unless the run failed and `keep_on_failure` is set. When both the run and the
  /// restore fail the run's error is returned and the restore error is logged.
  pub async fn run(&self) -> Result<Outcome> {
    info!("starting aws-iam test");
    let master = &self.settings.master_app;

    let version = self.model.workload_version(master).await?;
    if !version_supported(&version)? {
      info!("skipping, k8s version v{version}");
      return Ok(Outcome::Skipped { version });
    }

    let result = self.exercise().await;

    if result.is_err() && self.settings.keep_on_failure {
      warn!("leaving {ADDON_APP} deployed with {AUTHORIZATION_MODE}={MODE_RBAC} possibly set; run `iamverify teardown` to clean up");
      return result.map(|_| Outcome::Passed);
    }

    match (result, teardown(self.model, master).await) {
      (Ok(()), Ok(())) => Ok(Outcome::Passed),
      (Ok(()), Err(err)) => Err(err),
      (Err(err), teardown_result) => {
        if let Err(teardown_err) = teardown_result {
          error!("teardown failed: {teardown_err:#}");
        }
        Err(err)
      }
    }
  }

  async fn exercise(&self) -> Result<()> {
    let master = &self.settings.master_app;
    let arn = &self.settings.test_arn;
    let credentials = &self.settings.credentials;

    self.deploy().await?;

    // Only one unit gets the patched kubeconfig, so it receives every command
    let node = self.choose_node().await?;
    info!("using {} for all remote commands", node.unit);

    self.apply_identity_mapping(&node).await?;

    info!("verifying kubeconfig");
    kubeconfig::patch_and_verify(&node, arn, self.poll).await?;

    release::install_authenticator(&node, self.releases).await?;

    auth::verify_auth_success(&node, credentials, "get po").await?;

    self.model.set_config(master, AUTHORIZATION_MODE, MODE_RBAC).await?;
    info!("waiting for cluster to settle...");
    self.model.wait().await?;

    auth::verify_auth_failure(&node, credentials, "get po").await?;

    info!("granting {} read access to pods", crate::manifest::TEST_USER);
    let grant = Manifest::new().push(&Role::pod_reader())?.push(&RoleBinding::read_pods())?;
    node.run_completed(grant.apply_command(), APPLY_TIMEOUT).await?;

    auth::verify_auth_success(&node, credentials, "get po").await?;
    auth::verify_auth_failure(&node, credentials, "get po -n kube-system").await?;

    Ok(())
  }

  async fn deploy(&self) -> Result<()> {
    let master = &self.settings.master_app;

    info!("deploying {ADDON_APP}");
    self.model.deploy(&self.settings.charm, ADDON_APP, 0).await?;
    self.model.relate(ADDON_APP, master).await?;
    self.model.relate(ADDON_APP, EASYRSA_APP).await?;

    info!("waiting for cluster to settle...");
    self.model.wait().await
  }

  /// Map the test principal to the test user; applying again leaves the mapping unchanged
  async fn apply_identity_mapping(&self, node: &Node<'a, M>) -> Result<()> {
    info!("deploying crd");
    let mapping = Manifest::new().push(&IamIdentityMapping::new(&self.settings.test_arn))?;
    node.run_completed(mapping.apply_command(), APPLY_TIMEOUT).await?;

    Ok(())
  }

  async fn choose_node(&self) -> Result<Node<'a, M>> {
    let master = &self.settings.master_app;
    let units = self.model.units(master).await?;
    let unit = units
      .choose(&mut thread_rng())
      .ok_or_else(|| Error::NoUnits(master.to_owned()))?;

    Ok(Node::new(self.model, unit.to_owned()))
  }
}

/// Restore permissive authorization and remove the add-on
///
/// Both steps are attempted; the first failure is returned
pub async fn teardown<M: Model>(model: &M, master: &str) -> Result<()> {
  info!("tearing down {ADDON_APP}");
  let reset = model.set_config(master, AUTHORIZATION_MODE, MODE_PERMISSIVE).await;
  let removed = model.remove_application(ADDON_APP).await;

  reset.and(removed)
}
