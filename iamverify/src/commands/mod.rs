pub mod teardown;
pub mod verify;

use std::time::Duration;

use clap::Args;

use crate::juju::JujuCli;

/// Where the control plane under test lives
#[derive(Args, Debug, Clone)]
pub struct Target {
  /// Juju model hosting the cluster; defaults to the client's current model
  #[arg(short, long, env = "JUJU_MODEL")]
  pub model: Option<String>,

  /// Control plane application whose units receive the remote commands
  #[arg(long, default_value = "kubernetes-master")]
  pub master_app: String,

  /// Seconds to wait for the model to settle after each change
  #[arg(long, default_value_t = 1800)]
  pub settle_timeout: u64,
}

impl Target {
  pub fn juju(&self) -> JujuCli {
    JujuCli::new(self.model.to_owned(), Duration::from_secs(self.settle_timeout))
  }
}
