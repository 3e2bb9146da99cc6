use anyhow::Result;
use clap::Args;
use tracing::info;

use super::Target;
use crate::driver;

/// Input arguments for the `teardown` command
#[derive(Args, Debug)]
pub struct Teardown {
  #[command(flatten)]
  pub target: Target,
}

impl Teardown {
  /// Restore permissive authorization and remove the add-on left by a kept run
  pub async fn teardown(&self) -> Result<()> {
    let juju = self.target.juju();
    driver::teardown(&juju, &self.target.master_app).await?;
    info!("teardown complete");

    Ok(())
  }
}
