use anyhow::Result;
use clap::Args;
use tracing::info;

use super::Target;
use crate::{
  config::{self, Settings},
  driver::{Driver, Outcome},
  release::GitHubReleases,
};

/// Input arguments for the `verify` command
#[derive(Args, Debug)]
pub struct Verify {
  #[command(flatten)]
  pub target: Target,

  /// IAM principal mapped to the test user; a placeholder is used when unset
  #[arg(long, env = "TEST_ARN")]
  pub test_arn: Option<String>,

  /// Access key id of the test principal; a placeholder is used when unset
  #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
  pub aws_access_key_id: Option<String>,

  /// Secret access key of the test principal; a placeholder is used when unset
  #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
  pub aws_secret_access_key: Option<String>,

  /// Charm to deploy for the add-on
  #[arg(long, default_value = "aws-iam")]
  pub charm: String,

  /// Leave the add-on deployed and RBAC enabled when verification fails
  #[arg(long)]
  pub keep_on_failure: bool,
}

impl Verify {
  /// Resolve settings once; fallbacks are logged here and nowhere else
  pub fn settings(&self) -> Settings {
    Settings {
      test_arn: config::resolve_test_arn(self.test_arn.to_owned()),
      credentials: config::resolve_credentials(
        self.aws_access_key_id.to_owned(),
        self.aws_secret_access_key.to_owned(),
      ),
      master_app: self.target.master_app.to_owned(),
      charm: self.charm.to_owned(),
      keep_on_failure: self.keep_on_failure,
    }
  }

  pub async fn verify(&self) -> Result<()> {
    let settings = self.settings();
    let juju = self.target.juju();
    let releases = GitHubReleases::new()?;

    match Driver::new(&juju, &releases, &settings).run().await? {
      Outcome::Passed => info!("aws-iam verification passed"),
      Outcome::Skipped { version } => info!("aws-iam verification skipped for k8s v{version}"),
    }

    Ok(())
  }
}
