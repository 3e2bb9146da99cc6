use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::{
  juju::{Model, Node},
  poll::{Poll, PollState},
  Error,
};

/// kubeconfig written by the control plane charm for the `ubuntu` user
pub const GENERATED_KUBECONFIG: &str = "/home/ubuntu/config";

/// Copy of the generated kubeconfig with the test principal filled in
pub const AWS_KUBECONFIG: &str = "/home/ubuntu/aws-kubeconfig";

/// Present once the aws-iam relation has added its user to the generated kubeconfig
pub const AWS_IAM_MARKER: &str = "aws-iam-user";

/// Placeholder the charm leaves where the principal ARN belongs
pub const ARN_PLACEHOLDER: &str = "<<insert_arn_here>>";

/// Budget for each command issued while patching
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the charm gets to inject its user into the generated kubeconfig
pub fn default_poll() -> Poll {
  Poll::new(6, Duration::from_secs(10))
}

/// Command that copies the generated kubeconfig and substitutes `arn` for the placeholder
pub fn patch_command(arn: &str) -> String {
  format!("cp {GENERATED_KUBECONFIG} {AWS_KUBECONFIG} && sed -i 's;{ARN_PLACEHOLDER};{arn};' {AWS_KUBECONFIG}")
}

/// Wait for the aws-iam user to appear in the generated kubeconfig, then write a
/// patched copy carrying the test principal
pub async fn patch_and_verify<M: Model>(node: &Node<'_, M>, arn: &str, poll: Poll) -> Result<()> {
  info!("patching and validating generated kubectl config file");

  let cat = format!("cat {GENERATED_KUBECONFIG}");
  let cat = cat.as_str();
  let state = poll
    .until("kubeconfig", || async move {
      let output = node.run(cat, COMMAND_TIMEOUT).await?;
      Ok(output.stdout.contains(AWS_IAM_MARKER).then_some(()))
    })
    .await?;

  match state {
    PollState::Found(()) => {
      node.run_completed(patch_command(arn), COMMAND_TIMEOUT).await?;
      info!("wrote {AWS_KUBECONFIG} for {arn}");
      Ok(())
    }
    PollState::Exhausted { attempts } | PollState::Polling { attempt: attempts } => Err(
      Error::MarkerNotFound {
        marker: AWS_IAM_MARKER,
        path: GENERATED_KUBECONFIG,
        attempts,
      }
      .into(),
    ),
  }
}
