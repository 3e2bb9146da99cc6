use std::{fmt, time::Duration};

use anyhow::Result;
use tracing::info;

use crate::{
  config::Credentials,
  juju::{Model, Node, RemoteCommand},
  kubeconfig::AWS_KUBECONFIG,
  manifest::KUBECTL,
  Error,
};

/// Budget for each authenticated `kubectl` invocation
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Substrings in kubectl stderr that mean the request was not served
pub const FAILURE_MARKERS: [&str; 3] = ["invalid user credentials", "error", "forbidden"];

/// kubeconfig context that authenticates through `aws-iam-authenticator`
const AUTH_CONTEXT: &str = "aws-iam-authenticator";

/// How the API server treated an authenticated request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
  /// No failure marker in the output
  Authorized,
  /// Credentials were rejected or RBAC denied the request
  Forbidden,
  /// Some other error was reported
  Unknown,
}

impl fmt::Display for AuthOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let outcome = match self {
      AuthOutcome::Authorized => "authorized",
      AuthOutcome::Forbidden => "forbidden",
      AuthOutcome::Unknown => "unknown error",
    };
    write!(f, "{outcome}")
  }
}

/// Classify a request from its stderr
///
/// Matching is case-insensitive. `Authorized` is returned only if none of
/// `FAILURE_MARKERS` is present.
pub fn classify(stderr: &str) -> AuthOutcome {
  let text = stderr.to_lowercase();

  if text.contains("forbidden") || text.contains("invalid user credentials") {
    AuthOutcome::Forbidden
  } else if FAILURE_MARKERS.iter().any(|marker| text.contains(marker)) {
    AuthOutcome::Unknown
  } else {
    AuthOutcome::Authorized
  }
}

/// Command that runs kubectl through the authenticator with `credentials` in the environment
///
/// The secret access key is masked wherever the command is displayed
pub fn probe_command(credentials: &Credentials, args: &str) -> RemoteCommand {
  RemoteCommand::new(format!(
    "AWS_ACCESS_KEY_ID={} AWS_SECRET_ACCESS_KEY={} {KUBECTL} --context={AUTH_CONTEXT} --kubeconfig {AWS_KUBECONFIG} {args}",
    credentials.access_key_id, credentials.secret_access_key,
  ))
  .masking(&credentials.secret_access_key)
}

/// Run `kubectl <args>` on the node as the test principal and return the lower-cased stderr
pub async fn run_auth<M: Model>(node: &Node<'_, M>, credentials: &Credentials, args: &str) -> Result<String> {
  let output = node
    .run_completed(probe_command(credentials, args), PROBE_TIMEOUT)
    .await?;

  Ok(output.stderr.to_lowercase())
}

/// Require that `kubectl <args>` is served for the test principal
pub async fn verify_auth_success<M: Model>(node: &Node<'_, M>, credentials: &Credentials, args: &str) -> Result<()> {
  let stderr = run_auth(node, credentials, args).await?;

  match classify(&stderr) {
    AuthOutcome::Authorized => {
      info!("kubectl {args}: authorized as expected");
      Ok(())
    }
    observed => Err(
      Error::UnexpectedAuth {
        args: args.to_owned(),
        expected: "authorized",
        observed,
        stderr: stderr.trim().to_owned(),
      }
      .into(),
    ),
  }
}

/// Require that `kubectl <args>` is refused for the test principal
pub async fn verify_auth_failure<M: Model>(node: &Node<'_, M>, credentials: &Credentials, args: &str) -> Result<()> {
  let stderr = run_auth(node, credentials, args).await?;

  match classify(&stderr) {
    AuthOutcome::Authorized => Err(
      Error::UnexpectedAuth {
        args: args.to_owned(),
        expected: "a refusal",
        observed: AuthOutcome::Authorized,
        stderr: stderr.trim().to_owned(),
      }
      .into(),
    ),
    observed => {
      info!("kubectl {args}: {observed} as expected");
      Ok(())
    }
  }
}
