use std::time::Duration;

use crate::{action::ActionStatus, auth::AuthOutcome};

/// Failures raised while driving the verification
///
/// These are carried through `anyhow::Result` so callers can add context, and
/// recovered with `downcast_ref` where the exact failure matters
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The remote command finished in a state other than `completed`
  #[error("command on {unit} finished with status {status}: {command}")]
  CommandNotCompleted {
    unit: String,
    command: String,
    status: ActionStatus,
  },

  /// A command did not return within its wall-clock budget
  #[error("command timed out after {}s: {command}", .timeout.as_secs())]
  CommandTimeout { command: String, timeout: Duration },

  /// The credential poll ran out of attempts without seeing the marker
  #[error("{marker} not found in {path} after {attempts} attempts")]
  MarkerNotFound {
    marker: &'static str,
    path: &'static str,
    attempts: u32,
  },

  /// An authenticated probe observed the opposite of what was expected
  #[error("expected {expected} for `kubectl {args}` but observed {observed}: {stderr}")]
  UnexpectedAuth {
    args: String,
    expected: &'static str,
    observed: AuthOutcome,
    stderr: String,
  },

  /// No release asset matched the requested platform
  #[error("no release asset found for platform {0}")]
  AssetNotFound(String),

  #[error("unable to parse version from {0:?}")]
  UnparsableVersion(String),

  #[error("application {0} not found in model")]
  UnknownApplication(String),

  #[error("application {0} has no units")]
  NoUnits(String),
}
