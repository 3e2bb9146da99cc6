use tracing::warn;

/// Placeholder principal used when `TEST_ARN` is not provided; not a real role
pub const FALLBACK_TEST_ARN: &str = "arn:aws:iam::xxxxxxxx:role/k8s-view-role";

/// Placeholder access key id; authentication against AWS will fail with it
pub const FALLBACK_ACCESS_KEY_ID: &str = "DEADBEEFDEADBEEF";

/// Placeholder secret access key; authentication against AWS will fail with it
pub const FALLBACK_SECRET_ACCESS_KEY: &str = "INVALIDKEYINVALIDKEYINVALIDKEY";

/// AWS credentials exported to `kubectl` when probing through the authenticator
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  pub access_key_id: String,
  pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("access_key_id", &self.access_key_id)
      .field("secret_access_key", &"<redacted>")
      .finish()
  }
}

/// Settings resolved once at startup and handed to the driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
  /// IAM principal mapped to `test-user` inside the cluster
  pub test_arn: String,

  pub credentials: Credentials,

  /// Control plane application whose units receive the remote commands
  pub master_app: String,

  /// Charm deployed for the add-on
  pub charm: String,

  /// Leave the add-on deployed and RBAC enabled when the run fails
  pub keep_on_failure: bool,
}

/// Treat unset and empty values the same way
fn present(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

/// Resolve the test principal, falling back to a placeholder ARN
pub fn resolve_test_arn(test_arn: Option<String>) -> String {
  present(test_arn).unwrap_or_else(|| {
    warn!("Using bogus arn {FALLBACK_TEST_ARN}");
    FALLBACK_TEST_ARN.to_owned()
  })
}

/// Resolve the AWS credentials, falling back to placeholders that cannot authenticate
pub fn resolve_credentials(access_key_id: Option<String>, secret_access_key: Option<String>) -> Credentials {
  let access_key_id = present(access_key_id).unwrap_or_else(|| {
    warn!("Invalid key ID being used");
    FALLBACK_ACCESS_KEY_ID.to_owned()
  });

  let secret_access_key = present(secret_access_key).unwrap_or_else(|| {
    warn!("Invalid key being used");
    FALLBACK_SECRET_ACCESS_KEY.to_owned()
  });

  Credentials {
    access_key_id,
    secret_access_key,
  }
}
