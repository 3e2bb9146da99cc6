use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  juju::{Model, Node},
  Error,
};

/// Latest aws-iam-authenticator release on GitHub
pub const LATEST_RELEASE_URL: &str =
  "https://api.github.com/repos/kubernetes-sigs/aws-iam-authenticator/releases/latest";

/// Asset name fragment for the control plane units
pub const PLATFORM: &str = "linux_amd64";

/// Where the authenticator is installed on the unit; the kubeconfig exec plugin expects it here
pub const AUTHENTICATOR_BIN: &str = "/usr/local/bin/aws-iam-authenticator";

/// Budget for each of the download and chmod commands
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// GitHub release, reduced to what is needed to locate a download
#[derive(Debug, Serialize, Deserialize)]
pub struct Release {
  #[serde(default)]
  pub tag_name: Option<String>,

  #[serde(default)]
  pub assets: Vec<Asset>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Asset {
  pub browser_download_url: String,
}

impl Release {
  /// Download URL of the first asset built for `platform`
  pub fn asset_url(&self, platform: &str) -> Result<&str> {
    self
      .assets
      .iter()
      .map(|asset| asset.browser_download_url.as_str())
      .find(|url| url.contains(platform))
      .ok_or_else(|| Error::AssetNotFound(platform.to_owned()).into())
  }
}

/// Source of authenticator releases
///
/// Trait wrapper to support testing
#[allow(async_fn_in_trait)]
pub trait ReleaseIndex {
  async fn latest(&self) -> Result<Release>;
}

/// Unauthenticated read of the GitHub releases API
#[derive(Debug)]
pub struct GitHubReleases {
  client: Client,
  url: String,
}

impl GitHubReleases {
  pub fn new() -> Result<Self> {
    // GitHub rejects API requests without a User-Agent
    let client = Client::builder()
      .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(30))
      .build()?;

    Ok(GitHubReleases {
      client,
      url: LATEST_RELEASE_URL.to_owned(),
    })
  }
}

impl ReleaseIndex for GitHubReleases {
  async fn latest(&self) -> Result<Release> {
    debug!("GET {}", self.url);
    let release = self
      .client
      .get(&self.url)
      .send()
      .await?
      .error_for_status()?
      .json::<Release>()
      .await?;

    Ok(release)
  }
}

/// Download the latest authenticator for `PLATFORM` onto the node and make it executable
pub async fn install_authenticator<M: Model, R: ReleaseIndex>(node: &Node<'_, M>, releases: &R) -> Result<()> {
  info!("getting aws-iam-authenticator binary");
  let release = releases.latest().await?;
  let url = release.asset_url(PLATFORM)?;
  info!(
    "installing {} from {url}",
    release.tag_name.as_deref().unwrap_or("latest release")
  );

  node
    .run_completed(format!("wget -q -nv -O {AUTHENTICATOR_BIN} {url}"), COMMAND_TIMEOUT)
    .await?;
  node
    .run_completed(format!("chmod a+x {AUTHENTICATOR_BIN}"), COMMAND_TIMEOUT)
    .await?;

  Ok(())
}
