use chrono::{DateTime, Local, Utc};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::debug;

use super::error::UpgradeError;

/// Name used in release asset file names.
pub const TOOL_NAME: &str = "cf-tool";

/// Raw release metadata as returned by the releases API.
#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
pub struct Asset {
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// What the orchestrator needs to know about the newest release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: String,
    pub changelog: String,
    pub published_at: DateTime<Utc>,
    pub download_url: String,
    /// Zero when the asset list has no entry for `download_url`.
    pub asset_size: u64,
}

impl ReleaseInfo {
    /// Publish time in local time, `YYYY-MM-DD HH:MM`.
    pub fn published_local(&self) -> String {
        self.published_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

/// A target in the release naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    /// Map Rust target names (`std::env::consts`) into release names.
    pub fn from_target(os: &str, arch: &str) -> Result<Self, UpgradeError> {
        let unsupported = || UpgradeError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let os_name = match os {
            "macos" => "darwin",
            "linux" => "linux",
            "windows" => "windows",
            _ => return Err(unsupported()),
        };
        let arch_name = match arch {
            "x86" => "386",
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            _ => return Err(unsupported()),
        };
        Ok(Self {
            os: os_name,
            arch: arch_name,
        })
    }

    pub fn current() -> Result<Self, UpgradeError> {
        Self::from_target(env::consts::OS, env::consts::ARCH)
    }

    /// `cf-tool_<version>_<os>_<arch>.tar.gz` for the given tag.
    pub fn asset_name(&self, tag: &str) -> String {
        let version = tag.strip_prefix('v').unwrap_or(tag);
        format!("{}_{}_{}_{}.tar.gz", TOOL_NAME, version, self.os, self.arch)
    }

    /// Download URL for this platform's archive, built from the tag rather
    /// than taken from the metadata.
    pub fn download_url(&self, release_base: &str, tag: &str) -> String {
        format!(
            "{}/{}/{}",
            release_base.trim_end_matches('/'),
            tag,
            self.asset_name(tag)
        )
    }
}

/// Build the shared blocking client.
///
/// `timeout` bounds every request unless a request sets its own.
pub fn gh_client(timeout: Duration) -> Result<Client, UpgradeError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("cf-tool-upgrader/", env!("CARGO_PKG_VERSION"))),
    );
    if let Ok(tok) = env::var("GITHUB_TOKEN")
        && let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", tok))
    {
        headers.insert(AUTHORIZATION, value);
    }
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(UpgradeError::Client)
}

/// GET the metadata document and decode it.
pub fn fetch_latest_release(client: &Client, api_url: &str) -> Result<Release, UpgradeError> {
    debug!(url = api_url, "fetching release metadata");
    let network = |source| UpgradeError::Network {
        url: api_url.to_string(),
        source,
    };
    let text = client
        .get(api_url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.text())
        .map_err(network)?;
    serde_json::from_str(&text).map_err(UpgradeError::MalformedMetadata)
}

/// Reduce raw metadata to the fields one platform needs.
pub fn release_info(release: Release, platform: &Platform, release_base: &str) -> ReleaseInfo {
    let download_url = platform.download_url(release_base, &release.tag_name);
    let asset_size = release
        .assets
        .iter()
        .find(|a| a.browser_download_url == download_url)
        .map(|a| a.size)
        .unwrap_or(0);
    if asset_size == 0 {
        debug!(url = %download_url, "no matching asset entry, total size unknown");
    }
    ReleaseInfo {
        version: release.tag_name,
        changelog: release.body.unwrap_or_default(),
        published_at: release.published_at,
        download_url,
        asset_size,
    }
}
