mod archive;
mod download;
mod error;
mod github;
mod swap;
mod version;

use colored::Colorize;
use reqwest::blocking::Client;
use std::path::PathBuf;
use std::{env, fs};
use tracing::{debug, info};

use crate::config::{UpgradeSettings, load_config};
use crate::progress::{DownloadBar, err_style, ok_style, spinner};
use crate::prompt::{AssumeYes, Confirm, StdinPrompt};
use github::{fetch_latest_release, gh_client, release_info};

pub use archive::{EXECUTABLE_PREFIX, extract_executable};
pub use download::{Downloader, ProgressSnapshot};
pub use error::{SwapStep, UpgradeError};
pub use github::{Platform, ReleaseInfo};
pub use swap::{ReplacementPlan, StdFs, SwapFs, SwapOutcome, Swapper};
pub use version::{CURRENT_VERSION, is_older};

/// How a successful [`Upgrader::run_upgrade`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Nothing newer was published.
    AlreadyLatest { current: String, latest: String },
    /// A newer release exists but the user said no.
    Declined { latest: String },
    /// The executable on disk is now `version`.
    Upgraded {
        version: String,
        stale_backup: Option<PathBuf>,
    },
}

/// Sequences resolve, compare, confirm, download, extract and swap.
pub struct Upgrader {
    settings: UpgradeSettings,
    client: Client,
    target: (String, String),
    executable: Option<PathBuf>,
    show_progress: bool,
}

impl Upgrader {
    /// Targets the running platform and the running executable.
    pub fn new(settings: UpgradeSettings) -> Result<Self, UpgradeError> {
        let client = gh_client(settings.timeout())?;
        Ok(Self {
            settings,
            client,
            target: (env::consts::OS.to_string(), env::consts::ARCH.to_string()),
            executable: None,
            show_progress: true,
        })
    }

    /// Resolve releases for another OS/arch pair (Rust target names).
    pub fn target(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.target = (os.into(), arch.into());
        self
    }

    /// Replace `path` instead of the running executable.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn show_progress(mut self, on: bool) -> Self {
        self.show_progress = on;
        self
    }

    /// Fetch metadata for the newest release on this target.
    ///
    /// The platform is checked before any request is made.
    pub fn resolve_latest(&self) -> Result<ReleaseInfo, UpgradeError> {
        let platform = Platform::from_target(&self.target.0, &self.target.1)?;
        let release = fetch_latest_release(&self.client, &self.settings.api_url)?;
        let info = release_info(release, &platform, &self.settings.release_base);
        debug!(version = %info.version, url = %info.download_url, size = info.asset_size, "latest release");
        Ok(info)
    }

    /// The latest release, if it is newer than `current`.
    pub fn check(&self, current: &str) -> Result<Option<ReleaseInfo>, UpgradeError> {
        let latest = self.resolve_latest()?;
        Ok(is_older(current, &latest.version).then_some(latest))
    }

    /// Upgrade from `current` to the newest release.
    ///
    /// Any failure is returned as is; the previous executable stays
    /// runnable unless the error is [`UpgradeError::SwapRollback`].
    pub fn run_upgrade(
        &self,
        current: &str,
        confirm: &mut dyn Confirm,
    ) -> Result<UpgradeOutcome, UpgradeError> {
        let pb = spinner(self.show_progress, "checking version…");
        let latest = match self.resolve_latest() {
            Ok(latest) => {
                pb.set_style(ok_style());
                pb.finish_with_message(format!("latest release is {}", latest.version));
                latest
            }
            Err(e) => {
                pb.set_style(err_style());
                pb.finish_with_message("checking version failed");
                return Err(e);
            }
        };

        if !is_older(current, &latest.version) {
            println!("{}", format!("Current version {} is the latest", current).green());
            return Ok(UpgradeOutcome::AlreadyLatest {
                current: current.to_string(),
                latest: latest.version,
            });
        }

        println!("{}", format!("Current version is {}", current).red());
        println!(
            "{}",
            format!(
                "The latest version is {}, published at {}",
                latest.version,
                latest.published_local()
            )
            .green()
        );
        if !latest.changelog.trim().is_empty() {
            println!("{}", latest.changelog);
        }

        let yes = confirm
            .confirm("Do you want to upgrade (y/n)? ")
            .map_err(UpgradeError::Prompt)?;
        if !yes {
            info!(latest = %latest.version, "upgrade declined");
            return Ok(UpgradeOutcome::Declined {
                latest: latest.version,
            });
        }

        let exe = self.resolve_executable()?;
        let plan = ReplacementPlan::for_executable(&exe)?;

        println!("{}", format!("Download {}", latest.download_url).cyan());
        let downloader = Downloader::new(
            &self.client,
            self.settings.download_timeout(),
            self.settings.progress_interval(),
        );
        let bar = DownloadBar::new(self.show_progress);
        let archive = downloader.download(
            &latest.download_url,
            latest.asset_size,
            &|s: &ProgressSnapshot| bar.update(s),
        )?;

        let extracted = extract_executable(&archive, EXECUTABLE_PREFIX)?;
        drop(archive);
        println!(
            "{}",
            format!(
                "Executable file found. [name={}, size={:.2}MiB]",
                extracted.name,
                extracted.declared_size as f64 / 1024.0 / 1024.0
            )
            .green()
        );

        println!("{}", format!("Replace {}", plan.executable.display()).cyan());
        let outcome = Swapper::new().replace(&plan, &extracted.bytes)?;
        if let Some(stale) = &outcome.stale_backup {
            println!(
                "{}",
                format!("Could not remove {}, you can remove it manually", stale.display()).yellow()
            );
        }

        println!(
            "{}",
            format!("Successfully updated to version {}", latest.version).green()
        );
        Ok(UpgradeOutcome::Upgraded {
            version: latest.version,
            stale_backup: outcome.stale_backup,
        })
    }

    /// Canonical path of the file to replace, with symlinks followed.
    fn resolve_executable(&self) -> Result<PathBuf, UpgradeError> {
        let exe = match &self.executable {
            Some(p) => p.clone(),
            None => env::current_exe().map_err(UpgradeError::ExecutablePath)?,
        };
        let real = fs::canonicalize(&exe).map_err(UpgradeError::ExecutablePath)?;
        debug!(path = %real.display(), "resolved executable");
        Ok(real)
    }
}

/// Options of `cf upgrade`.
#[derive(Debug, Default, Clone)]
pub struct UpgradeOptions {
    /// Skip the confirmation prompt.
    pub yes: bool,
    /// Only report whether a newer release exists.
    pub check: bool,
    /// Overrides `timeout_secs` from the config file.
    pub timeout_secs: Option<u64>,
}

/// Upgrade `cf` itself to the latest release.
///
/// Process:
/// 1. Load `[upgrade]` settings from `config.toml` (defaults if absent).
/// 2. Fetch the latest release metadata and compare it with
///    [`CURRENT_VERSION`]. If nothing newer exists, stop.
/// 3. Show the changelog and ask for confirmation (unless `--yes`).
/// 4. Download the platform archive, extract the `cf` executable and swap
///    it in place of the running binary.
pub fn cmd_upgrade(opts: &UpgradeOptions) -> anyhow::Result<()> {
    let mut settings = load_config()?.upgrade;
    if let Some(secs) = opts.timeout_secs {
        settings.timeout_secs = secs;
    }
    let upgrader = Upgrader::new(settings)?;

    if opts.check {
        match upgrader.check(CURRENT_VERSION)? {
            Some(latest) => println!(
                "{} {} → {} (published at {})",
                "↑".yellow(),
                CURRENT_VERSION.dimmed(),
                latest.version.green(),
                latest.published_local()
            ),
            None => println!(
                "{} You're running the latest version ({})",
                "✔".green(),
                CURRENT_VERSION
            ),
        }
        return Ok(());
    }

    let mut confirm: Box<dyn Confirm> = if opts.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinPrompt)
    };
    upgrader.run_upgrade(CURRENT_VERSION, confirm.as_mut())?;
    Ok(())
}
