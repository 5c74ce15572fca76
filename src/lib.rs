//! Crate entry point for **cf-tool (cf)**.
//!
//! This library holds the self-upgrade machinery behind `cf upgrade`:
//! release lookup, archive download and extraction, and the on-disk swap of
//! the running executable. The `pub use` re-exports make the commands and
//! the upgrade building blocks reachable from the crate root.

mod config;
mod paths;
mod progress;
mod prompt;
mod upgrade;

pub use config::{Config, UpgradeSettings, load_config, load_config_from};
pub use paths::{Paths, cf_home, paths};
pub use prompt::{AssumeYes, Confirm, StdinPrompt};
pub use upgrade::{
    CURRENT_VERSION, Downloader, EXECUTABLE_PREFIX, Platform, ProgressSnapshot, ReleaseInfo,
    ReplacementPlan, StdFs, SwapFs, SwapOutcome, SwapStep, Swapper, UpgradeError, UpgradeOptions,
    UpgradeOutcome, Upgrader, cmd_upgrade, extract_executable, is_older,
};
