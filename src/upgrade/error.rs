use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a self-upgrade.
///
/// Every variant except [`UpgradeError::SwapRollback`] leaves the previous
/// executable runnable at its original path.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed release metadata: {0}")]
    MalformedMetadata(#[source] serde_json::Error),

    #[error("download of {url} interrupted: {source}")]
    Transfer {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("archive is corrupt: {0}")]
    ArchiveCorrupt(#[source] io::Error),

    #[error("archive does not contain an executable starting with `{prefix}`")]
    ExecutableNotFound { prefix: String },

    #[error("cannot locate the running executable: {0}")]
    ExecutablePath(#[source] io::Error),

    #[error("failed to read confirmation: {0}")]
    Prompt(#[source] io::Error),

    #[error("{step} failed: {source}")]
    Swap {
        step: SwapStep,
        #[source]
        source: io::Error,
    },

    #[error(
        "{step} failed: {source}; rollback also failed ({}); the previous executable may be at {}",
        join_failures(.rollback),
        .backup.display()
    )]
    SwapRollback {
        step: SwapStep,
        #[source]
        source: io::Error,
        rollback: Vec<RollbackFailure>,
        backup: PathBuf,
    },
}

/// Forward transitions of the binary swap, named for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    Backup,
    Stage,
    Commit,
}

impl fmt::Display for SwapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwapStep::Backup => "moving the current executable aside",
            SwapStep::Stage => "writing the new executable",
            SwapStep::Commit => "moving the new executable into place",
        })
    }
}

/// One backward transition that could not be completed.
#[derive(Debug)]
pub struct RollbackFailure {
    pub action: &'static str,
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.path.display(), self.source)
    }
}

fn join_failures(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
