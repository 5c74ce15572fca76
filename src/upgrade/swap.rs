use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::{RollbackFailure, SwapStep, UpgradeError};

/// File operations the swap is built from.
///
/// Production code uses [`StdFs`]; tests substitute failing implementations
/// to drive the rollback paths.
pub trait SwapFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Create or truncate `path`, write `contents` and mark it executable.
    fn write_executable(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`SwapFs`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl SwapFs for StdFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn write_executable(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        f.write_all(contents)?;
        f.sync_all()?;
        make_executable(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

#[cfg(unix)]
fn make_executable(p: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perm = fs::metadata(p)?.permissions();
    perm.set_mode(0o755);
    fs::set_permissions(p, perm)
}
#[cfg(not(unix))]
fn make_executable(_p: &Path) -> io::Result<()> {
    Ok(())
}

/// The three sibling paths a swap touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementPlan {
    pub executable: PathBuf,
    /// `.<name>.old` next to the executable.
    pub backup: PathBuf,
    /// `.<name>.new` next to the executable.
    pub staging: PathBuf,
}

impl ReplacementPlan {
    /// `executable` should already be canonical so the siblings land on the
    /// same filesystem as the real file.
    pub fn for_executable(executable: &Path) -> Result<Self, UpgradeError> {
        let name = executable.file_name().ok_or_else(|| {
            UpgradeError::ExecutablePath(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", executable.display()),
            ))
        })?;
        let name = name.to_string_lossy();
        Ok(Self {
            executable: executable.to_path_buf(),
            backup: executable.with_file_name(format!(".{}.old", name)),
            staging: executable.with_file_name(format!(".{}.new", name)),
        })
    }
}

/// Where a swap stands. Only `Initial` and `Committed` are observable after
/// [`Swapper::replace`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// Only the original executable exists.
    Initial,
    /// The original has been renamed to the backup path.
    BackedUp,
    /// The new executable has been written to the staging path.
    Staged,
    /// The staging file occupies the executable path.
    Committed,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Set when the backup could not be removed after a successful commit.
    pub stale_backup: Option<PathBuf>,
}

/// Replaces an executable on disk, rolling back on failure.
#[derive(Debug, Default)]
pub struct Swapper<F = StdFs> {
    fs: F,
}

impl Swapper<StdFs> {
    pub fn new() -> Self {
        Self { fs: StdFs }
    }
}

impl<F: SwapFs> Swapper<F> {
    pub fn with_fs(fs: F) -> Self {
        Self { fs }
    }

    /// Put `bytes` at `plan.executable`.
    ///
    /// On error the original executable is back at its path unless the
    /// error is [`UpgradeError::SwapRollback`], which names where the backup
    /// was left.
    pub fn replace(
        &self,
        plan: &ReplacementPlan,
        bytes: &[u8],
    ) -> Result<SwapOutcome, UpgradeError> {
        let mut state = SwapState::Initial;
        while state != SwapState::Committed {
            state = self.advance(plan, state, bytes)?;
            debug!(?state, "swap advanced");
        }
        Ok(self.finish(plan))
    }

    fn advance(
        &self,
        plan: &ReplacementPlan,
        state: SwapState,
        bytes: &[u8],
    ) -> Result<SwapState, UpgradeError> {
        match state {
            SwapState::Initial => {
                info!(backup = %plan.backup.display(), "moving current executable aside");
                self.fs
                    .rename(&plan.executable, &plan.backup)
                    .map_err(|source| UpgradeError::Swap {
                        step: SwapStep::Backup,
                        source,
                    })?;
                Ok(SwapState::BackedUp)
            }
            SwapState::BackedUp => {
                info!(staging = %plan.staging.display(), "writing new executable");
                match self.fs.write_executable(&plan.staging, bytes) {
                    Ok(()) => Ok(SwapState::Staged),
                    // a partial staging file may be on disk
                    Err(e) => Err(self.roll_back(plan, SwapState::Staged, SwapStep::Stage, e)),
                }
            }
            SwapState::Staged => {
                info!(path = %plan.executable.display(), "moving new executable into place");
                match self.fs.rename(&plan.staging, &plan.executable) {
                    Ok(()) => Ok(SwapState::Committed),
                    Err(e) => Err(self.roll_back(plan, SwapState::Staged, SwapStep::Commit, e)),
                }
            }
            SwapState::Committed => Ok(SwapState::Committed),
        }
    }

    /// Walk back from `from` to `Initial` and build the error to return.
    fn roll_back(
        &self,
        plan: &ReplacementPlan,
        from: SwapState,
        step: SwapStep,
        source: io::Error,
    ) -> UpgradeError {
        warn!(%step, error = %source, "swap failed, rolling back");
        let mut failures = Vec::new();
        if from == SwapState::Staged
            && let Err(f) = self.unstage(plan)
        {
            failures.push(f);
        }
        if let Err(f) = self.restore(plan) {
            failures.push(f);
        }

        if failures.is_empty() {
            UpgradeError::Swap { step, source }
        } else {
            UpgradeError::SwapRollback {
                step,
                source,
                rollback: failures,
                backup: plan.backup.clone(),
            }
        }
    }

    /// Staged -> BackedUp.
    fn unstage(&self, plan: &ReplacementPlan) -> Result<(), RollbackFailure> {
        match self.fs.remove_file(&plan.staging) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RollbackFailure {
                action: "remove",
                path: plan.staging.clone(),
                source,
            }),
        }
    }

    /// BackedUp -> Initial.
    fn restore(&self, plan: &ReplacementPlan) -> Result<(), RollbackFailure> {
        info!(path = %plan.executable.display(), "restoring previous executable");
        self.fs
            .rename(&plan.backup, &plan.executable)
            .map_err(|source| RollbackFailure {
                action: "restore",
                path: plan.backup.clone(),
                source,
            })
    }

    fn finish(&self, plan: &ReplacementPlan) -> SwapOutcome {
        match self.fs.remove_file(&plan.backup) {
            Ok(()) => SwapOutcome::default(),
            Err(e) => {
                warn!(
                    path = %plan.backup.display(),
                    error = %e,
                    "could not remove previous executable"
                );
                SwapOutcome {
                    stale_backup: Some(plan.backup.clone()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    /// Delegates to `std::fs` except for the operations it is told to fail.
    #[derive(Default)]
    struct FaultyFs {
        partial_write: bool,
        rename_from: Vec<PathBuf>,
        remove: Option<PathBuf>,
    }

    fn injected() -> io::Error {
        io::Error::other("injected failure")
    }

    impl SwapFs for FaultyFs {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if self.rename_from.iter().any(|p| p == from) {
                return Err(injected());
            }
            StdFs.rename(from, to)
        }

        fn write_executable(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            if self.partial_write {
                fs::write(path, &contents[..contents.len() / 2])?;
                return Err(injected());
            }
            StdFs.write_executable(path, contents)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            if self.remove.as_deref() == Some(path) {
                return Err(injected());
            }
            StdFs.remove_file(path)
        }
    }

    fn setup() -> (TempDir, ReplacementPlan) {
        let td = tempdir().unwrap();
        let exe = td.path().join("cf");
        fs::write(&exe, b"old binary").unwrap();
        let plan = ReplacementPlan::for_executable(&exe).unwrap();
        (td, plan)
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut v: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        v.sort();
        v
    }

    #[test]
    fn plan_uses_hidden_siblings() {
        let plan = ReplacementPlan::for_executable(Path::new("/opt/bin/cf")).unwrap();
        assert_eq!(plan.backup, Path::new("/opt/bin/.cf.old"));
        assert_eq!(plan.staging, Path::new("/opt/bin/.cf.new"));
    }

    #[test]
    fn plan_rejects_path_without_file_name() {
        let err = ReplacementPlan::for_executable(Path::new("/")).unwrap_err();
        assert!(matches!(err, UpgradeError::ExecutablePath(_)));
    }

    #[test]
    fn replace_installs_new_bytes_and_drops_backup() {
        let (td, plan) = setup();
        let out = Swapper::new().replace(&plan, b"new binary").unwrap();
        assert_eq!(out, SwapOutcome::default());
        assert_eq!(fs::read(&plan.executable).unwrap(), b"new binary");
        assert_eq!(names_in(td.path()), vec!["cf"]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&plan.executable).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn replace_overwrites_stale_siblings() {
        let (td, plan) = setup();
        fs::write(&plan.staging, b"leftover from a crash, much longer than the new one").unwrap();
        fs::write(&plan.backup, b"ancient").unwrap();
        Swapper::new().replace(&plan, b"new binary").unwrap();
        assert_eq!(fs::read(&plan.executable).unwrap(), b"new binary");
        assert_eq!(names_in(td.path()), vec!["cf"]);
    }

    #[test]
    fn missing_executable_fails_before_touching_anything() {
        let td = tempdir().unwrap();
        let plan = ReplacementPlan::for_executable(&td.path().join("cf")).unwrap();
        let err = Swapper::new().replace(&plan, b"new").unwrap_err();
        assert!(matches!(
            err,
            UpgradeError::Swap {
                step: SwapStep::Backup,
                ..
            }
        ));
        assert!(names_in(td.path()).is_empty());
    }

    #[test]
    fn failed_stage_restores_original_bytes() {
        let (td, plan) = setup();
        let swapper = Swapper::with_fs(FaultyFs {
            partial_write: true,
            ..Default::default()
        });
        let err = swapper.replace(&plan, b"new binary").unwrap_err();
        assert!(matches!(
            err,
            UpgradeError::Swap {
                step: SwapStep::Stage,
                ..
            }
        ));
        assert_eq!(fs::read(&plan.executable).unwrap(), b"old binary");
        assert_eq!(names_in(td.path()), vec!["cf"]);
    }

    #[test]
    fn failed_commit_removes_staging_and_restores_backup() {
        let (td, plan) = setup();
        let swapper = Swapper::with_fs(FaultyFs {
            rename_from: vec![plan.staging.clone()],
            ..Default::default()
        });
        let err = swapper.replace(&plan, b"new binary").unwrap_err();
        assert!(matches!(
            err,
            UpgradeError::Swap {
                step: SwapStep::Commit,
                ..
            }
        ));
        assert_eq!(fs::read(&plan.executable).unwrap(), b"old binary");
        assert_eq!(names_in(td.path()), vec!["cf"]);
    }

    #[test]
    fn failed_restore_reports_both_errors() {
        let (td, plan) = setup();
        let swapper = Swapper::with_fs(FaultyFs {
            partial_write: true,
            rename_from: vec![plan.backup.clone()],
            ..Default::default()
        });
        let err = swapper.replace(&plan, b"new binary").unwrap_err();
        let msg = err.to_string();
        match err {
            UpgradeError::SwapRollback {
                step,
                rollback,
                backup,
                ..
            } => {
                assert_eq!(step, SwapStep::Stage);
                assert_eq!(rollback.len(), 1);
                assert_eq!(rollback[0].action, "restore");
                assert_eq!(backup, plan.backup);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(msg.contains("writing the new executable"), "{msg}");
        assert!(msg.contains(".cf.old"), "{msg}");
        // the previous executable survives under its backup name
        assert_eq!(fs::read(&plan.backup).unwrap(), b"old binary");
        assert_eq!(names_in(td.path()), vec![".cf.old"]);
    }

    #[test]
    fn failed_cleanup_still_succeeds() {
        let (td, plan) = setup();
        let swapper = Swapper::with_fs(FaultyFs {
            remove: Some(plan.backup.clone()),
            ..Default::default()
        });
        let out = swapper.replace(&plan, b"new binary").unwrap();
        assert_eq!(out.stale_backup.as_deref(), Some(plan.backup.as_path()));
        assert_eq!(fs::read(&plan.executable).unwrap(), b"new binary");
        assert_eq!(names_in(td.path()), vec![".cf.old", "cf"]);
    }
}
