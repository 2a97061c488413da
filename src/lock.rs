//! The working-directory lock (spec.md §4.4/§5 I1): a single cross-process
//! mutex implemented as an OS-exclusive file handle via `fs2`, grounded in
//! `ecapuano-viberails`'s dependency table (the teacher itself has no
//! cross-process locking primitive — its toolchain installs are
//! single-instance by convention, not by enforced lock).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::UpdateError;

pub const FILENAME: &str = "update.lock";

pub struct WorkingDirLock {
    file: Option<File>,
    path: PathBuf,
}

impl WorkingDirLock {
    /// Open (creating if needed) and exclusively lock `<working_dir>/update.lock`.
    /// Fails `LockContended` if another holder already has it.
    pub fn acquire(working_dir: &Path) -> Result<Self, UpdateError> {
        crate::utils::fs::mkdirs(working_dir)
            .map_err(|e| UpdateError::misconfigured(format!("creating working directory: {e}")))?;
        let path = working_dir.join(FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| UpdateError::misconfigured(format!("opening lock file '{}': {e}", path.display())))?;
        file.try_lock_exclusive().map_err(|_| UpdateError::LockContended)?;
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    /// Release the lock and delete the lock file (clean release, spec.md §5).
    pub fn release(mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
            drop(file);
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for WorkingDirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
