//! C4: the install manager (spec.md §4.4) — owns the working-directory
//! lock and implements the prune/unlink/apply-latest/launch-latest state
//! transitions. Builder follows the teacher's `setter!` convention (see
//! `core::update::UpdateOpt` for the pattern this is modeled on).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::UpdateError;
use crate::lock::WorkingDirLock;
use crate::logging;
use crate::process;
use crate::sentinel;
use crate::version::Version;
use crate::{layout, lock, utils};

const DEFAULT_CURRENT_DIR_NAME: &str = "current";
const DEFAULT_PROCESS_KILL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ManagerBuilder {
    working_dir: PathBuf,
    current_dir_name: String,
    current_version: Version,
    retained_paths: Vec<PathBuf>,
    process_kill_timeout: Duration,
}

impl ManagerBuilder {
    /// `current_version` is the version of the binary currently running
    /// this process — distinct from whatever the `current` directory's
    /// sentinel records, and used both for self-healing and for
    /// `launch_latest`'s "is a newer version available" check.
    pub fn new(working_dir: impl Into<PathBuf>, current_version: Version) -> Self {
        Self {
            working_dir: working_dir.into(),
            current_dir_name: DEFAULT_CURRENT_DIR_NAME.to_string(),
            current_version,
            retained_paths: Vec::new(),
            process_kill_timeout: DEFAULT_PROCESS_KILL_TIMEOUT,
        }
    }

    crate::setter!(current_dir_name, String);
    crate::setter!(process_kill_timeout, Duration);

    /// Declare paths (relative to the current directory) that must survive
    /// `apply_latest`. Absolute paths are `Misconfigured`.
    pub fn retained_paths(mut self, paths: Vec<PathBuf>) -> Result<Self, UpdateError> {
        if let Some(bad) = paths.iter().find(|p| p.is_absolute()) {
            return Err(UpdateError::misconfigured(format!(
                "retained path '{}' must be relative",
                bad.display()
            )));
        }
        self.retained_paths = paths;
        Ok(self)
    }

    pub fn build(self) -> Manager {
        Manager {
            working_dir: self.working_dir,
            current_dir_name: self.current_dir_name,
            current_version: self.current_version,
            retained_paths: self.retained_paths,
            process_kill_timeout: self.process_kill_timeout,
            lock: Mutex::new(None),
            lock_held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build and immediately acquire the working-directory lock.
    pub fn open(self) -> Result<Manager, UpdateError> {
        let manager = self.build();
        manager.acquire_lock()?;
        Ok(manager)
    }
}

pub struct Manager {
    working_dir: PathBuf,
    current_dir_name: String,
    current_version: Version,
    retained_paths: Vec<PathBuf>,
    process_kill_timeout: Duration,
    lock: Mutex<Option<WorkingDirLock>>,
    lock_held: Arc<AtomicBool>,
}

impl Manager {
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn current_dir(&self) -> PathBuf {
        self.working_dir.join(&self.current_dir_name)
    }

    /// The version of the binary currently running this process, as
    /// supplied to [`ManagerBuilder::new`] — not to be confused with
    /// whatever the current directory's sentinel records.
    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    /// Acquire the working-directory lock if not already held. Idempotent:
    /// a Manager that already holds the lock returns `Ok(())`.
    pub fn acquire_lock(&self) -> Result<(), UpdateError> {
        let mut guard = self.lock.lock().expect("lock mutex poisoned");
        if guard.is_some() {
            return Ok(());
        }
        let acquired = WorkingDirLock::acquire(&self.working_dir)?;
        *guard = Some(acquired);
        self.lock_held.store(true, Ordering::SeqCst);
        drop(guard);
        self.self_heal_current_sentinel();
        Ok(())
    }

    pub fn release_lock(&self) {
        let mut guard = self.lock.lock().expect("lock mutex poisoned");
        if let Some(held) = guard.take() {
            held.release();
        }
        self.lock_held.store(false, Ordering::SeqCst);
    }

    /// Safe to call from another thread while an update runs elsewhere
    /// (spec.md §5's parallel-safe surface).
    pub fn has_lock(&self) -> bool {
        self.lock_held.load(Ordering::SeqCst)
    }

    fn self_heal_current_sentinel(&self) {
        let Some(exe) = process::current_executable() else {
            return;
        };
        let current_dir = self.current_dir();
        if exe.starts_with(&current_dir) {
            logging::ignore_failure(
                "self-heal current directory sentinel",
                sentinel::write(&current_dir, &self.current_version),
            );
        }
    }

    fn ancestor_under_working_dir(&self, exe: &Path) -> Option<PathBuf> {
        utils::fs::children(&self.working_dir)
            .into_iter()
            .find(|child| exe.starts_with(child))
    }

    /// Same scan as C3's `enumerate_versions`, excluding the current
    /// directory (spec.md §4.4).
    pub fn latest_available_update(&self) -> Option<(Version, PathBuf)> {
        layout::enumerate_versions(&self.working_dir, &[self.current_dir_name.as_str()])
    }

    fn remove_tree(&self, path: &Path) -> Result<(), UpdateError> {
        process::signal_and_wait(path, self.process_kill_timeout);
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        result.map_err(|e| {
            UpdateError::layout_inconsistent(format!("removing '{}': {e}", path.display()))
        })
    }

    /// Remove every child of the working directory except the lock file
    /// and the ancestor of the currently-executing process, if any.
    pub fn unlink(&self) -> Result<(), UpdateError> {
        let retain = process::current_executable()
            .and_then(|exe| self.ancestor_under_working_dir(&exe));

        for child in utils::fs::children(&self.working_dir) {
            if child.file_name().and_then(|n| n.to_str()) == Some(lock::FILENAME) {
                continue;
            }
            if Some(&child) == retain.as_ref() {
                continue;
            }
            self.remove_tree(&child)?;
        }
        Ok(())
    }

    /// Remove every child except the lock, the current directory, the
    /// directory naming the current version, the latest available update,
    /// and the ancestor of the current process.
    pub fn prune(&self) -> Result<(), UpdateError> {
        let retain_ancestor = process::current_executable()
            .and_then(|exe| self.ancestor_under_working_dir(&exe));
        let current_dir = self.current_dir();
        let current_version_dir = self.working_dir.join(self.current_version.to_string());
        let latest_update_dir = self.latest_available_update().map(|(_, path)| path);

        for child in utils::fs::children(&self.working_dir) {
            if child.file_name().and_then(|n| n.to_str()) == Some(lock::FILENAME) {
                continue;
            }
            if child == current_dir || child == current_version_dir {
                continue;
            }
            if Some(&child) == latest_update_dir.as_ref() {
                continue;
            }
            if Some(&child) == retain_ancestor.as_ref() {
                continue;
            }
            self.remove_tree(&child)?;
        }
        Ok(())
    }

    fn is_newer_version_pending(&self) -> bool {
        let newer_via_layout = self
            .latest_available_update()
            .map(|(v, _)| v > self.current_version)
            .unwrap_or(false);

        let running_inside_current = process::current_executable()
            .map(|exe| exe.starts_with(self.current_dir()))
            .unwrap_or(false);
        let newer_via_current_sentinel = !running_inside_current
            && sentinel::read(&self.current_dir())
                .map(|v| v > self.current_version)
                .unwrap_or(false);

        newer_via_layout || newer_via_current_sentinel
    }

    /// Called from the main process. Stages the launcher into fresh
    /// `.tmp/<rand>` scratch space, releases the lock, and starts it
    /// detached. Returns `false` (lock retained) if no newer version is
    /// pending.
    pub fn launch_latest(
        &self,
        launcher_binary: &Path,
        dependent_files: &[PathBuf],
        args: &[String],
    ) -> Result<bool, UpdateError> {
        if !self.is_newer_version_pending() {
            return Ok(false);
        }

        let tmp_root = self.working_dir.join(".tmp");
        utils::fs::mkdirs(&tmp_root)
            .map_err(|e| UpdateError::misconfigured(format!("creating .tmp staging root: {e}")))?;
        let staging_dir = tempfile::Builder::new()
            .prefix("")
            .tempdir_in(&tmp_root)
            .map_err(|e| UpdateError::misconfigured(format!("creating launcher staging dir: {e}")))?
            .into_path();

        let launcher_name = launcher_binary
            .file_name()
            .ok_or_else(|| UpdateError::misconfigured("launcher binary path has no filename"))?;
        let staged_launcher = staging_dir.join(launcher_name);
        utils::fs::copy_to(launcher_binary, &staged_launcher)
            .map_err(|e| UpdateError::misconfigured(format!("staging launcher binary: {e}")))?;
        utils::fs::make_executable(&staged_launcher)
            .map_err(|e| UpdateError::misconfigured(format!("marking launcher executable: {e}")))?;

        for dependent in dependent_files {
            let name = dependent.file_name().ok_or_else(|| {
                UpdateError::misconfigured("dependent file path has no filename")
            })?;
            utils::fs::copy_to(dependent, &staging_dir.join(name))
                .map_err(|e| UpdateError::misconfigured(format!("staging dependent file: {e}")))?;
        }

        self.release_lock();

        process::spawn_detached(&staged_launcher, args)
            .map_err(|e| UpdateError::misconfigured(format!("starting launcher: {e}")))?;

        Ok(true)
    }

    fn move_retained_files(&self, current_dir: &Path, update_dir: &Path) -> Result<(), UpdateError> {
        if !current_dir.exists() {
            return Ok(());
        }
        for relative in &self.retained_paths {
            let src = current_dir.join(relative);
            if !src.exists() {
                continue;
            }
            let dst = update_dir.join(relative);
            if dst.exists() {
                // The update already ships this path; the update wins.
                continue;
            }
            utils::fs::move_to(&src, &dst).map_err(|e| {
                UpdateError::layout_inconsistent(format!(
                    "moving retained file '{}': {e}",
                    relative.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Called from the launcher process. Promotes the latest available
    /// update into the current directory via a single atomic rename,
    /// carrying retained files across first. Idempotent: a second call
    /// with no newer update returns `None`.
    pub fn apply_latest(&self, kill_processes: bool) -> Result<Option<Version>, UpdateError> {
        let current_dir = self.current_dir();
        let current_version = sentinel::read(&current_dir);

        let Some((update_version, update_dir)) = self.latest_available_update() else {
            return Ok(None);
        };
        let is_newer = match &current_version {
            Some(v) => update_version > *v,
            None => true,
        };
        if !is_newer {
            return Ok(None);
        }

        if kill_processes {
            let current_exited = process::signal_and_wait(&current_dir, self.process_kill_timeout);
            let update_exited = process::signal_and_wait(&update_dir, self.process_kill_timeout);
            if !current_exited || !update_exited {
                return Err(UpdateError::ProcessesLingering(
                    self.working_dir.display().to_string(),
                ));
            }
        }

        self.move_retained_files(&current_dir, &update_dir)?;

        if current_dir.exists() {
            std::fs::remove_dir_all(&current_dir).map_err(|e| {
                UpdateError::layout_inconsistent(format!("removing current directory: {e}"))
            })?;
        }

        std::fs::rename(&update_dir, &current_dir).map_err(|e| {
            UpdateError::layout_inconsistent(format!("committing update directory: {e}"))
        })?;

        Ok(Some(update_version))
    }

    /// Launch a binary inside the current directory, detached, then
    /// release the lock. Refuses absolute paths.
    pub fn start_latest(&self, main_executable_relative: &Path, args: &[String]) -> Result<(), UpdateError> {
        if main_executable_relative.is_absolute() {
            return Err(UpdateError::misconfigured(
                "main executable path must be relative to the current directory",
            ));
        }
        let exe_path = self.current_dir().join(main_executable_relative);
        self.release_lock();
        process::spawn_detached(&exe_path, args)
            .map_err(|e| UpdateError::misconfigured(format!("starting '{}': {e}", exe_path.display())))?;
        Ok(())
    }
}
