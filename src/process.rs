//! Process enumeration and termination (spec.md §9's
//! `enumerate_and_kill(path_or_dir)` / `wait_for_exit(pid, timeout)`
//! collaborators), implemented with `sysinfo` for cross-platform coverage
//! instead of the teacher's Windows-only `windows-sys` toolchain-management
//! code — grounded in `ecapuano-viberails` and `PORTALSURFER-sempal`, both
//! of which carry `sysinfo` for exactly this purpose (see DESIGN.md).

use std::path::Path;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};

/// Signal every process whose executable lives under `dir` to exit, then
/// poll until they are gone or `timeout` elapses. Returns `true` if every
/// process observed at the start has exited.
pub fn signal_and_wait(dir: &Path, timeout: Duration) -> bool {
    let mut system = System::new_all();
    system.refresh_all();
    let pids = processes_under(&system, dir);
    if pids.is_empty() {
        return true;
    }

    for pid in &pids {
        if let Some(process) = system.process(*pid) {
            process.kill();
        }
    }

    let start = Instant::now();
    loop {
        system.refresh_all();
        if pids.iter().all(|pid| system.process(*pid).is_none()) {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn processes_under(system: &System, dir: &Path) -> Vec<Pid> {
    system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            let exe = process.exe()?;
            exe.starts_with(dir).then_some(*pid)
        })
        .collect()
}

/// Start `executable` detached from the calling process, passing `args`.
/// The child outlives the parent regardless of which exits first; no pipe
/// is wired up since the launcher/main handoff communicates only through
/// the working directory's on-disk state.
pub fn spawn_detached(executable: &Path, args: &[String]) -> std::io::Result<()> {
    std::process::Command::new(executable)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;
    Ok(())
}

/// The executable path of the currently running process, used to detect
/// whether this process lives inside the current directory or an update
/// directory (spec.md §4.4 self-healing and `unlink`/`prune` ancestor
/// exclusion).
pub fn current_executable() -> Option<std::path::PathBuf> {
    std::env::current_exe().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_processes_under_an_empty_directory_returns_true_immediately() {
        let dir = tempfile::tempdir().unwrap();
        assert!(signal_and_wait(dir.path(), Duration::from_millis(50)));
    }

    #[test]
    fn current_executable_resolves_to_some_path() {
        assert!(current_executable().is_some());
    }
}
