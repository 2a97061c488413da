//! Filesystem helpers, carried forward from the teacher crate's
//! `utils::file_system` and trimmed to what the update engine needs:
//! directory creation, path-traversal-safe normalization, recursive copy,
//! and atomic-ish move via `fs::rename`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Create `path` and all of its parents if missing; no-op if it already
/// exists as a directory.
pub fn mkdirs(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
}

/// Resolve `.`/`..` components lexically without touching the filesystem
/// (the path need not exist). Used to defend against zip-slip style
/// archive-entry escapes: an entry is accepted only if the normalized join
/// of `base` and the entry's relative path still starts with `base`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join `base` with the archive-relative path `entry`, rejecting any entry
/// that would escape `base` (absolute paths, `..` components, or a
/// normalized result outside `base`).
pub fn sanitize_join(base: &Path, entry: &Path) -> anyhow::Result<PathBuf> {
    for component in entry.components() {
        match component {
            Component::ParentDir => {
                anyhow::bail!("entry {entry:?} escapes its base via '..'");
            }
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("entry {entry:?} is absolute");
            }
            _ => {}
        }
    }
    let joined = normalize(&base.join(entry));
    if !joined.starts_with(base) {
        anyhow::bail!("entry {entry:?} escapes base directory {base:?}");
    }
    Ok(joined)
}

/// Recursively copy `src` into `dst`, creating `dst` and any needed parents.
pub fn copy_to(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        mkdirs(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let child_dst = dst.join(entry.file_name());
            copy_to(&entry.path(), &child_dst)?;
        }
        Ok(())
    } else {
        if let Some(parent) = dst.parent() {
            mkdirs(parent)?;
        }
        fs::copy(src, dst)?;
        Ok(())
    }
}

/// Move `src` to `dst` via `fs::rename`, falling back to recursive
/// copy-then-remove when rename fails (e.g. cross-filesystem moves of
/// retained files).
pub fn move_to(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        mkdirs(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_to(src, dst)?;
            if src.is_dir() {
                fs::remove_dir_all(src)
            } else {
                fs::remove_file(src)
            }
        }
    }
}

/// List the immediate children of `dir`, silently yielding nothing if `dir`
/// does not exist.
pub fn children(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| entries.flatten().map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// Mark `path` executable. Unix sets the owner/group/other execute bits;
/// Windows has no such bit, so this is a no-op there (teacher convention,
/// `utils::file_system::create_executable_file`).
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_join_rejects_parent_dir_escape() {
        let base = Path::new("/working/1.2.3");
        assert!(sanitize_join(base, Path::new("../../etc/passwd")).is_err());
    }

    #[test]
    fn sanitize_join_rejects_absolute_entries() {
        let base = Path::new("/working/1.2.3");
        assert!(sanitize_join(base, Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn sanitize_join_accepts_nested_relative_entries() {
        let base = Path::new("/working/1.2.3");
        let joined = sanitize_join(base, Path::new("bin/app")).unwrap();
        assert_eq!(joined, Path::new("/working/1.2.3/bin/app"));
    }

    #[test]
    fn copy_to_recreates_directory_tree() {
        let src_root = tempdir().unwrap();
        let dst_root = tempdir().unwrap();
        fs::create_dir(src_root.path().join("nested")).unwrap();
        fs::write(src_root.path().join("nested/file.txt"), b"hi").unwrap();

        copy_to(src_root.path(), &dst_root.path().join("copy")).unwrap();

        assert_eq!(
            fs::read_to_string(dst_root.path().join("copy/nested/file.txt")).unwrap(),
            "hi"
        );
    }

    #[test]
    fn move_to_relocates_a_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("nested/b.txt");
        fs::write(&src, b"payload").unwrap();

        move_to(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");
    }
}
