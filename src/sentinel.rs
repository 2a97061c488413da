//! C3 (part 1): read/write the `.sentinel` marker living at the root of
//! each version directory, per spec.md §3/§6's grammar:
//! `key=value` lines, LF or CRLF separated, unknown keys ignored, the only
//! mandatory key being `version`.

use std::fs;
use std::path::Path;

use crate::version::{self, Version};

pub const FILENAME: &str = ".sentinel";

/// Persist `version=<string>` into `<dir>/.sentinel`. Write-and-replace: a
/// concurrent reader sees either the old or the new content, never a
/// half-written file, because we write to a sibling temp file and rename.
pub fn write(dir: &Path, version: &Version) -> anyhow::Result<()> {
    let final_path = dir.join(FILENAME);
    let tmp_path = dir.join(format!("{FILENAME}.tmp"));
    fs::write(&tmp_path, format!("version={version}\n"))?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Read and parse `<dir>/.sentinel`. Never fails: a missing file, an
/// unparseable line set, or an absent `version` key all yield `None`.
pub fn read(dir: &Path) -> Option<Version> {
    let raw = fs::read_to_string(dir.join(FILENAME)).ok()?;
    parse(&raw)
}

fn parse(raw: &str) -> Option<Version> {
    for line in raw.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key == "version" {
            return version::Version::parse(value).ok();
        }
    }
    None
}

/// A directory is valid iff its sentinel exists, parses, carries a
/// `version` key, and that version equals the directory's own filename
/// parsed as a version.
pub fn is_valid(dir: &Path) -> bool {
    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Ok(name_version) = Version::parse(name) else {
        return false;
    };
    matches!(read(dir), Some(sentinel_version) if sentinel_version == name_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let v = Version::parse("1.2.3").unwrap();
        write(dir.path(), &v).unwrap();
        assert_eq!(read(dir.path()), Some(v));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(FILENAME), "channel=stable\nversion=2.0\nextra=1\n").unwrap();
        assert_eq!(read(dir.path()), Some(Version::parse("2.0").unwrap()));
    }

    #[test]
    fn malformed_line_before_version_does_not_abort_the_scan() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(FILENAME), "not-a-key-value-line\nversion=2.0\n").unwrap();
        assert_eq!(read(dir.path()), Some(Version::parse("2.0").unwrap()));
    }

    #[test]
    fn missing_file_is_none_not_error() {
        let dir = tempdir().unwrap();
        assert_eq!(read(dir.path()), None);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(FILENAME), "version=3.0.1\r\n").unwrap();
        assert_eq!(read(dir.path()), Some(Version::parse("3.0.1").unwrap()));
    }

    #[test]
    fn directory_valid_only_when_sentinel_matches_name() {
        let dir = tempdir().unwrap();
        let versioned = dir.path().join("1.2.3");
        fs::create_dir(&versioned).unwrap();
        write(&versioned, &Version::parse("1.2.3").unwrap()).unwrap();
        assert!(is_valid(&versioned));

        write(&versioned, &Version::parse("9.9.9").unwrap()).unwrap();
        assert!(!is_valid(&versioned));
    }

    #[test]
    fn directory_without_sentinel_is_invalid() {
        let dir = tempdir().unwrap();
        let versioned = dir.path().join("1.0.0");
        fs::create_dir(&versioned).unwrap();
        assert!(!is_valid(&versioned));
    }
}
