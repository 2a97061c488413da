//! C5: the update pipeline (spec.md §4.5) — composes C1–C4 plus an archive
//! extractor and content/post-update operations into an atomic,
//! cancellable `update()` operation. Configuration surface follows the
//! teacher's `setter!` builder convention (`core::update::UpdateOpt`).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;

use crate::downloader::verifier::Verifier;
use crate::downloader::Downloader;
use crate::error::UpdateError;
use crate::extract::{ArchiveType, DirectoryOperation};
use crate::file_url::FileUrl;
use crate::manager::Manager;
use crate::sentinel;
use crate::source::Source;
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    UpToDate,
    UpdateAlreadyInstalled,
    NewVersionAvailable,
    LatestIsOlder,
}

#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub state: UpdateState,
    pub version: Version,
    pub url: String,
}

pub struct PipelineBuilder {
    manager: Arc<Manager>,
    source: Option<Arc<dyn Source>>,
    archive_type: Option<ArchiveType>,
    download_filename_pattern: Option<Regex>,
    download_url_pattern: Option<Regex>,
    filename_contains_version: Option<bool>,
    update_verifications: Vec<Arc<dyn Verifier>>,
    content_operations: Vec<Arc<dyn DirectoryOperation>>,
    post_update_operations: Vec<Arc<dyn DirectoryOperation>>,
    file_url_overrides: Vec<(String, String)>,
    allow_insecure: bool,
}

impl PipelineBuilder {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            manager,
            source: None,
            archive_type: None,
            download_filename_pattern: None,
            download_url_pattern: None,
            filename_contains_version: None,
            update_verifications: Vec::new(),
            content_operations: Vec::new(),
            post_update_operations: Vec::new(),
            file_url_overrides: Vec::new(),
            allow_insecure: false,
        }
    }

    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn archive_type(mut self, archive_type: ArchiveType) -> Self {
        self.archive_type = Some(archive_type);
        self
    }

    pub fn download_filename_pattern(mut self, pattern: Regex) -> Self {
        self.download_filename_pattern = Some(pattern);
        self
    }

    pub fn download_url_pattern(mut self, pattern: Regex) -> Self {
        self.download_url_pattern = Some(pattern);
        self
    }

    /// Must be called explicitly — there is no default (spec.md §4.5).
    pub fn filename_contains_version(mut self, enabled: bool) -> Self {
        self.filename_contains_version = Some(enabled);
        self
    }

    pub fn add_update_verification(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.update_verifications.push(verifier);
        self
    }

    pub fn add_content_operation(mut self, op: Arc<dyn DirectoryOperation>) -> Self {
        self.content_operations.push(op);
        self
    }

    pub fn add_post_update_operation(mut self, op: Arc<dyn DirectoryOperation>) -> Self {
        self.post_update_operations.push(op);
        self
    }

    pub fn override_file_url(mut self, filename: impl Into<String>, url: impl Into<String>) -> Self {
        self.file_url_overrides.push((filename.into(), url.into()));
        self
    }

    crate::setter!(allow_insecure, bool);

    pub fn build(self) -> Result<Pipeline, UpdateError> {
        let source = self
            .source
            .ok_or_else(|| UpdateError::misconfigured("no source configured"))?;
        let archive_type = self
            .archive_type
            .ok_or_else(|| UpdateError::misconfigured("no archive_type configured"))?;
        let download_filename_pattern = self
            .download_filename_pattern
            .ok_or_else(|| UpdateError::misconfigured("no download_filename_pattern configured"))?;
        let filename_contains_version = self.filename_contains_version.ok_or_else(|| {
            UpdateError::misconfigured("filename_contains_version must be set explicitly")
        })?;
        let download_url_pattern = self.download_url_pattern.unwrap_or_else(|| source.url_pattern());

        Ok(Pipeline {
            manager: self.manager,
            source,
            archive_type,
            download_filename_pattern,
            download_url_pattern,
            filename_contains_version,
            update_verifications: self.update_verifications,
            content_operations: self.content_operations,
            post_update_operations: self.post_update_operations,
            file_url_overrides: self.file_url_overrides,
            allow_insecure: self.allow_insecure,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }
}

pub struct Pipeline {
    manager: Arc<Manager>,
    source: Arc<dyn Source>,
    archive_type: ArchiveType,
    download_filename_pattern: Regex,
    download_url_pattern: Regex,
    filename_contains_version: bool,
    update_verifications: Vec<Arc<dyn Verifier>>,
    content_operations: Vec<Arc<dyn DirectoryOperation>>,
    post_update_operations: Vec<Arc<dyn DirectoryOperation>>,
    file_url_overrides: Vec<(String, String)>,
    allow_insecure: bool,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// Delegates to the Downloader's cancel flag (spec.md §4.5 config
    /// table). Safe to call from another thread while `update()` runs.
    pub fn cancel(&self, value: bool) {
        self.cancel.store(value, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn validate_asset(&self, version: &Version, url: &str) -> Result<(), UpdateError> {
        let file_url = FileUrl::parse(url, self.allow_insecure)?;

        if !self.download_filename_pattern.is_match(&file_url.filename) {
            return Err(UpdateError::transport(format!(
                "asset filename '{}' does not match the configured download_filename_pattern",
                file_url.filename
            )));
        }
        if !self.download_url_pattern.is_match(url) {
            return Err(UpdateError::transport(format!(
                "asset url '{url}' does not match the configured download_url_pattern"
            )));
        }
        if self.filename_contains_version {
            let version_string = version.to_string();
            if !filename_contains_version(&file_url.filename, &version_string) {
                return Err(UpdateError::verification_failed(format!(
                    "asset filename '{}' does not contain version '{version_string}' at a valid boundary",
                    file_url.filename
                )));
            }
        }
        Ok(())
    }

    /// Resolves the source, validates the asset, and reports where the
    /// resolved version stands relative to what's installed.
    pub fn get_latest(&self) -> Result<UpdateInfo, UpdateError> {
        let (version, url) = self.source.resolve(&self.download_filename_pattern)?;
        self.validate_asset(&version, &url)?;

        let state = if self
            .manager
            .latest_available_update()
            .is_some_and(|(v, _)| v == version)
        {
            UpdateState::UpdateAlreadyInstalled
        } else if version == *self.manager.current_version() {
            UpdateState::UpToDate
        } else if version < *self.manager.current_version() {
            UpdateState::LatestIsOlder
        } else {
            UpdateState::NewVersionAvailable
        };

        Ok(UpdateInfo { state, version, url })
    }

    fn build_downloader(&self, base_url: &str) -> Result<Downloader, UpdateError> {
        let mut downloader = Downloader::new()
            .map_err(|e| UpdateError::misconfigured(format!("initializing downloader: {e}")))?
            .allow_insecure(self.allow_insecure)
            .base_url(base_url)
            .use_cancel_flag(self.cancel.clone());
        for (filename, url) in &self.file_url_overrides {
            downloader = downloader.override_file_url(filename, url);
        }
        for verifier in &self.update_verifications {
            downloader = downloader.add_verification(verifier.clone());
        }
        Ok(downloader)
    }

    /// Executes the full pipeline for a resolved `(version, url)`: fetch,
    /// verify, extract to scratch, content operations, atomic commit,
    /// post-update operations, sentinel. All-or-nothing: any failure past
    /// this point leaves no trace in the working directory.
    pub fn update(&self, version: Version, url: &str) -> Result<PathBuf, UpdateError> {
        self.validate_asset(&version, url)?;
        let file_url = FileUrl::parse(url, self.allow_insecure)?;

        let mut downloader = self.build_downloader(&file_url.base_url)?;
        let downloaded = downloader.get(&file_url.filename)?;

        let scratch_dir = tempfile::tempdir()
            .map_err(|e| UpdateError::extraction(format!("creating scratch directory: {e}")))?;

        self.archive_type
            .extractor()
            .extract(&downloaded.path, scratch_dir.path())
            .map_err(|e| UpdateError::extraction(format!("extracting archive: {e:#}")))?;

        for op in &self.content_operations {
            op.apply(scratch_dir.path())
                .map_err(|e| UpdateError::extraction(format!("content operation: {e:#}")))?;
        }

        let target_dir = self.manager.working_dir().join(version.to_string());
        if target_dir.exists() {
            std::fs::remove_dir_all(&target_dir)
                .map_err(|e| UpdateError::extraction(format!("clearing stale target directory: {e}")))?;
        }
        let scratch_path = scratch_dir.into_path();
        std::fs::rename(&scratch_path, &target_dir).map_err(|e| {
            UpdateError::extraction(format!("committing extracted directory: {e}"))
        })?;

        for op in &self.post_update_operations {
            if let Err(e) = op.apply(&target_dir) {
                let _ = std::fs::remove_dir_all(&target_dir);
                return Err(UpdateError::extraction(format!("post-update operation: {e:#}")));
            }
        }

        sentinel::write(&target_dir, &version)
            .map_err(|e| UpdateError::extraction(format!("writing sentinel: {e}")))?;

        Ok(target_dir)
    }
}

/// Spec.md §4.5 "filename contains version": `filename` must contain
/// `version` at a position where the character immediately on each side
/// is either absent (string boundary), not a digit, or a `.` that is
/// itself not immediately preceded/followed by a digit (so the match
/// can't be read as a fragment of a longer numeric run).
pub fn filename_contains_version(filename: &str, version: &str) -> bool {
    let haystack = filename.as_bytes();
    let needle = version.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }

    for start in 0..=(haystack.len() - needle.len()) {
        if &haystack[start..start + needle.len()] != needle {
            continue;
        }
        let end = start + needle.len();
        if left_boundary_ok(haystack, start) && right_boundary_ok(haystack, end) {
            return true;
        }
    }
    false
}

fn left_boundary_ok(bytes: &[u8], start: usize) -> bool {
    if start == 0 {
        return true;
    }
    let c = bytes[start - 1];
    if c.is_ascii_digit() {
        return false;
    }
    if c == b'.' {
        start < 2 || !bytes[start - 2].is_ascii_digit()
    } else {
        true
    }
}

fn right_boundary_ok(bytes: &[u8], end: usize) -> bool {
    if end >= bytes.len() {
        return true;
    }
    let c = bytes[end];
    if c.is_ascii_digit() {
        return false;
    }
    if c == b'.' {
        end + 1 >= bytes.len() || !bytes[end + 1].is_ascii_digit()
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_version_with_word_like_boundaries() {
        assert!(filename_contains_version("release-1.2.3.zip", "1.2.3"));
        assert!(filename_contains_version("app_1.2.3", "1.2.3"));
        assert!(filename_contains_version("v1.2.3-win64", "1.2.3"));
    }

    #[test]
    fn rejects_version_embedded_in_a_longer_numeric_run() {
        assert!(!filename_contains_version("1.2.3.4", "1.2.3"));
        assert!(!filename_contains_version("12.2.3", "2.3"));
    }

    #[test]
    fn property_table_matches_boundary_like_prefixes_and_suffixes() {
        let versions = ["2", "13", "13451", "2.331", "1.4", "1.3.4", "13.5246.141"];
        let accept_as_prefix = [
            "", ".", "a", "..", "a.", ".a", "aa", "5a",
        ];
        let reject_as_prefix = ["0", "0.", ".1", "01", "a8"];
        let accept_as_suffix = [
            "", ".", "a", "..", "a.", ".a", "aa", "a8",
        ];
        let reject_as_suffix = ["0", "0.", ".1", "01", "5a"];

        // A match requires *both* sides to be boundary-like, so exercise the
        // full prefix x suffix cross product rather than each side in
        // isolation against an empty counterpart.
        let prefixes: Vec<(&str, bool)> = accept_as_prefix
            .iter()
            .map(|p| (*p, true))
            .chain(reject_as_prefix.iter().map(|p| (*p, false)))
            .collect();
        let suffixes: Vec<(&str, bool)> = accept_as_suffix
            .iter()
            .map(|s| (*s, true))
            .chain(reject_as_suffix.iter().map(|s| (*s, false)))
            .collect();

        for v in versions {
            for (p, p_ok) in &prefixes {
                for (s, s_ok) in &suffixes {
                    let filename = format!("{p}{v}{s}");
                    let expected = *p_ok && *s_ok;
                    assert_eq!(
                        filename_contains_version(&filename, v),
                        expected,
                        "prefix {p:?} + {v:?} + suffix {s:?}: expected {expected}"
                    );
                }
            }
        }
    }
}
