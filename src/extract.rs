//! Archive extraction and directory operations (spec.md §4.5 "extraction
//! contract" and `flatten_root_directory`). The extractor is a narrow
//! capability trait per spec.md §9; three reference implementations ship
//! (zip, tar.gz, tar.xz), all defending against zip-slip via
//! `utils::fs::sanitize_join`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::utils;

/// `(archive_path, out_dir) -> Result`. Must preserve relative paths and
/// reject entries that would escape `out_dir`.
pub trait Extractor: Send + Sync {
    fn extract(&self, archive_path: &Path, out_dir: &Path) -> anyhow::Result<()>;
}

/// A transformation applied either to the extracted-but-not-yet-committed
/// directory (a "content operation") or to the committed directory (a
/// "post-update operation"). Same shape; spec.md §4.5 distinguishes them
/// only by when the pipeline runs them.
pub trait DirectoryOperation: Send + Sync {
    fn apply(&self, dir: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveType {
    pub fn extractor(self) -> Box<dyn Extractor> {
        match self {
            ArchiveType::Zip => Box::new(ZipExtractor),
            ArchiveType::TarGz => Box::new(TarGzExtractor),
            ArchiveType::TarXz => Box::new(TarXzExtractor),
        }
    }
}

pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(&self, archive_path: &Path, out_dir: &Path) -> anyhow::Result<()> {
        let file = File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| anyhow::anyhow!("zip entry has an unsafe name: {}", entry.name()))?
                .to_path_buf();
            let dest = utils::fs::sanitize_join(out_dir, &relative)?;

            if entry.is_dir() {
                utils::fs::mkdirs(&dest)?;
                continue;
            }
            if let Some(parent) = dest.parent() {
                utils::fs::mkdirs(parent)?;
            }
            let mut out_file = File::create(&dest)?;
            std::io::copy(&mut entry, &mut out_file)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(mode))?;
                }
            }
        }
        Ok(())
    }
}

pub struct TarGzExtractor;

impl Extractor for TarGzExtractor {
    fn extract(&self, archive_path: &Path, out_dir: &Path) -> anyhow::Result<()> {
        let file = File::open(archive_path)?;
        let decoder = flate2::read::GzDecoder::new(file);
        extract_tar(decoder, out_dir)
    }
}

pub struct TarXzExtractor;

impl Extractor for TarXzExtractor {
    fn extract(&self, archive_path: &Path, out_dir: &Path) -> anyhow::Result<()> {
        let file = File::open(archive_path)?;
        let decoder = xz2::read::XzDecoder::new(file);
        extract_tar(decoder, out_dir)
    }
}

fn extract_tar<R: Read>(reader: R, out_dir: &Path) -> anyhow::Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        let dest = utils::fs::sanitize_join(out_dir, &relative)?;
        if let Some(parent) = dest.parent() {
            utils::fs::mkdirs(parent)?;
        }
        entry.unpack(&dest)?;
    }
    Ok(())
}

/// Collapse a single top-level directory: iff `out_dir` contains exactly
/// one entry and it is a directory, move its contents up and remove the
/// now-empty child. Otherwise either no-op or fail, per `strict`.
pub struct FlattenRootDirectory {
    pub strict: bool,
}

impl FlattenRootDirectory {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }
}

impl DirectoryOperation for FlattenRootDirectory {
    fn apply(&self, dir: &Path) -> anyhow::Result<()> {
        let mut children = utils::fs::children(dir);
        if children.len() == 1 && children[0].is_dir() {
            let root = children.remove(0);
            for grandchild in utils::fs::children(&root) {
                let name = grandchild
                    .file_name()
                    .ok_or_else(|| anyhow::anyhow!("entry under archive root has no filename"))?;
                utils::fs::move_to(&grandchild, &dir.join(name))?;
            }
            std::fs::remove_dir(&root)?;
            Ok(())
        } else if self.strict {
            anyhow::bail!(
                "expected exactly one top-level directory to flatten, found {}",
                children.len()
            );
        } else {
            Ok(())
        }
    }
}
