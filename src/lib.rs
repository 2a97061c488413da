//! A verifying self-update engine for applications that ship as signed
//! archive releases: discovers whether a newer release exists, downloads
//! and authenticates it, extracts it to a managed working directory, and
//! coordinates an atomic handoff to an external launcher process.
//!
//! The five cooperating pieces, leaves first:
//! - [`downloader`] (C1) — content-addressed, cancellable, verifying fetch.
//! - [`source`] (C2) — resolves a remote release index to `(version, url)`.
//! - [`sentinel`] / [`layout`] (C3) — per-directory version markers and
//!   working-directory enumeration.
//! - [`manager`] / [`lock`] / [`process`] (C4) — the working-directory
//!   lock and the prune/unlink/apply-latest/launch-latest transitions.
//! - [`pipeline`] / [`extract`] (C5) — the end-to-end `update()` operation.

#![deny(unused_must_use)]

pub mod downloader;
pub mod error;
pub mod extract;
pub mod file_url;
pub mod layout;
pub mod lock;
pub mod logging;
pub mod manager;
pub mod pipeline;
pub mod process;
pub mod sentinel;
pub mod source;
pub mod utils;
pub mod version;

pub use downloader::verifier::{KeyFormat, KeyType, ManifestVerifier, SignatureVerifier, Verifier};
pub use downloader::{DownloadedFile, Downloader};
pub use error::{Result, UpdateError};
pub use extract::{ArchiveType, DirectoryOperation, Extractor, FlattenRootDirectory};
pub use file_url::FileUrl;
pub use manager::{Manager, ManagerBuilder};
pub use pipeline::{Pipeline, PipelineBuilder, UpdateInfo, UpdateState};
pub use source::{ReleaseIndexSource, Source};
pub use version::Version;
