//! The error taxonomy shared by every public operation in this crate.
//!
//! Internal helpers are free to return plain [`anyhow::Result`] the way the
//! teacher crate's `core`/`utils` modules do (`.context("...")`); the public
//! boundary of each component (downloader, source, manager, pipeline)
//! converts those into the matchable variants below.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UpdateError>;

/// The closed set of ways an update operation can fail.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Caller set mutually inconsistent or missing options.
    #[error("misconfigured: {0}")]
    Misconfigured(String),
    /// The HTTPS fetch failed, or a configured URL pattern was not matched.
    #[error("transport error: {0}")]
    Transport(String),
    /// A verifier reported failure: bad hash, bad signature, missing entry.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
    /// The archive reader failed, or a content/post-update operation aborted.
    #[error("extraction error: {0}")]
    Extraction(String),
    /// Another process holds the working-directory lock.
    #[error("working directory is locked by another process")]
    LockContended,
    /// `apply_latest` could not terminate a process within the timeout.
    #[error("processes under '{0}' did not exit before the timeout")]
    ProcessesLingering(String),
    /// The cancel flag was observed set at a suspension point.
    #[error("operation was cancelled")]
    Cancelled,
    /// The working directory contains contradictory state (duplicate
    /// versions, mismatched sentinel); surfaced as "no update available"
    /// everywhere except where the caller explicitly asked to inspect it.
    #[error("working directory layout is inconsistent: {0}")]
    LayoutInconsistent(String),
}

impl UpdateError {
    pub fn misconfigured<S: Into<String>>(msg: S) -> Self {
        Self::Misconfigured(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn verification_failed<S: Into<String>>(msg: S) -> Self {
        Self::VerificationFailed(msg.into())
    }

    pub fn extraction<S: Into<String>>(msg: S) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn layout_inconsistent<S: Into<String>>(msg: S) -> Self {
        Self::LayoutInconsistent(msg.into())
    }
}

/// Wrap an [`anyhow::Error`] produced by an internal helper into the stage
/// it failed at, matching spec.md §7's "errors from content operations and
/// post-update operations are wrapped with a prefix identifying the stage
/// but not swallowed".
pub fn stage_context(stage: &str, err: anyhow::Error) -> UpdateError {
    UpdateError::Extraction(format!("{stage}: {err:#}"))
}
