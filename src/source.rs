//! C2: release source (spec.md §4.2) — given a filename regex, resolve a
//! remote release index to `(version, file_url)`.

use regex::Regex;
use serde::Deserialize;

use crate::error::UpdateError;
use crate::version::Version;

/// Capability trait a release source implements. `url_pattern` is an
/// immutable constraint the pipeline uses to reject assets that don't live
/// on the expected origin, independent of whatever `resolve` itself
/// trusted.
pub trait Source: Send + Sync {
    fn resolve(&self, filename_regex: &Regex) -> Result<(Version, String), UpdateError>;
    fn url_pattern(&self) -> Regex;
}

#[derive(Debug, Deserialize)]
struct ReleaseIndex {
    tag_name: String,
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// Reference implementation: a single JSON release-index document fetched
/// over HTTP, shaped like a GitHub Releases API response (spec.md §6).
pub struct ReleaseIndexSource {
    index_url: String,
    tag_prefix: String,
    url_pattern: Regex,
    client: reqwest::blocking::Client,
}

impl ReleaseIndexSource {
    pub fn new(index_url: impl Into<String>, tag_prefix: impl Into<String>, url_pattern: Regex) -> Self {
        Self {
            index_url: index_url.into(),
            tag_prefix: tag_prefix.into(),
            url_pattern,
            client: reqwest::blocking::Client::new(),
        }
    }

    fn fetch_index(&self) -> Result<ReleaseIndex, UpdateError> {
        let response = self
            .client
            .get(&self.index_url)
            .send()
            .map_err(|e| UpdateError::transport(format!("fetching release index: {e}")))?;
        if !response.status().is_success() {
            return Err(UpdateError::transport(format!(
                "fetching release index: HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| UpdateError::transport(format!("parsing release index: {e}")))
    }
}

impl Source for ReleaseIndexSource {
    fn resolve(&self, filename_regex: &Regex) -> Result<(Version, String), UpdateError> {
        let index = self.fetch_index()?;

        let version = Version::parse_with_prefix(&index.tag_name, &self.tag_prefix).map_err(|_| {
            UpdateError::transport(format!(
                "release index tag '{}' does not start with prefix '{}' or is not a version",
                index.tag_name, self.tag_prefix
            ))
        })?;

        let asset = index
            .assets
            .iter()
            .find(|asset| filename_regex.is_match(&asset.name))
            .ok_or_else(|| {
                UpdateError::transport(format!(
                    "no asset in release '{}' matches pattern '{}'",
                    index.tag_name, filename_regex
                ))
            })?;

        if !self.url_pattern.is_match(&asset.browser_download_url) {
            return Err(UpdateError::transport(format!(
                "asset url '{}' does not match the configured url_pattern",
                asset.browser_download_url
            )));
        }

        Ok((version, asset.browser_download_url.clone()))
    }

    fn url_pattern(&self) -> Regex {
        self.url_pattern.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> ReleaseIndex {
        ReleaseIndex {
            tag_name: "v1.2.3".to_string(),
            assets: vec![
                ReleaseAsset {
                    name: "app-1.2.3-linux.tar.gz".to_string(),
                    browser_download_url: "https://example.com/releases/app-1.2.3-linux.tar.gz".to_string(),
                },
                ReleaseAsset {
                    name: "sha256sums".to_string(),
                    browser_download_url: "https://example.com/releases/sha256sums".to_string(),
                },
            ],
        }
    }

    #[test]
    fn version_parses_with_configured_prefix() {
        let index = sample_index();
        let v = Version::parse_with_prefix(&index.tag_name, "v").unwrap();
        assert_eq!(v, Version::parse("1.2.3").unwrap());
    }

    #[test]
    fn first_matching_asset_is_selected() {
        let index = sample_index();
        let pattern = Regex::new(r"^app-.*\.tar\.gz$").unwrap();
        let asset = index.assets.iter().find(|a| pattern.is_match(&a.name)).unwrap();
        assert_eq!(asset.name, "app-1.2.3-linux.tar.gz");
    }

    #[test]
    fn no_matching_asset_is_an_error_condition() {
        let index = sample_index();
        let pattern = Regex::new(r"^does-not-exist").unwrap();
        assert!(index.assets.iter().find(|a| pattern.is_match(&a.name)).is_none());
    }
}
