//! `file_url` from spec.md §3: an absolute HTTP(S) URL decomposed into
//! `base_url` (scheme + host + path up to and including the last `/`) and
//! `filename` (the final segment), with the invariant `base_url + filename
//! == url` held byte-for-byte — so this operates on the raw string rather
//! than round-tripping through `url::Url`'s normalizing serializer.

use url::Url;

use crate::error::UpdateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUrl {
    pub base_url: String,
    pub filename: String,
}

impl FileUrl {
    /// Parse an absolute URL, splitting at the final `/`. HTTPS is required
    /// unless `allow_insecure` is set (spec.md §4.1: "callers MAY opt in to
    /// HTTP for tests").
    pub fn parse(url: &str, allow_insecure: bool) -> Result<Self, UpdateError> {
        let parsed = Url::parse(url)
            .map_err(|e| UpdateError::misconfigured(format!("invalid url {url:?}: {e}")))?;
        match parsed.scheme() {
            "https" => {}
            "http" if allow_insecure => {}
            other => {
                return Err(UpdateError::misconfigured(format!(
                    "url {url:?} uses unsupported scheme {other:?}"
                )))
            }
        }
        let split_at = url.rfind('/').ok_or_else(|| {
            UpdateError::misconfigured(format!("url {url:?} has no path segment"))
        })?;
        let (base_url, filename) = url.split_at(split_at + 1);
        if filename.is_empty() {
            return Err(UpdateError::misconfigured(format!(
                "url {url:?} has no filename"
            )));
        }
        Ok(Self {
            base_url: base_url.to_string(),
            filename: filename.to_string(),
        })
    }

    /// Join this URL's base with a different filename, e.g. to fetch an
    /// auxiliary file living alongside the primary artifact.
    pub fn sibling(&self, filename: &str) -> String {
        format!("{}{}", self.base_url, filename)
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.filename)
    }
}

/// Trim trailing slashes beyond the first from a base URL's path, preserving
/// the root `/` (spec.md §4.1 `base_url()` contract).
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    format!("{trimmed}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_plus_filename_round_trips_byte_for_byte() {
        let f = FileUrl::parse("https://example.com/releases/app-1.2.3.zip", false).unwrap();
        assert_eq!(f.base_url, "https://example.com/releases/");
        assert_eq!(f.filename, "app-1.2.3.zip");
        assert_eq!(f.url(), "https://example.com/releases/app-1.2.3.zip");
    }

    #[test]
    fn rejects_plain_http_by_default() {
        assert!(FileUrl::parse("http://example.com/a.zip", false).is_err());
        assert!(FileUrl::parse("http://example.com/a.zip", true).is_ok());
    }

    #[test]
    fn rejects_url_without_filename() {
        assert!(FileUrl::parse("https://example.com/releases/", false).is_err());
    }

    #[test]
    fn trims_trailing_slashes_keeping_root() {
        assert_eq!(normalize_base_url("https://example.com///"), "https://example.com/");
        assert_eq!(normalize_base_url("https://example.com/releases///"), "https://example.com/releases/");
    }
}
