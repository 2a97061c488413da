//! `version_number` from spec.md §3: an ordered sequence of non-negative
//! integer components, compared with implicit zero-padding on the shorter
//! side (`1.2 == 1.2.0`). Deliberately not `semver::Version` — the teacher's
//! own `core::update` leans on `semver` for its self-update check, but
//! semver's pre-release/build-metadata rules can't express "unbounded
//! components, zero-padded", so this crate carries its own small type
//! instead (see DESIGN.md).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("invalid version string {0:?}")]
pub struct ParseVersionError(String);

#[derive(Debug, Clone, Eq)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    pub fn new(components: Vec<u64>) -> Self {
        Self { components }
    }

    /// Parse `s` as a version with no required prefix.
    pub fn parse(s: &str) -> Result<Self, ParseVersionError> {
        Self::parse_with_prefix(s, "")
    }

    /// Parse `s` as a version, requiring the literal `prefix` at position 0
    /// (e.g. tag names like `v1.2.3`, prefix `"v"`).
    pub fn parse_with_prefix(s: &str, prefix: &str) -> Result<Self, ParseVersionError> {
        let rest = s
            .strip_prefix(prefix)
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        if rest.is_empty() {
            return Err(ParseVersionError(s.to_string()));
        }
        let mut components = Vec::new();
        for piece in rest.split('.') {
            if piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseVersionError(s.to_string()));
            }
            let value: u64 = piece
                .parse()
                .map_err(|_| ParseVersionError(s.to_string()))?;
            components.push(value);
        }
        Ok(Self { components })
    }

    fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
