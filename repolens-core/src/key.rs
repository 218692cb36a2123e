//! Canonical resource identity.
//!
//! A caller supplies a short reference such as `owner/name`. The gateway
//! never caches by that raw string; it derives a [`ResourceKey`] by
//! prefixing the configured [`ResourceOrigin`]. The derivation is pure and
//! total, so the same reference always lands on the same cache entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin prepended to short references when no other origin is configured.
pub const DEFAULT_RESOURCE_ORIGIN: &str = "https://github.com";

/// Canonical identifier of an analyzable resource.
///
/// Keys are the sole identity used for caching. They are produced by
/// [`ResourceOrigin::canonicalize`]; `from_canonical` exists for stores that
/// read keys back from persisted records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Wrap a string that is already in canonical form.
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The fixed prefix used to canonicalize short references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOrigin(String);

impl Default for ResourceOrigin {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE_ORIGIN)
    }
}

impl ResourceOrigin {
    /// Create an origin. Surrounding whitespace and trailing `/` are dropped.
    pub fn new(origin: impl AsRef<str>) -> Self {
        Self(origin.as_ref().trim().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the canonical key for a short reference.
    ///
    /// Surrounding whitespace and `/` are trimmed, and a reference that
    /// already carries this origin has it stripped first, so
    /// `owner/repo`, `/owner/repo/` and `https://github.com/owner/repo`
    /// all map to `https://github.com/owner/repo`. Canonicalizing a key
    /// yields the same key.
    pub fn canonicalize(&self, reference: &str) -> ResourceKey {
        let trimmed = reference.trim_matches(is_separator);
        let path = self.strip_origin(trimmed).unwrap_or(trimmed);
        ResourceKey(format!("{}/{}", self.0, path))
    }

    /// The part of `key` after this origin, if the key belongs to it.
    pub fn relative_path<'a>(&self, key: &'a ResourceKey) -> Option<&'a str> {
        self.strip_origin(key.as_str())
    }

    fn strip_origin<'a>(&self, value: &'a str) -> Option<&'a str> {
        let rest = value.strip_prefix(self.0.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest.trim_start_matches(is_separator))
        } else {
            None
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c.is_whitespace()
}
