use std::fmt;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

/// Filesystem-safe identifier of a cache entry, derived from its URL.
///
/// The derivation percent-encodes every character outside ASCII
/// alphanumerics, which keeps the on-disk layout flat (no separators, no
/// `..`, no absolute paths) while staying recognizable when inspecting the
/// cache directory by hand.
///
/// The encoding is injective: two distinct URLs never share a key, even
/// when they differ only in characters that need escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Derives the storage key for `url`.
    pub fn from_url(url: &str) -> Self {
        Self(utf8_percent_encode(url, NON_ALPHANUMERIC).to_string())
    }

    /// The key as a single path segment.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
