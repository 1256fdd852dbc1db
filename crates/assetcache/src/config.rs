use std::path::PathBuf;

use serde::Deserialize;

/// Configuration for an [`AssetCache`](crate::AssetCache).
///
/// Deserializable so that a host application can embed it in its own
/// configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory in which downloaded assets are persisted.
    ///
    /// Created recursively when the cache is constructed; construction fails
    /// if the directory cannot be prepared.
    pub cache_dir: PathBuf,
}

impl CacheConfig {
    /// Creates a configuration storing assets under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }
}
