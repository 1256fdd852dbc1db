use thiserror::Error;

/// An error that happens when fetching an asset from a remote location.
///
/// This error enum is intended for keeping in the cache index: once a
/// download has failed, later lookups of the same key are answered with the
/// stored error instead of re-fetching. It is therefore cloneable and
/// comparable, and every caller attached to one download receives the
/// identical value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The requested URL could not be parsed.
    ///
    /// The cache accepts any string as a key; URL validity only matters once
    /// a download is actually attempted, which is where this surfaces.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The asset was not found at the remote source.
    #[error("not found")]
    NotFound,
    /// The asset could not be fetched from the remote source due to missing
    /// permissions.
    ///
    /// The attached string contains the remote source's response status.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The asset could not be fetched due to another problem, like
    /// connection loss, DNS resolution, or a 5xx server response.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The asset was fetched successfully, but its bytes could not be
    /// decoded.
    #[error("malformed: {0}")]
    Malformed(String),
    /// The owning cache was torn down while the download was still running.
    #[error("cache was dropped before the download completed")]
    OwnerGone,
}

impl CacheError {
    /// Builds a [`DownloadError`](Self::DownloadError) from the root cause
    /// of a transport error.
    pub(crate) fn download_error(mut error: &dyn std::error::Error) -> Self {
        while let Some(source) = error.source() {
            error = source;
        }

        Self::DownloadError(error.to_string())
    }
}

/// The contents of a cache lookup: a value, or the reason it is unavailable.
pub type CacheContents<T = ()> = Result<T, CacheError>;
