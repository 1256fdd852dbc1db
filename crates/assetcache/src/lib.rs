//! A two-tier cache for binary assets fetched from remote URLs.
//!
//! The cache keeps decoded assets in memory and their raw bytes on the file
//! system, and coalesces concurrent requests so that any given URL is
//! downloaded at most once no matter how many callers ask for it at the same
//! time.
//!
//! ## Cache layers
//!
//! A lookup through [`AssetCache::get`] goes through the following steps:
//!
//! - First, the in-memory index. A decoded asset is returned immediately; a
//!   failed download is re-raised immediately; a running download is awaited
//!   together with everyone else interested in it.
//! - For a key the index has never seen, the file-system layer is probed and
//!   a hit is decoded and promoted into memory.
//! - Otherwise a download is started and published in the index *before*
//!   anything else can observe the key, which is what guarantees the
//!   single-flight property: deciding that a download is needed and making
//!   it visible to concurrent callers is one atomic step.
//!
//! Successful downloads are written through to the file system. A failed
//! write only costs persistence (the asset stays memory-only), it never
//! fails the download.
//!
//! Every lookup reports which of these tiers answered it via
//! [`CacheSource`], which is useful for logging and metrics on the caller
//! side.
//!
//! ## Errors
//!
//! The caching layer deals with [`CacheContents`], an alias for a [`Result`]
//! around a [`CacheError`].
//!
//! Download failures are terminal for their key: the error is stored in the
//! index and repeated lookups return it without another network attempt. The
//! cache has no invalidation API; a failed key stays failed for the lifetime
//! of the process.
//!
//! ## Keys
//!
//! The index is keyed by the URL string exactly as passed in. On disk, the
//! URL is mapped to a [`StorageKey`] by percent-encoding it to ASCII
//! alphanumerics; see [`StorageKey`] for the properties of that mapping. URL
//! strings are never validated by the cache itself, only by the transport
//! once a download is attempted.
//!
//! ## Known limitations
//!
//! - The cache grows without bound: there is no eviction in either tier and
//!   entries live until the process exits.
//! - Nothing coordinates multiple processes sharing a cache directory beyond
//!   atomic entry writes.

mod cacher;
mod config;
mod disk;
mod error;
mod http;
mod key;
mod utils;

pub use cacher::{AssetCache, AssetRequest, CacheSource};
pub use config::CacheConfig;
pub use disk::DiskStore;
pub use error::{CacheContents, CacheError};
pub use http::{HttpAssetRequest, HttpDownloader};
pub use key::StorageKey;
