use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, Weak};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::CacheConfig;
use crate::disk::DiskStore;
use crate::error::{CacheContents, CacheError};
use crate::key::StorageKey;
use crate::utils::AbortOnDrop;

/// The channel on which a download task publishes its result.
///
/// Every caller interested in the download holds a clone of the channel, so
/// the result (or error) is broadcast to all of them at once.
type DownloadChannel<A> = Shared<oneshot::Receiver<CacheContents<A>>>;

/// A running download that concurrent callers attach to.
struct InFlightDownload<A> {
    channel: DownloadChannel<A>,
    /// Cancels the download task when the entry is dropped before the task
    /// could publish a result, i.e. when the owning cache is torn down.
    abort: AbortOnDrop,
}

/// The state of one cache key.
///
/// A key starts out absent from the index, moves to `InFlight` when its
/// first download is published, and ends up `Ready` or `Failed`. Both
/// terminal states stick around until a later successful download overwrites
/// them; nothing is ever evicted.
enum Entry<A> {
    /// A download for this key is running; attach to its channel.
    InFlight(InFlightDownload<A>),
    /// The decoded asset, served from memory to all subsequent lookups.
    Ready(A),
    /// The terminal error of the last download attempt, served to repeat
    /// lookups so they fail fast instead of re-fetching.
    Failed(CacheError),
}

/// Which tier of the cache satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Served from the decoded in-memory entry.
    Memory,
    /// Read back from the on-disk store and promoted into memory.
    Disk,
    /// Attached to a download that another caller had already started.
    Coalesced,
    /// Freshly downloaded by this caller.
    Downloaded,
}

impl CacheSource {
    /// Stable name for log fields and metric tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Coalesced => "coalesced",
            Self::Downloaded => "downloaded",
        }
    }
}

/// Transport and decoding for the assets managed by an [`AssetCache`].
///
/// The cache itself never touches the network and has no opinion on what an
/// asset is; both concerns are supplied through this trait. See
/// [`HttpAssetRequest`](crate::HttpAssetRequest) for a ready-made
/// implementation on top of plain HTTP.
pub trait AssetRequest: 'static + Send + Sync + Clone {
    /// The decoded asset type handed out by the cache.
    ///
    /// Assets are cloned into every caller, so this should be cheap to clone
    /// (a handle, an `Arc`, a small struct).
    type Asset: 'static + Send + Sync + Clone;

    /// Fetches the raw asset bytes for `url`.
    ///
    /// The cache accepts any string as a key; URL validation happens here,
    /// and a malformed URL fails the download with
    /// [`CacheError::InvalidUrl`].
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CacheContents<Vec<u8>>>;

    /// Decodes fetched or disk-loaded bytes into an asset.
    fn decode(&self, bytes: &[u8]) -> CacheContents<Self::Asset>;
}

/// A two-tier cache for binary assets fetched from remote URLs.
///
/// Assets are kept decoded in memory and as raw bytes on disk. A lookup goes
/// memory, then disk, then network, and concurrent lookups for the same URL
/// are coalesced onto a single download instead of hitting the network once
/// per caller.
///
/// The cache is cheap to clone; all clones share the same state. Dropping
/// the last clone cancels outstanding downloads, see
/// [`CacheError::OwnerGone`].
pub struct AssetCache<R: AssetRequest> {
    inner: Arc<CacheInner<R>>,
}

struct CacheInner<R: AssetRequest> {
    request: R,
    disk: DiskStore,
    /// Every cache key this process has seen, in whatever state it is in.
    ///
    /// This is the single serialization point of the cache: all
    /// state-transition decisions happen under this lock, and the lock is
    /// never held across downloads, decoding, or disk I/O.
    entries: Mutex<HashMap<String, Entry<R::Asset>>>,
}

impl<R: AssetRequest> Clone for AssetCache<R> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: AssetRequest> fmt::Debug for AssetCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .inner
            .entries
            .try_lock()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("AssetCache")
            .field("cache_dir", &self.inner.disk.cache_dir())
            .field("entries", &entries)
            .finish()
    }
}

impl<R: AssetRequest> AssetCache<R> {
    /// Creates a cache that stores assets under `config.cache_dir`.
    ///
    /// The directory is created recursively. If that fails, no cache
    /// instance is returned at all.
    pub fn new(config: CacheConfig, request: R) -> io::Result<Self> {
        let disk = DiskStore::new(config.cache_dir)?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                request,
                disk,
                entries: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Looks up or downloads the asset for `url`.
    ///
    /// Lookup order is memory, then disk, then network; the returned
    /// [`CacheSource`] says which tier answered. Concurrent lookups for the
    /// same URL share a single download and resolve to the identical result.
    ///
    /// A failed download is remembered: subsequent lookups of the key return
    /// the stored error immediately, without re-fetching.
    pub async fn get(&self, url: &str) -> CacheContents<(R::Asset, CacheSource)> {
        let channel = {
            let entries = self.inner.entries.lock().unwrap();
            match entries.get(url) {
                Some(Entry::Ready(asset)) => {
                    return Ok((asset.clone(), CacheSource::Memory));
                }
                Some(Entry::InFlight(download)) => Some(download.channel.clone()),
                Some(Entry::Failed(error)) => return Err(error.clone()),
                None => None,
            }
        };

        if let Some(channel) = channel {
            let asset = wait_for_download(channel).await?;
            return Ok((asset, CacheSource::Coalesced));
        }

        self.load_or_download(url).await
    }

    /// Slow path for a key the index has never seen: try the disk tier,
    /// then fall back to downloading.
    async fn load_or_download(&self, url: &str) -> CacheContents<(R::Asset, CacheSource)> {
        let key = StorageKey::from_url(url);

        if let Some(bytes) = self.inner.disk.read(&key) {
            match self.inner.request.decode(&bytes) {
                Ok(asset) => return Ok(self.promote(url, asset)),
                Err(error) => {
                    // Treated like a miss; the download below overwrites
                    // the file.
                    tracing::warn!(%key, %error, "Discarding undecodable cache file");
                }
            }
        }

        // The disk probe ran without the index lock, so the index may have
        // changed: attach to whatever appeared in the meantime, or publish a
        // new download. Checking for an existing download and publishing a
        // new one happen under a single lock acquisition, which is what
        // makes the download single-flight.
        let (channel, source) = {
            let mut entries = self.inner.entries.lock().unwrap();
            match entries.get(url) {
                Some(Entry::Ready(asset)) => {
                    return Ok((asset.clone(), CacheSource::Memory));
                }
                Some(Entry::InFlight(download)) => {
                    (download.channel.clone(), CacheSource::Coalesced)
                }
                Some(Entry::Failed(error)) => return Err(error.clone()),
                None => {
                    let channel = self.spawn_download(&mut entries, url, key);
                    (channel, CacheSource::Downloaded)
                }
            }
        };

        let asset = wait_for_download(channel).await?;
        Ok((asset, source))
    }

    /// Puts a disk-loaded asset into the index.
    ///
    /// The index stays authoritative: if a concurrent caller populated the
    /// key while the disk read was running, its entry is left untouched.
    fn promote(&self, url: &str, asset: R::Asset) -> (R::Asset, CacheSource) {
        let mut entries = self.inner.entries.lock().unwrap();
        match entries.get(url) {
            Some(Entry::Ready(existing)) => (existing.clone(), CacheSource::Memory),
            Some(_) => (asset, CacheSource::Disk),
            None => {
                entries.insert(url.to_owned(), Entry::Ready(asset.clone()));
                (asset, CacheSource::Disk)
            }
        }
    }

    /// Spawns the download task for `url` and publishes it as in-flight.
    ///
    /// The caller must hold the index lock and have verified that no entry
    /// exists for `url`. The in-flight entry is inserted before the lock is
    /// released, which closes the window between deciding to download and
    /// publishing the download in which a second caller could start its own.
    fn spawn_download(
        &self,
        entries: &mut HashMap<String, Entry<R::Asset>>,
        url: &str,
        key: StorageKey,
    ) -> DownloadChannel<R::Asset> {
        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();

        // The task is handed a weak reference: a download must not keep its
        // own cache alive once every handle to it is gone.
        let task = tokio::spawn(download_and_publish(
            Arc::downgrade(&self.inner),
            self.inner.request.clone(),
            self.inner.disk.clone(),
            url.to_owned(),
            key,
            sender,
        ));

        let evicted = entries.insert(
            url.to_owned(),
            Entry::InFlight(InFlightDownload {
                channel: channel.clone(),
                abort: AbortOnDrop::new(task.abort_handle()),
            }),
        );
        debug_assert!(evicted.is_none());

        channel
    }
}

/// Awaits a download channel.
///
/// The sender is dropped without a result only when the download task was
/// torn down together with the owning cache; all waiters observe that
/// uniformly as [`CacheError::OwnerGone`].
async fn wait_for_download<A: Clone>(channel: DownloadChannel<A>) -> CacheContents<A> {
    match channel.await {
        Ok(result) => result,
        Err(_canceled) => Err(CacheError::OwnerGone),
    }
}

/// Runs a single download to completion: fetch, decode, write-through, and
/// the index transition out of the in-flight state.
async fn download_and_publish<R: AssetRequest>(
    cache: Weak<CacheInner<R>>,
    request: R,
    disk: DiskStore,
    url: String,
    key: StorageKey,
    sender: oneshot::Sender<CacheContents<R::Asset>>,
) {
    let result = download(&request, &disk, &url, &key).await;

    // Replace the in-flight entry with the terminal state. If the cache was
    // torn down mid-download this task has already been aborted; the upgrade
    // failing means there is no index left to publish to.
    if let Some(cache) = cache.upgrade() {
        let state = match &result {
            Ok(asset) => Entry::Ready(asset.clone()),
            Err(error) => Entry::Failed(error.clone()),
        };

        let mut entries = cache.entries.lock().unwrap();
        if let Some(Entry::InFlight(in_flight)) = entries.insert(url, state) {
            // Dropping the guard would abort this very task.
            in_flight.abort.disarm();
        }
    }

    sender.send(result).ok();
}

/// The unit of work behind an in-flight entry.
async fn download<R: AssetRequest>(
    request: &R,
    disk: &DiskStore,
    url: &str,
    key: &StorageKey,
) -> CacheContents<R::Asset> {
    tracing::debug!(url, "Downloading asset");

    let bytes = request.fetch(url).await?;
    let asset = request.decode(&bytes)?;

    // A failed write leaves the asset memory-only until the process
    // restarts; the download still counts as successful for every waiter.
    if let Err(e) = disk.write(key, &bytes) {
        tracing::error!(
            error = &e as &dyn std::error::Error,
            %key,
            "Failed to persist downloaded asset",
        );
    }

    Ok(asset)
}
