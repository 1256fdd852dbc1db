use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::key::StorageKey;

/// The on-disk tier of the cache: one file of raw bytes per [`StorageKey`],
/// no metadata.
///
/// Reads treat every failure as a miss, writes are atomic. Neither surfaces
/// errors to lookups; problems are diagnosable through logs only.
#[derive(Debug, Clone)]
pub struct DiskStore {
    cache_dir: PathBuf,
}

impl DiskStore {
    /// Opens the store rooted at `cache_dir`, creating the directory
    /// recursively if it does not exist.
    ///
    /// Construction fails if the directory cannot be prepared; a cache
    /// without its disk tier is never handed out.
    pub fn new(cache_dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;

        Ok(Self { cache_dir })
    }

    /// The directory holding the cache files.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &StorageKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }

    /// Reads the stored bytes for `key`, if any.
    ///
    /// A missing file is an ordinary miss. All other I/O errors are logged
    /// and reported as a miss as well, so the caller falls through to a
    /// fresh download.
    pub fn read(&self, key: &StorageKey) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        tracing::trace!("Trying cache file at path {}", path.display());

        match catch_not_found(|| std::fs::read(&path)) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    path = %path.display(),
                    "Failed to read cache file",
                );
                None
            }
        }
    }

    /// Persists `bytes` under `key`.
    ///
    /// The bytes are written to a temporary file in the cache directory and
    /// then atomically moved into place, so a concurrent reader of the same
    /// key sees either the complete entry or none at all. The dot prefix
    /// keeps temporary files out of the key namespace, which never starts
    /// with a dot.
    pub fn write(&self, key: &StorageKey, bytes: &[u8]) -> io::Result<()> {
        let path = self.entry_path(key);
        tracing::trace!("Creating cache file at path {}", path.display());

        let mut temp_file = tempfile::Builder::new()
            .prefix(".tmp")
            .tempfile_in(&self.cache_dir)?;
        temp_file.write_all(bytes)?;
        temp_file.persist(&path).map_err(|e| e.error)?;

        Ok(())
    }
}

/// Maps `NotFound` errors into `None` so callers can treat them as a cache
/// miss.
fn catch_not_found<F, R>(f: F) -> io::Result<Option<R>>
where
    F: FnOnce() -> io::Result<R>,
{
    match f() {
        Ok(x) => Ok(Some(x)),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => Ok(None),
            _ => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir_created() {
        let basedir = assetcache_test::tempdir();
        let cachedir = basedir.path().join("cache");

        let _store = DiskStore::new(cachedir.clone()).unwrap();

        let fsinfo = std::fs::metadata(cachedir).unwrap();
        assert!(fsinfo.is_dir());
    }

    #[test]
    fn test_cache_dir_not_creatable() {
        let basedir = assetcache_test::tempdir();
        let blocker = basedir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        assert!(DiskStore::new(blocker.join("cache")).is_err());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let basedir = assetcache_test::tempdir();
        let store = DiskStore::new(basedir.path().join("cache")).unwrap();
        let key = StorageKey::from_url("https://example.com/a.png");

        assert_eq!(store.read(&key), None);

        store.write(&key, b"asset bytes").unwrap();
        assert_eq!(store.read(&key).as_deref(), Some(&b"asset bytes"[..]));
    }

    #[test]
    fn test_unreadable_entry_is_a_miss() {
        let basedir = assetcache_test::tempdir();
        let store = DiskStore::new(basedir.path().join("cache")).unwrap();
        let key = StorageKey::from_url("https://example.com/a.png");

        // A directory at the entry path makes the read fail with something
        // other than `NotFound`.
        std::fs::create_dir(store.cache_dir().join(key.as_str())).unwrap();

        assert_eq!(store.read(&key), None);
    }

    #[test]
    fn test_write_fails_on_blocked_path() {
        let basedir = assetcache_test::tempdir();
        let store = DiskStore::new(basedir.path().join("cache")).unwrap();
        let key = StorageKey::from_url("https://example.com/a.png");

        std::fs::create_dir(store.cache_dir().join(key.as_str())).unwrap();

        assert!(store.write(&key, b"asset bytes").is_err());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let basedir = assetcache_test::tempdir();
        let store = DiskStore::new(basedir.path().join("cache")).unwrap();
        let key = StorageKey::from_url("https://example.com/a.png");

        store.write(&key, b"asset bytes").unwrap();

        let names: Vec<_> = std::fs::read_dir(store.cache_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![key.as_str().to_owned()]);
    }
}
