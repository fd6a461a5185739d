//! Append-only mmap storage engine: the core of the crate.
//!
//! A single fixed-size file is mapped read-write. Every mutation appends a
//! new record at the write cursor and repoints an in-memory index; nothing
//! is ever edited in place, truncated, or compacted. See `record` for the
//! on-disk layout and `index` for the volatile lookup structure.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::index::Index;
use crate::record;

/// Size of the mapped region. Fixed for the lifetime of a file: the engine
/// never expands it.
pub const FILE_SIZE: usize = 1_048_576;

struct StoreState {
    mmap: MmapMut,
    write_offset: usize,
    index: Index,
    region_size: usize,
}

/// Concurrent, persistent key-value store backed by a fixed-size mmap file.
///
/// Cloning shares the same underlying mapping and lock; it is the handle
/// callers pass to worker threads.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreState>>,
    path: PathBuf,
}

impl Store {
    /// Opens (creating if absent) the file at `path`, sizes it to
    /// [`FILE_SIZE`], maps it, and replays it to rebuild the index.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::open_with_capacity(path, FILE_SIZE)
    }

    /// Opens (creating if absent) the file at `path`, sizes it to
    /// `region_size` bytes, maps it, and replays it to rebuild the index.
    ///
    /// Lets embedders that construct a [`crate::config::ServerConfig`]
    /// with a non-default region size get a store to match; [`Store::open`]
    /// is the shorthand for the common case where `region_size` is
    /// [`FILE_SIZE`].
    pub fn open_with_capacity(path: impl AsRef<Path>, region_size: usize) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let current_len = file.metadata()?.len();
        if current_len < region_size as u64 {
            file.set_len(region_size as u64)?;
        }

        // SAFETY: this process owns the file exclusively for the lifetime
        // of the mapping; no other process is expected to write to it
        // concurrently.
        let mmap = unsafe { MmapOptions::new().len(region_size).map_mut(&file)? };

        let (index, write_offset) = recover(&mmap);
        log::info!(
            "opened {} with {} live key(s)",
            path.display(),
            index.len()
        );
        log::debug!("recovery scan left write cursor at {write_offset}");

        Ok(Self {
            inner: Arc::new(Mutex::new(StoreState {
                mmap,
                write_offset,
                index,
                region_size,
            })),
            path,
        })
    }

    /// The backing file path this store was opened against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `value` under `key`. `ttl_millis > 0` expires the record that
    /// many milliseconds from now; `ttl_millis <= 0` means no expiry.
    ///
    /// Overwriting an existing key appends a new record and repoints the
    /// index; the previous record is left on disk, unreferenced.
    pub fn set(&self, key: &str, value: &str, ttl_millis: i64) -> EngineResult<()> {
        validate_key(key)?;
        let expire_ts = expiry_from_ttl(ttl_millis);
        let need = record::encoded_len(key, value);

        let mut state = self.inner.lock();
        let at = reserve(&mut state, need)?;
        let next = record::encode(&mut state.mmap, at, key, value, expire_ts);
        state.index.put(key.to_owned(), at);
        state.write_offset = next;
        Ok(())
    }

    /// Returns the value for `key`, or `None` if absent or expired.
    ///
    /// A read that observes an expired record evicts it from the index
    /// before returning (lazy expiry); the on-disk bytes are untouched.
    pub fn get(&self, key: &str) -> EngineResult<Option<String>> {
        validate_key(key)?;
        let mut state = self.inner.lock();
        let Some(offset) = state.index.get(key) else {
            return Ok(None);
        };
        let peeked = record::peek_value_and_expiry(&state.mmap, offset)
            .expect("index offset must reference a well-formed record");

        if is_expired(peeked.expire_ts) {
            state.index.remove(key);
            log::debug!("lazily evicted expired key during get");
            return Ok(None);
        }
        Ok(Some(peeked.value))
    }

    /// Removes `key` from the index. Returns `true` if it was present.
    /// The record's bytes remain on disk, tombstoned by reindex.
    pub fn del(&self, key: &str) -> EngineResult<bool> {
        validate_key(key)?;
        let mut state = self.inner.lock();
        Ok(state.index.remove(key))
    }

    /// Rewrites `key`'s expiry without changing its value. Returns `false`
    /// (no side effects) if `key` is absent. `ttl_millis` must not be
    /// negative; `0` clears any existing expiry.
    ///
    /// Unlike `set`, a prior expiry is not consulted: expiring an
    /// already-expired-but-not-yet-evicted key resurrects it with the new
    /// TTL. This mirrors the observable contract, not an oversight.
    pub fn expire(&self, key: &str, ttl_millis: i64) -> EngineResult<bool> {
        validate_key(key)?;
        if ttl_millis < 0 {
            return Err(EngineError::InvalidArgument(
                "ttl must not be negative",
            ));
        }

        let mut state = self.inner.lock();
        let Some(offset) = state.index.get(key) else {
            return Ok(false);
        };
        let peeked = record::peek_value_and_expiry(&state.mmap, offset)
            .expect("index offset must reference a well-formed record");

        let expire_ts = expiry_from_ttl(ttl_millis);
        let need = record::encoded_len(key, &peeked.value);
        let at = reserve(&mut state, need)?;
        let next = record::encode(&mut state.mmap, at, key, &peeked.value, expire_ts);
        state.index.put(key.to_owned(), at);
        state.write_offset = next;
        Ok(true)
    }
}

/// Checks the capacity invariant and returns the offset to write at, without
/// mutating the cursor — callers still must advance it after a successful
/// encode so a failed encode can never partially advance it.
fn reserve(state: &mut StoreState, need: usize) -> EngineResult<usize> {
    let available = state.region_size - state.write_offset;
    if need > available {
        return Err(EngineError::CapacityExhausted {
            needed: need,
            available,
        });
    }
    Ok(state.write_offset)
}

fn validate_key(key: &str) -> EngineResult<()> {
    if key.trim().is_empty() {
        return Err(EngineError::InvalidArgument("key must not be blank"));
    }
    Ok(())
}

fn expiry_from_ttl(ttl_millis: i64) -> i64 {
    if ttl_millis > 0 {
        now_ms() + ttl_millis
    } else {
        0
    }
}

fn is_expired(expire_ts: i64) -> bool {
    expire_ts != 0 && expire_ts < now_ms()
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_millis() as i64
}

/// Scans the mapped region from offset 0, rebuilding the index and
/// advancing past every complete record. Stops at the first malformed or
/// truncated record, leaving the write cursor pointed at its first byte so
/// the next `set` overwrites it.
fn recover(mmap: &MmapMut) -> (Index, usize) {
    let mut index = Index::new();
    let mut offset = 0usize;
    let now = now_ms();

    while let Some(decoded) = record::decode_at(mmap, offset) {
        if decoded.expire_ts == 0 || decoded.expire_ts > now {
            index.put(decoded.key, offset);
        }
        offset = decoded.next_offset;
    }

    (index, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn temp_store() -> (Store, NamedTempFile) {
        let file = NamedTempFile::new().expect("temp file");
        let store = Store::open(file.path()).unwrap();
        (store, file)
    }

    #[test]
    fn round_trip() {
        let (store, _file) = temp_store();
        store.set("foo", "bar", 0).unwrap();
        assert_eq!(store.get("foo").unwrap(), Some("bar".to_owned()));
    }

    #[test]
    fn last_write_wins() {
        let (store, _file) = temp_store();
        store.set("k", "v1", 0).unwrap();
        store.set("k", "v2", 0).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_owned()));
    }

    #[test]
    fn deletion() {
        let (store, _file) = temp_store();
        store.set("k", "v", 0).unwrap();
        assert!(store.del("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.del("k").unwrap());
    }

    #[test]
    fn lazy_expiry_via_set_ttl() {
        let (store, _file) = temp_store();
        store.set("e", "x", 100).unwrap();
        assert_eq!(store.get("e").unwrap(), Some("x".to_owned()));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(store.get("e").unwrap(), None);
    }

    #[test]
    fn non_positive_ttl_means_no_expiry() {
        let (store, _file) = temp_store();
        store.set("k", "v", 0).unwrap();
        store.set("k2", "v2", -5).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.get("k").unwrap(), Some("v".to_owned()));
        assert_eq!(store.get("k2").unwrap(), Some("v2".to_owned()));
    }

    #[test]
    fn expire_on_missing_key_is_a_noop() {
        let (store, _file) = temp_store();
        assert!(!store.expire("ghost", 100).unwrap());
    }

    #[test]
    fn expire_clears_ttl() {
        let (store, _file) = temp_store();
        store.set("k", "v", 10).unwrap();
        assert!(store.expire("k", 0).unwrap());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.get("k").unwrap(), Some("v".to_owned()));
    }

    #[test]
    fn expire_rejects_negative_ttl() {
        let (store, _file) = temp_store();
        store.set("k", "v", 0).unwrap();
        let err = store.expire("k", -1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn blank_keys_are_rejected_everywhere() {
        let (store, _file) = temp_store();
        assert!(matches!(
            store.set("   ", "v", 0).unwrap_err(),
            EngineError::InvalidArgument(_)
        ));
        assert!(matches!(
            store.get("").unwrap_err(),
            EngineError::InvalidArgument(_)
        ));
        assert!(matches!(
            store.del("\t\n").unwrap_err(),
            EngineError::InvalidArgument(_)
        ));
        assert!(matches!(
            store.expire(" ", 0).unwrap_err(),
            EngineError::InvalidArgument(_)
        ));
    }

    #[test]
    fn persists_across_reopen() {
        let file = NamedTempFile::new().unwrap();
        {
            let store = Store::open(file.path()).unwrap();
            store.set("k", "v", 0).unwrap();
        }
        let store = Store::open(file.path()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_owned()));
    }

    #[test]
    fn expired_keys_do_not_resurrect_across_reopen() {
        let file = NamedTempFile::new().unwrap();
        {
            let store = Store::open(file.path()).unwrap();
            store.set("session", "value", 50).unwrap();
        }
        thread::sleep(Duration::from_millis(100));
        let store = Store::open(file.path()).unwrap();
        assert_eq!(store.get("session").unwrap(), None);
    }

    #[test]
    fn capacity_exhausted_leaves_engine_unchanged() {
        let (store, _file) = temp_store();
        let huge = "x".repeat(FILE_SIZE);
        let err = store.set("big", &huge, 0).unwrap_err();
        assert!(matches!(err, EngineError::CapacityExhausted { .. }));
        assert_eq!(store.get("big").unwrap(), None);
    }

    #[test]
    fn unicode_keys_and_values_round_trip() {
        let (store, _file) = temp_store();
        let key = "都市-🚀";
        let value = "éè 你好";
        store.set(key, value, 0).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(value.to_owned()));
    }

    #[test]
    fn no_lost_updates_across_disjoint_keys() {
        let (store, _file) = temp_store();
        let handles: Vec<_> = (0..10)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("t{t}-k{i}");
                        let value = format!("t{t}-v{i}");
                        store.set(&key, &value, 0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for t in 0..10 {
            for i in 0..100 {
                let key = format!("t{t}-k{i}");
                let expected = format!("t{t}-v{i}");
                assert_eq!(store.get(&key).unwrap(), Some(expected));
            }
        }
    }

    #[test]
    fn concurrent_expire_all_succeed_and_evict() {
        let (store, _file) = temp_store();
        for i in 0..8 {
            store.set(&format!("k{i}"), "v", 0).unwrap();
        }
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || store.expire(&format!("k{i}"), 80).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        thread::sleep(Duration::from_millis(130));
        for i in 0..8 {
            assert_eq!(store.get(&format!("k{i}")).unwrap(), None);
        }
    }
}
