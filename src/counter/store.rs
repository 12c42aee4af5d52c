use crate::config::StoreConfig;
use crate::core::{CounterSnapshot, HitRecord, Result, TallyError};
use crate::resolver::TitleResolver;
use crate::storage::{SnapshotFile, encode_snapshot};
use crate::sweeper::{Flush, Sweeper};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct CounterState {
    realms: CounterSnapshot,
    /// Bumped on every mutation.
    generation: u64,
    /// Generation captured by the last successful write.
    persisted: u64,
    snapshot_file: SnapshotFile,
}

impl CounterState {
    fn is_dirty(&self) -> bool {
        self.generation != self.persisted
    }
}

/// Mutex-guarded realm -> key -> record map with dirty tracking.
///
/// Every operation, reads included, goes through one lock. Title resolution
/// for a new key in the auto realm runs while that lock is held, so
/// concurrent first hits on the same key resolve once.
pub struct CounterStore {
    config: StoreConfig,
    resolver: Arc<dyn TitleResolver>,
    state: Mutex<CounterState>,
    persist_lock: Mutex<()>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl CounterStore {
    /// Creates an empty store holding the configured realms.
    pub fn new(config: StoreConfig, resolver: Arc<dyn TitleResolver>) -> Self {
        let realms = config
            .initial_realms()
            .into_iter()
            .map(|realm| (realm, Default::default()))
            .collect();
        let snapshot_file = SnapshotFile::new(config.snapshot_path());

        Self {
            config,
            resolver,
            state: Mutex::new(CounterState {
                realms,
                generation: 0,
                persisted: 0,
                snapshot_file,
            }),
            persist_lock: Mutex::new(()),
            sweeper: Mutex::new(None),
        }
    }

    /// Creates a store and loads the configured snapshot if one exists.
    ///
    /// A missing file yields an empty store; an unreadable or corrupt file
    /// is a `LoadFailed` error.
    pub async fn open(config: StoreConfig, resolver: Arc<dyn TitleResolver>) -> Result<Self> {
        let file = SnapshotFile::new(config.snapshot_path());
        let store = Self::new(config, resolver);
        if file.exists() {
            store.load_from_file(file.path()).await?;
        } else {
            info!(path = %file.path().display(), "no snapshot found, starting empty");
        }
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn contains(&self, realm: &str, key: &str) -> bool {
        let state = self.state.lock().await;
        state
            .realms
            .get(realm)
            .is_some_and(|records| records.contains_key(key))
    }

    /// Increments the record for `(realm, key)` and returns a copy of it.
    ///
    /// Unknown realms, unknown keys outside the auto realm, and failed title
    /// resolutions all return the zero record and leave the store untouched.
    pub async fn update(&self, realm: &str, key: &str) -> HitRecord {
        let mut state = self.state.lock().await;

        let existing = match state.realms.get(realm) {
            Some(records) => records.get(key).cloned(),
            None => return HitRecord::default(),
        };

        let mut record = match existing {
            Some(record) => record,
            None if self.config.is_auto_realm(realm) => {
                let url = self.config.title_url(key);
                match self.resolver.resolve(&url).await {
                    Ok(title) => HitRecord::titled(title),
                    Err(err) => {
                        warn!(realm, key, url = %url, error = %err, "title resolution failed, hit dropped");
                        return HitRecord::default();
                    }
                }
            }
            None => return HitRecord::default(),
        };

        record.count += 1;
        if let Some(records) = state.realms.get_mut(realm) {
            records.insert(key.to_string(), record.clone());
        }
        state.generation += 1;
        debug!(realm, key, count = record.count, "hit recorded");
        record
    }

    pub async fn get(&self, realm: &str, key: &str) -> Option<HitRecord> {
        let state = self.state.lock().await;
        state.realms.get(realm)?.get(key).cloned()
    }

    pub async fn realm_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.realms.keys().cloned().collect()
    }

    /// Deep copy of every realm.
    pub async fn snapshot(&self) -> CounterSnapshot {
        self.state.lock().await.realms.clone()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.is_dirty()
    }

    /// JSON object of key -> record for one realm.
    pub async fn dump_realm(&self, realm: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        let records = state
            .realms
            .get(realm)
            .ok_or_else(|| TallyError::NotFound(format!("realm {:?}", realm)))?;
        serde_json::to_vec_pretty(records)
            .map_err(|err| TallyError::PersistFailed(format!("serialize realm {:?}: {}", realm, err)))
    }

    /// JSON object of realm -> key -> record, the snapshot file format.
    pub async fn dump_all(&self) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        encode_snapshot(&state.realms)
    }

    /// Writes the whole map if anything changed since the last write.
    ///
    /// `path` overrides the configured snapshot file for this call. Returns
    /// whether a write happened. The map is serialized under the lock but
    /// written outside it, and dirty is only cleared if no update landed in
    /// between.
    pub async fn persist_if_dirty(&self, path: Option<&Path>) -> Result<bool> {
        let _persisting = self.persist_lock.lock().await;

        let (bytes, generation, file) = {
            let state = self.state.lock().await;
            if !state.is_dirty() {
                return Ok(false);
            }
            let file = match path {
                Some(path) => SnapshotFile::new(path),
                None => state.snapshot_file.clone(),
            };
            (encode_snapshot(&state.realms)?, state.generation, file)
        };

        file.write(&bytes).await?;

        let mut state = self.state.lock().await;
        state.persisted = state.persisted.max(generation);
        debug!(path = %file.path().display(), bytes = bytes.len(), "counter snapshot written");
        Ok(true)
    }

    /// Replaces the whole map with the contents of `path`, which becomes the
    /// default snapshot file.
    pub async fn load_from_file(&self, path: &Path) -> Result<()> {
        let _persisting = self.persist_lock.lock().await;

        let file = SnapshotFile::new(path);
        let mut realms = file.load().await?;
        let mut added = false;
        for realm in self.config.initial_realms() {
            if !realms.contains_key(&realm) {
                realms.insert(realm, Default::default());
                added = true;
            }
        }

        let mut state = self.state.lock().await;
        let keys: usize = realms.values().map(|records| records.len()).sum();
        state.realms = realms;
        state.persisted = state.generation;
        if added {
            // The file lacks a configured realm, so memory is ahead of disk.
            state.generation += 1;
        }
        state.snapshot_file = file;
        info!(path = %path.display(), keys, "counter snapshot loaded");
        Ok(())
    }

    /// Starts the periodic flush task if it is not already running.
    pub async fn start_sweeper(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_none() {
            *sweeper = Some(Sweeper::spawn(Arc::downgrade(self), self.config.sweep_interval));
        }
    }

    /// Stops the sweeper and performs one final flush.
    pub async fn shutdown(&self) -> Result<bool> {
        let sweeper = self.sweeper.lock().await.take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await?;
        }
        self.persist_if_dirty(None).await
    }
}

#[async_trait]
impl Flush for CounterStore {
    fn label(&self) -> &'static str {
        "counter store"
    }

    async fn flush(&self) -> Result<()> {
        self.persist_if_dirty(None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedTitle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TitleResolver for FixedTitle {
        async fn resolve(&self, url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("title of {url}"))
        }
    }

    fn store_in(dir: &TempDir) -> (CounterStore, Arc<FixedTitle>) {
        let resolver = Arc::new(FixedTitle {
            calls: AtomicUsize::new(0),
        });
        let config = StoreConfig::new(dir.path().join("counters.json"))
            .realm("quiz")
            .title_origin("https://example.org");
        (CounterStore::new(config, resolver.clone()), resolver)
    }

    #[tokio::test]
    async fn test_first_hit_resolves_title_once() {
        let dir = TempDir::new().unwrap();
        let (store, resolver) = store_in(&dir);

        let first = store.update("hit", "/a.html").await;
        let second = store.update("hit", "/a.html").await;

        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
        assert_eq!(second.title, "title of https://example.org/a.html");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert!(store.contains("hit", "/a.html").await);
        assert!(store.is_dirty().await);
    }

    #[tokio::test]
    async fn test_plain_realm_ignores_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let (store, resolver) = store_in(&dir);

        assert_eq!(store.update("quiz", "/q").await, HitRecord::default());
        assert_eq!(store.update("nope", "/q").await, HitRecord::default());
        assert!(!store.contains("quiz", "/q").await);
        assert!(!store.is_dirty().await);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dump_realm_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_in(&dir);
        let err = store.dump_realm("missing").await.unwrap_err();
        assert!(matches!(err, TallyError::NotFound(_)));

        let bytes = store.dump_realm("quiz").await.unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn test_persist_only_when_dirty() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_in(&dir);
        assert!(!store.persist_if_dirty(None).await.unwrap());

        store.update("hit", "/a").await;
        assert!(store.persist_if_dirty(None).await.unwrap());
        assert!(!store.persist_if_dirty(None).await.unwrap());
        assert!(!store.is_dirty().await);
    }

    #[tokio::test]
    async fn test_load_adds_configured_realms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, r#"{"hit":{"/x":{"Count":4,"Title":"X"}}}"#).unwrap();

        let (store, _) = store_in(&dir);
        store.load_from_file(&path).await.unwrap();

        assert_eq!(store.realm_names().await, vec!["hit".to_string(), "quiz".to_string()]);
        assert_eq!(store.get("hit", "/x").await.unwrap().count, 4);
        // The added "quiz" realm is not on disk yet.
        assert!(store.is_dirty().await);
    }
}
