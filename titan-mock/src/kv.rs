//! In-memory KV bucket with bounded per-key history.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use titan_core::broker::{KvBucket, KvEntry};
use titan_core::{FabricError, subject};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Revision {
    revision: u64,
    value: Option<Vec<u8>>,
    stored_at: tokio::time::Instant,
}

struct Watcher {
    filter: String,
    tx: mpsc::Sender<KvEntry>,
}

/// KV bucket backed by process memory.
pub struct MemoryKvBucket {
    history: usize,
    ttl: Option<Duration>,
    revisions: AtomicU64,
    data: Mutex<HashMap<String, Vec<Revision>>>,
    watchers: Mutex<Vec<Watcher>>,
}

impl MemoryKvBucket {
    /// Bucket keeping `history` revisions per key.
    #[must_use]
    pub fn new(history: u8, ttl: Option<Duration>) -> Self {
        Self {
            history: usize::from(history.max(1)),
            ttl,
            revisions: AtomicU64::new(0),
            data: Mutex::new(HashMap::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// All retained revisions for a key, oldest first.
    #[must_use]
    pub fn history_of(&self, key: &str) -> Vec<(u64, Option<Vec<u8>>)> {
        self.data
            .lock()
            .expect("kv lock")
            .get(key)
            .map(|revs| {
                revs.iter()
                    .map(|r| (r.revision, r.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn live(&self, rev: &Revision) -> bool {
        self.ttl
            .is_none_or(|ttl| rev.stored_at.elapsed() < ttl)
    }

    fn store(&self, key: &str, value: Option<Vec<u8>>) -> u64 {
        let revision = self.revisions.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut data = self.data.lock().expect("kv lock");
            let revs = data.entry(key.to_string()).or_default();
            revs.push(Revision {
                revision,
                value: value.clone(),
                stored_at: tokio::time::Instant::now(),
            });
            let excess = revs.len().saturating_sub(self.history);
            if excess > 0 {
                revs.drain(..excess);
            }
        }
        let entry = KvEntry {
            key: key.to_string(),
            value,
            revision,
        };
        let mut watchers = self.watchers.lock().expect("kv watchers lock");
        watchers.retain(|w| !w.tx.is_closed());
        for w in watchers.iter() {
            if subject::subject_matches(&w.filter, key) {
                let _ = w.tx.try_send(entry.clone());
            }
        }
        revision
    }
}

#[async_trait]
impl KvBucket for MemoryKvBucket {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, FabricError> {
        Ok(self.store(key, Some(value)))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FabricError> {
        Ok(self
            .data
            .lock()
            .expect("kv lock")
            .get(key)
            .and_then(|revs| revs.last())
            .filter(|rev| self.live(rev))
            .and_then(|rev| rev.value.clone()))
    }

    async fn keys(&self) -> Result<Vec<String>, FabricError> {
        let data = self.data.lock().expect("kv lock");
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(_, revs)| {
                revs.last()
                    .is_some_and(|rev| rev.value.is_some() && self.live(rev))
            })
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), FabricError> {
        self.store(key, None);
        Ok(())
    }

    async fn watch(&self, key_filter: &str) -> Result<mpsc::Receiver<KvEntry>, FabricError> {
        let (tx, rx) = mpsc::channel(64);
        self.watchers.lock().expect("kv watchers lock").push(Watcher {
            filter: key_filter.to_string(),
            tx,
        });
        Ok(rx)
    }
}
