//! Shared fakes for coordinator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use optimist_cache::{CacheEntry, CacheKey, CacheStore, Patch, QueryCache, Record, RecordId};
use optimist_mutation::{
    BatchOutcome, NotificationEvent, NotificationSink, RemoteExecutor, RemoteFailure,
};

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub resource: String,
    pub ids: Vec<RecordId>,
    pub values: Patch,
}

/// Executor that records calls and answers with a scripted result.
pub struct RecordingExecutor {
    calls: Mutex<Vec<RemoteCall>>,
    failure: Option<RemoteFailure>,
    latency: Duration,
}

impl RecordingExecutor {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failure: None,
            latency: Duration::ZERO,
        })
    }

    pub fn failing(status: u16, message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failure: Some(RemoteFailure::new(status, message)),
            latency: Duration::ZERO,
        })
    }

    pub fn with_latency(self: Arc<Self>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failure: self.failure.clone(),
            latency,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn update_many(
        &self,
        resource: &str,
        ids: &[RecordId],
        values: &Patch,
    ) -> Result<BatchOutcome, RemoteFailure> {
        self.calls.lock().unwrap().push(RemoteCall {
            resource: resource.to_string(),
            ids: ids.to_vec(),
            values: values.clone(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(BatchOutcome::new(ids.iter().cloned())),
        }
    }
}

/// Cache store wrapper counting every access.
pub struct CountingStore {
    inner: Arc<QueryCache>,
    accesses: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<QueryCache>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            accesses: AtomicUsize::new(0),
        })
    }

    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
    }
}

impl CacheStore for CountingStore {
    fn list_keys_matching(&self, resource: &str, ids: &[RecordId]) -> Vec<CacheKey> {
        self.touch();
        self.inner.list_keys_matching(resource, ids)
    }

    fn read(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.touch();
        self.inner.read(key)
    }

    fn write(&self, key: &CacheKey, entry: CacheEntry) {
        self.touch();
        self.inner.write(key, entry)
    }

    fn invalidate(&self, key: &CacheKey) {
        self.touch();
        self.inner.invalidate(key)
    }

    fn quiesce(&self, key: &CacheKey) {
        self.touch();
        self.inner.quiesce(key)
    }

    fn resume(&self, key: &CacheKey) {
        self.touch();
        self.inner.resume(key)
    }
}

/// Sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn post(id: i64, status: &str) -> Record {
    Record::new(id)
        .with("status", status)
        .with("title", format!("post {}", id))
}

/// Cache seeded with a `posts` list of 1, 2, 3 plus single entries for 1
/// and 3, and an unrelated `users` list.
pub fn seeded_cache() -> Arc<QueryCache> {
    let cache = QueryCache::new();
    cache
        .insert(
            CacheKey::list("posts", "page=1"),
            CacheEntry::page(
                vec![post(1, "draft"), post(2, "draft"), post(3, "draft")],
                3,
            ),
        )
        .unwrap();
    cache
        .insert(CacheKey::one("posts", 1_i64), CacheEntry::single(post(1, "draft")))
        .unwrap();
    cache
        .insert(CacheKey::one("posts", 3_i64), CacheEntry::single(post(3, "draft")))
        .unwrap();
    cache
        .insert(
            CacheKey::list("users", ""),
            CacheEntry::collection(vec![Record::new(1_i64).with("name", "ada")]),
        )
        .unwrap();
    cache
}

/// Every entry of the cache, in insertion order.
pub fn dump(cache: &QueryCache) -> Vec<(CacheKey, Option<CacheEntry>)> {
    cache
        .keys()
        .into_iter()
        .map(|key| {
            let entry = cache.get(&key);
            (key, entry)
        })
        .collect()
}

pub fn ids(raw: &[i64]) -> Vec<RecordId> {
    raw.iter().copied().map(RecordId::Int).collect()
}

pub fn archive() -> Patch {
    Patch::new().with("status", "archived")
}
