//! Play a scenario against a real coordinator and a simulated remote.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use optimist_cache::{CacheEntry, CacheUpdate, Patch, QueryCache, RecordId};
use optimist_mutation::{
    BatchOutcome, BroadcastSink, Coordinator, MutationError, NotificationEvent, RemoteExecutor,
    RemoteFailure,
};

use crate::scenario::{RemoteOutcome, RemoteScript, Scenario, ScenarioError};

/// Remote that answers as the scenario scripts it.
pub struct ScriptedRemote {
    script: RemoteScript,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new(script: RemoteScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedRemote {
    async fn update_many(
        &self,
        resource: &str,
        ids: &[RecordId],
        _values: &Patch,
    ) -> Result<BatchOutcome, RemoteFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!(resource, count = ids.len(), "remote: update_many");
        if self.script.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.script.latency_ms)).await;
        }
        match self.script.outcome {
            RemoteOutcome::Success => Ok(BatchOutcome::new(ids.iter().cloned())),
            RemoteOutcome::Failure => Err(RemoteFailure::new(
                self.script.status,
                self.script.message.clone(),
            )),
        }
    }
}

/// One cache row as printed in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheRow {
    pub key: String,
    pub stale: bool,
    pub entry: CacheEntry,
}

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Committed,
    Cancelled,
    Failed,
    Rejected,
}

/// Everything a scenario run observed.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub remote_calls: usize,
    pub elapsed_ms: u64,
    pub seeded: Vec<CacheRow>,
    /// Cache right after submission returned.
    pub staged: Vec<CacheRow>,
    pub settled: Vec<CacheRow>,
    /// Cache update events, in order.
    pub updates: Vec<String>,
    pub notifications: Vec<NotificationEvent>,
}

fn rows(cache: &QueryCache) -> Vec<CacheRow> {
    cache
        .keys()
        .into_iter()
        .filter_map(|key| {
            let entry = cache.get(&key)?;
            Some(CacheRow {
                key: key.to_string(),
                stale: cache.is_stale(&key),
                entry,
            })
        })
        .collect()
}

fn describe(update: &CacheUpdate) -> String {
    match update {
        CacheUpdate::Written { key } => format!("written {}", key),
        CacheUpdate::Invalidated { key } => format!("invalidated {}", key),
        CacheUpdate::Removed { key } => format!("removed {}", key),
        CacheUpdate::Quiesced { key } => format!("quiesced {}", key),
        CacheUpdate::Resumed { key } => format!("resumed {}", key),
    }
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(item) => items.push(item),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "report subscriber lagged");
            }
            Err(_) => break,
        }
    }
    items
}

/// Run a scenario to completion.
#[tracing::instrument(skip_all, fields(resource = %scenario.mutation.resource, mode = %scenario.mutation.mode))]
pub async fn run(scenario: &Scenario) -> Result<Report, ScenarioError> {
    let cache = QueryCache::new();
    cache.set_suppress_broadcasts(true);
    for seed in &scenario.seed {
        cache.insert(seed.key.clone(), seed.entry.clone())?;
    }
    cache.set_suppress_broadcasts(false);
    let seeded = rows(&cache);

    let mut updates_rx = cache.subscribe();
    let sink = BroadcastSink::new();
    let mut notifications_rx = sink.subscribe();
    let remote = ScriptedRemote::new(scenario.remote.clone());

    let coordinator = Coordinator::builder(cache.clone(), remote.clone())
        .notifications(sink)
        .config(scenario.config.clone())
        .build()?;

    let started = Instant::now();
    let (staged, outcome) = match coordinator.submit(scenario.mutation.to_request()) {
        Ok(submission) => {
            let staged = rows(&cache);
            if let Some(ms) = scenario.cancel_after_ms {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let cancelled = submission.cancel();
                info!(after_ms = ms, cancelled, "undo requested");
            }
            (staged, submission.await)
        }
        Err(e) => (rows(&cache), Err(e)),
    };

    let (verdict, error) = match &outcome {
        Ok(_) => (Verdict::Committed, None),
        Err(e @ (MutationError::NoOpSubmission | MutationError::InvalidDelay { .. })) => {
            (Verdict::Rejected, Some(e.to_string()))
        }
        Err(e) if e.is_cancelled() => (Verdict::Cancelled, Some(e.to_string())),
        Err(e) => (Verdict::Failed, Some(e.to_string())),
    };

    Ok(Report {
        verdict,
        error,
        remote_calls: remote.calls(),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        seeded,
        staged,
        settled: rows(&cache),
        updates: drain(&mut updates_rx).iter().map(describe).collect(),
        notifications: drain(&mut notifications_rx),
    })
}

fn write_rows(f: &mut fmt::Formatter<'_>, title: &str, rows: &[CacheRow]) -> fmt::Result {
    writeln!(f, "{}:", title)?;
    if rows.is_empty() {
        writeln!(f, "  (empty)")?;
    }
    for row in rows {
        let entry = serde_json::to_string(&row.entry).map_err(|_| fmt::Error)?;
        let stale = if row.stale { " [stale]" } else { "" };
        writeln!(f, "  {}{} {}", row.key, stale, entry)?;
    }
    Ok(())
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verdict: {:?}", self.verdict)?;
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "remote calls: {}, elapsed: {}ms",
            self.remote_calls, self.elapsed_ms
        )?;
        write_rows(f, "seeded", &self.seeded)?;
        write_rows(f, "staged", &self.staged)?;
        write_rows(f, "settled", &self.settled)?;
        writeln!(f, "cache updates:")?;
        for update in &self.updates {
            writeln!(f, "  {}", update)?;
        }
        writeln!(f, "notifications:")?;
        if self.notifications.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for event in &self.notifications {
            writeln!(
                f,
                "  {:?} {} {} (count {})",
                event.kind, event.key, event.message, event.detail.count
            )?;
        }
        Ok(())
    }
}
