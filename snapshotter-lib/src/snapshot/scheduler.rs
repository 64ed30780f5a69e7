use super::run_tracker::RunTracker;
use super::{EntityId, EntitySnapshot, FieldSet, Progress, ResourceFetcher, RunResult, SnapshotStore, Transport};
use chrono::Utc;
use core::time::Duration;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

const LOG_TARGET: &str = " scheduler";

/// Fetches many entities concurrently and gathers their snapshots in input order.
///
/// Entity `i` is started no earlier than `i * base_delay` after the run begins, and at
/// most `concurrency` entities are in flight at once. Every started fetch is awaited.
/// An entity whose basic info cannot be fetched still gets an entry, with every field
/// `null` and marked [`EntityUnavailable`](super::ErrorKind::EntityUnavailable).
pub struct SnapshotScheduler<T> {
    fetcher: ResourceFetcher<T>,
    base_delay: Duration,
    store: Arc<SnapshotStore>,
    progress: Arc<dyn Progress>,
    per_entity_dir: Option<PathBuf>,
    append_to: Option<PathBuf>,
}

impl<T> core::fmt::Debug for SnapshotScheduler<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnapshotScheduler")
            .field("base_delay", &self.base_delay)
            .field("per_entity_dir", &self.per_entity_dir)
            .field("append_to", &self.append_to)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SnapshotScheduler<T> {
    #[must_use]
    pub fn new(fetcher: ResourceFetcher<T>, base_delay: Duration, store: Arc<SnapshotStore>, progress: Arc<dyn Progress>) -> Self {
        Self {
            fetcher,
            base_delay,
            store,
            progress,
            per_entity_dir: None,
            append_to: None,
        }
    }

    /// Also write each entity to `<dir>/<owner>-<repo>.json` as soon as it finishes.
    #[must_use]
    pub fn with_per_entity_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.per_entity_dir = Some(dir.into());
        self
    }

    /// Merge each entity into the aggregate file at `path` as soon as it finishes.
    #[must_use]
    pub fn with_append_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.append_to = Some(path.into());
        self
    }

    #[must_use]
    pub const fn fetcher(&self) -> &ResourceFetcher<T> {
        &self.fetcher
    }

    /// Snapshot every entity in `entities`.
    ///
    /// Duplicate ids are dropped with a warning; the first occurrence keeps its position.
    pub async fn run(&self, entities: &[EntityId], field_set: &FieldSet, concurrency: usize) -> RunResult {
        let entities = dedup_entities(entities);
        let semaphore = Semaphore::new(concurrency.max(1));
        let tracker = RunTracker::new(&self.progress, entities.len() as u64);
        self.progress.set_phase("Fetching");

        log::info!(
            target: LOG_TARGET,
            "Snapshotting {} entities ({} fields each, concurrency {})",
            entities.len(),
            field_set.fields.len(),
            concurrency.max(1)
        );

        let tasks = entities.iter().enumerate().map(|(index, id)| {
            let semaphore = &semaphore;
            let tracker = &tracker;
            async move {
                let delay = self.base_delay.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
                tokio::time::sleep(delay).await;
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");

                let snapshot = self.fetch_one(id, field_set, delay).await;
                self.write_through(id, &snapshot, tracker).await;
                tracker.complete(snapshot.is_unavailable());

                (id.clone(), snapshot)
            }
        });

        let mut result = RunResult::new();
        for (id, snapshot) in join_all(tasks).await {
            result.insert(id, snapshot);
        }

        self.progress.done();
        result
    }

    async fn fetch_one(&self, id: &EntityId, field_set: &FieldSet, delay: Duration) -> EntitySnapshot {
        let stamp = Utc::now();
        let start = Instant::now();
        log::info!(target: LOG_TARGET, "Starting '{id}' after {}ms", delay.as_millis());

        let snapshot = match self.fetcher.fetch(id, field_set).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Entity '{id}' is unavailable: {e}");
                EntitySnapshot::unavailable(stamp, field_set)
            }
        };

        log::info!(
            target: LOG_TARGET,
            "Finished '{id}' in {}ms ({} field errors)",
            start.elapsed().as_millis(),
            snapshot.errors.len()
        );
        snapshot
    }

    /// Persist a finished entity to its streaming outputs. Failures are reported, not fatal.
    async fn write_through(&self, id: &EntityId, snapshot: &EntitySnapshot, tracker: &RunTracker) {
        if let Some(dir) = &self.per_entity_dir
            && let Err(e) = self.store.save_entity(dir, id, snapshot).await
        {
            log::warn!(target: LOG_TARGET, "Could not write snapshot of '{id}': {e}");
            tracker.println(&format!("warning: could not write snapshot of '{id}': {e}"));
        }

        if let Some(path) = &self.append_to
            && let Err(e) = self.store.append_one(path, id, snapshot).await
        {
            log::warn!(target: LOG_TARGET, "Could not merge '{id}' into '{}': {e}", path.display());
            tracker.println(&format!("warning: could not merge '{id}' into '{}': {e}", path.display()));
        }
    }
}

/// Drop repeated ids, keeping the first occurrence of each.
#[must_use]
pub fn dedup_entities(entities: &[EntityId]) -> Vec<EntityId> {
    let mut seen = HashSet::with_capacity(entities.len());
    entities
        .iter()
        .filter(|id| {
            let first = seen.insert(*id);
            if !first {
                log::warn!(target: LOG_TARGET, "Ignoring duplicate entity '{id}'");
            }
            first
        })
        .cloned()
        .collect()
}
