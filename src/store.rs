//! Materialized feed state.
//!
//! The store publishes immutable [`FeedState`] snapshots on a watch channel.
//! All mutation goes through a [`StoreWriter`] tied to a generation; taking a
//! new writer or sealing the current one turns every older writer's calls
//! into no-ops, so late results from a stopped controller can never land.

use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

use crate::entry::HistoryEntry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState {
    /// Most recent first, unique by (transaction hash, log index).
    pub entries: Vec<HistoryEntry>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl FeedState {
    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }
}

/// Collapses entries sharing a key (the last one seen wins) and orders the
/// result most recent first.
pub fn dedup_and_sort(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    entries
        .into_iter()
        .map(|entry| (entry.key(), entry))
        .collect::<HashMap<_, _>>()
        .into_values()
        .sorted_by(|a, b| b.position.cmp(&a.position))
        .collect()
}

#[derive(Debug)]
struct StoreInner {
    generation: Mutex<u64>,
    state: watch::Sender<Arc<FeedState>>,
    retired: watch::Sender<bool>,
}

impl StoreInner {
    fn generation(&self) -> MutexGuard<'_, u64> {
        self.generation
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct MergeStore {
    inner: Arc<StoreInner>,
}

impl Default for MergeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(FeedState::default()));

        Self {
            inner: Arc::new(StoreInner {
                generation: Mutex::new(0),
                state,
                retired: watch::Sender::new(false),
            }),
        }
    }

    pub fn snapshot(&self) -> Arc<FeedState> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedState>> {
        self.inner.state.subscribe()
    }

    /// Marks the store as finished: no controller will write to it again.
    /// Writers are sealed and watchers following the store wind down.
    pub fn retire(&self) {
        *self.inner.generation() += 1;
        self.inner.retired.send_replace(true);
    }

    pub fn is_retired(&self) -> bool {
        *self.inner.retired.borrow()
    }

    pub fn retirement(&self) -> watch::Receiver<bool> {
        self.inner.retired.subscribe()
    }

    /// Hands out the only writer allowed to mutate the store from now on.
    pub fn writer(&self) -> StoreWriter {
        let mut generation = self.inner.generation();
        *generation += 1;

        StoreWriter {
            inner: self.inner.clone(),
            generation: *generation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreWriter {
    inner: Arc<StoreInner>,
    generation: u64,
}

impl StoreWriter {
    /// Applies `mutate` if this writer is still current. `mutate` reports
    /// whether it changed anything; subscribers are only woken when it did.
    fn update(&self, mutate: impl FnOnce(&mut FeedState) -> bool) -> bool {
        let generation = self.inner.generation();

        if *generation != self.generation {
            debug!(
                "Discarding write from stale store writer (generation {} < {})",
                self.generation, *generation
            );
            return false;
        }

        self.inner
            .state
            .send_if_modified(|state| mutate(Arc::make_mut(state)))
    }

    pub fn is_current(&self) -> bool {
        *self.inner.generation() == self.generation
    }

    /// Makes this writer (and every clone of it) permanently inert.
    pub fn seal(&self) {
        let mut generation = self.inner.generation();

        if *generation == self.generation {
            *generation += 1;
        }
    }

    /// Marks the start of a (re)synchronization. Existing entries stay visible
    /// until the backfill replaces them.
    pub fn begin_resync(&self) -> bool {
        self.update(|state| {
            let changed = !state.is_loading || state.error.is_some();
            state.is_loading = true;
            state.error = None;
            changed
        })
    }

    pub fn settle_idle(&self) -> bool {
        self.update(|state| {
            let changed = *state != FeedState::default();
            *state = FeedState::default();
            changed
        })
    }

    pub fn replace_all(&self, entries: Vec<HistoryEntry>) -> bool {
        self.update(|state| {
            state.entries = dedup_and_sort(entries);
            state.is_loading = false;
            true
        })
    }

    /// Adds entries whose key is not present yet. Existing entries are never
    /// modified and the loading flag is left alone.
    pub fn merge_incremental(&self, entries: Vec<HistoryEntry>) -> bool {
        self.update(|state| {
            let mut present = state
                .entries
                .iter()
                .map(HistoryEntry::key)
                .collect::<HashSet<_>>();

            let fresh = entries
                .into_iter()
                .filter(|entry| present.insert(entry.key()))
                .collect::<Vec<_>>();

            if fresh.is_empty() {
                return false;
            }

            state.entries.extend(fresh);
            state.entries.sort_by(|a, b| b.position.cmp(&a.position));
            true
        })
    }

    pub fn set_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|state| {
            let changed = state.error.as_deref() != Some(message.as_str());
            state.error = Some(message);
            changed
        })
    }

    pub fn clear_error(&self) -> bool {
        self.update(|state| state.error.take().is_some())
    }

    /// The backfill produced nothing usable: report the error, stop loading,
    /// keep whatever entries are already there.
    pub fn fail_backfill(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|state| {
            state.error = Some(message);
            state.is_loading = false;
            true
        })
    }
}
