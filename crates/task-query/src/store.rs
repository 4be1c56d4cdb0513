//! Cache store
//!
//! Keyed storage of query results with subscriber counting, tag-based
//! invalidation and the registry of pending optimistic patches. The store
//! does no network I/O; it only does bookkeeping and emits change events.
//!
//! All state sits behind one lock that is never held across an `.await`, so
//! every method runs as a single uninterrupted step.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use td_core::statistics::TaskStatistics;
use td_core::task::{Task, TaskPage};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{QueryError, Result};
use crate::key::CacheKey;
use crate::merge::TaskList;
use crate::optimistic::{PendingPatch, Undo};
use crate::tags::{provided_by, TagSet};

/// Monotonic id of an issued request; later requests have larger ids
pub type RequestId = u64;

/// Id of a pending optimistic patch
pub type PatchId = u64;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Uninitialized,
    Loading,
    FetchingMore,
    Succeeded,
    Failed,
}

/// Last known value of an entry
#[derive(Debug, Clone, PartialEq)]
pub enum CachedData {
    TaskList(TaskList),
    Task(Task),
    Statistics(TaskStatistics),
}

/// A decoded response waiting to be applied
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Page(TaskPage),
    Task(Task),
    Statistics(TaskStatistics),
}

impl Fetched {
    fn into_data(self) -> CachedData {
        match self {
            Self::Page(page) => CachedData::TaskList(TaskList::from_page(page)),
            Self::Task(task) => CachedData::Task(task),
            Self::Statistics(stats) => CachedData::Statistics(stats),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Option<CachedData>,
    pub status: FetchStatus,
    pub error: Option<QueryError>,
    pub tags: TagSet,
    pub subscribers: usize,
    /// Marked for refetch; `data` is still servable
    pub stale: bool,
    /// The next applied response replaces the value instead of merging
    reset_pending: bool,
    /// Bumped on every invalidation; responses issued before are dropped
    generation: u64,
    last_applied: Option<RequestId>,
    latest_by_args: HashMap<String, RequestId>,
    in_flight: BTreeSet<RequestId>,
    released_at: Option<Instant>,
}

impl CacheEntry {
    fn new(tags: TagSet) -> Self {
        Self {
            data: None,
            status: FetchStatus::Uninitialized,
            error: None,
            tags,
            subscribers: 0,
            stale: false,
            reset_pending: false,
            generation: 0,
            last_applied: None,
            latest_by_args: HashMap::new(),
            in_flight: BTreeSet::new(),
            released_at: Some(Instant::now()),
        }
    }

    pub fn is_fetching(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn is_fresh(&self) -> bool {
        self.status == FetchStatus::Succeeded && !self.stale && self.data.is_some()
    }

    pub fn task_list(&self) -> Option<&TaskList> {
        match &self.data {
            Some(CachedData::TaskList(list)) => Some(list),
            _ => None,
        }
    }

    pub fn task(&self) -> Option<&Task> {
        match &self.data {
            Some(CachedData::Task(task)) => Some(task),
            _ => None,
        }
    }

    pub fn statistics(&self) -> Option<&TaskStatistics> {
        match &self.data {
            Some(CachedData::Statistics(stats)) => Some(stats),
            _ => None,
        }
    }

    /// Reset since the request was issued, or repeated with the same arguments
    fn is_superseded(&self, ticket: &RequestTicket) -> bool {
        ticket.generation != self.generation
            || self
                .latest_by_args
                .get(&ticket.args)
                .is_some_and(|&latest| latest > ticket.id)
    }

    /// A response to a later request was already applied
    fn is_outdated(&self, ticket: &RequestTicket) -> bool {
        self.last_applied.is_some_and(|applied| applied > ticket.id)
    }

    /// Status once a request has left the in-flight set without being applied
    fn settle_status(&mut self) {
        if self.in_flight.is_empty()
            && matches!(self.status, FetchStatus::Loading | FetchStatus::FetchingMore)
        {
            self.status = if self.data.is_some() {
                FetchStatus::Succeeded
            } else {
                FetchStatus::Uninitialized
            };
        }
    }

    fn forget_request(&mut self, ticket: &RequestTicket) {
        self.in_flight.remove(&ticket.id);
        if self.latest_by_args.get(&ticket.args) == Some(&ticket.id) {
            self.latest_by_args.remove(&ticket.args);
        }
    }
}

/// Receipt for an issued request, needed to apply its response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub key: CacheKey,
    pub id: RequestId,
    pub args: String,
    generation: u64,
}

/// An issued request whose outcome has not been recorded yet.
///
/// Dropping it unresolved withdraws the request from its entry, so a caller
/// that stops waiting does not leave the entry fetching forever.
pub struct InFlight {
    store: CacheStore,
    ticket: RequestTicket,
    resolved: bool,
}

impl InFlight {
    pub fn ticket(&self) -> &RequestTicket {
        &self.ticket
    }

    pub fn commit(mut self, fetched: Fetched) -> Result<()> {
        self.resolved = true;
        self.store.commit(&self.ticket, fetched)
    }

    pub fn fail(mut self, error: QueryError) -> QueryError {
        self.resolved = true;
        self.store.fail(&self.ticket, error)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.resolved {
            self.store.abandon(&self.ticket);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    Updated,
    Invalidated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: CacheKey,
    pub kind: CacheEventKind,
}

struct StoreState {
    entries: BTreeMap<CacheKey, CacheEntry>,
    patches: HashMap<PatchId, PendingPatch>,
    next_request: RequestId,
    next_patch: PatchId,
}

impl StoreState {
    fn entry(&mut self, key: CacheKey) -> &mut CacheEntry {
        self.entries
            .entry(key)
            .or_insert_with(|| CacheEntry::new(provided_by(key.endpoint())))
    }
}

/// Shared handle to the cache store
#[derive(Clone)]
pub struct CacheStore {
    state: Arc<Mutex<StoreState>>,
    events: broadcast::Sender<CacheEvent>,
    retention: Duration,
}

impl CacheStore {
    pub fn new(retention: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(StoreState {
                entries: BTreeMap::new(),
                patches: HashMap::new(),
                next_request: 0,
                next_patch: 0,
            })),
            events,
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Snapshot of the entry under `key`
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.state.lock().entries.keys().copied().collect()
    }

    /// Store `data` as the fresh value of `key`
    pub fn set(&self, key: CacheKey, data: CachedData) {
        let notify = {
            let mut state = self.state.lock();
            let entry = state.entry(key);
            entry.data = Some(data);
            entry.status = FetchStatus::Succeeded;
            entry.error = None;
            entry.stale = false;
            entry.reset_pending = false;
            entry.subscribers > 0
        };
        if notify {
            self.emit(key, CacheEventKind::Updated);
        }
    }

    /// Modify the cached value in place. `None` if there is no value.
    pub fn update<R>(&self, key: &CacheKey, f: impl FnOnce(&mut CachedData) -> R) -> Option<R> {
        let (result, notify) = {
            let mut state = self.state.lock();
            let entry = state.entries.get_mut(key)?;
            let data = entry.data.as_mut()?;
            (f(data), entry.subscribers > 0)
        };
        if notify {
            self.emit(*key, CacheEventKind::Updated);
        }
        Some(result)
    }

    /// Register a live consumer of `key`
    pub fn subscribe(&self, key: CacheKey) -> Subscription {
        // Receiver first so no event between the two steps is missed
        let events = self.events.subscribe();
        {
            let mut state = self.state.lock();
            let entry = state.entry(key);
            entry.subscribers += 1;
            entry.released_at = None;
            debug!("Subscribed to {} ({} subscribers)", key, entry.subscribers);
        }
        Subscription {
            key,
            store: self.clone(),
            events,
        }
    }

    fn release(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers == 0 {
                entry.released_at = Some(Instant::now());
                debug!("Last subscriber of {} released", key);
            }
        }
    }

    /// Record an outgoing request for `key` with argument signature `args`
    pub fn begin_fetch(&self, key: CacheKey, args: impl Into<String>) -> RequestTicket {
        let args = args.into();
        let mut state = self.state.lock();
        state.next_request += 1;
        let id = state.next_request;

        let entry = state.entry(key);
        entry.latest_by_args.insert(args.clone(), id);
        entry.in_flight.insert(id);
        entry.status = if entry.data.is_some() {
            FetchStatus::FetchingMore
        } else {
            FetchStatus::Loading
        };

        debug!("Request {} issued for {} [{}]", id, key, args);
        RequestTicket {
            key,
            id,
            args,
            generation: entry.generation,
        }
    }

    /// Like [`begin_fetch`](Self::begin_fetch), withdrawn again if the
    /// returned handle is dropped before an outcome is recorded
    pub fn track(&self, key: CacheKey, args: impl Into<String>) -> InFlight {
        InFlight {
            store: self.clone(),
            ticket: self.begin_fetch(key, args),
            resolved: false,
        }
    }

    /// Forget a request whose response will never be applied
    pub fn abandon(&self, ticket: &RequestTicket) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(&ticket.key) {
            entry.forget_request(ticket);
            entry.settle_status();
            debug!("Request {} for {} abandoned", ticket.id, ticket.key);
        }
    }

    /// Apply a response.
    ///
    /// A response issued before the last reset, or repeated by a newer request
    /// with the same arguments, is dropped with `Cancelled`. A list page that
    /// arrives after a later page only adds its tasks.
    pub fn commit(&self, ticket: &RequestTicket, fetched: Fetched) -> Result<()> {
        let notify = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(&ticket.key) else {
                debug!("Dropping response {} for evicted {}", ticket.id, ticket.key);
                return Err(QueryError::Cancelled);
            };

            let superseded = entry.is_superseded(ticket);
            let outdated = entry.is_outdated(ticket);
            entry.forget_request(ticket);
            if superseded {
                entry.settle_status();
                debug!("Discarding superseded response {} for {}", ticket.id, ticket.key);
                return Err(QueryError::Cancelled);
            }

            if outdated {
                // An earlier page arriving late still contributes its tasks,
                // but the newer pagination stays
                let late_page = match (fetched, entry.data.as_mut()) {
                    (Fetched::Page(page), Some(CachedData::TaskList(list))) => Some(list.merge_tasks(page.tasks)),
                    _ => None,
                };
                let Some(appended) = late_page else {
                    entry.settle_status();
                    debug!("Discarding outdated response {} for {}", ticket.id, ticket.key);
                    return Err(QueryError::Cancelled);
                };
                debug!(
                    "Merged {} tasks from late response {} into {}",
                    appended, ticket.id, ticket.key
                );
                entry.settle_status();
                entry.subscribers > 0 && appended > 0
            } else {
                Self::apply(entry, ticket, fetched);
                entry.subscribers > 0
            }
        };
        if notify {
            self.emit(ticket.key, CacheEventKind::Updated);
        }
        Ok(())
    }

    fn apply(entry: &mut CacheEntry, ticket: &RequestTicket, fetched: Fetched) {
        let reset = entry.reset_pending;
        let replacement = match (entry.data.as_mut(), fetched) {
            (Some(CachedData::TaskList(list)), Fetched::Page(page)) if !reset => {
                let appended = list.merge_page(page);
                debug!("Merged {} new tasks into {}", appended, ticket.key);
                None
            }
            (_, other) => Some(other),
        };
        if let Some(other) = replacement {
            if reset {
                info!("Resetting {} with response {}", ticket.key, ticket.id);
            }
            entry.data = Some(other.into_data());
        }

        entry.last_applied = Some(ticket.id);
        entry.stale = false;
        entry.reset_pending = false;
        entry.error = None;
        entry.status = if entry.is_fetching() {
            FetchStatus::FetchingMore
        } else {
            FetchStatus::Succeeded
        };
    }

    /// Record a failed request and return the error to surface
    pub fn fail(&self, ticket: &RequestTicket, error: QueryError) -> QueryError {
        let notify = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(&ticket.key) else {
                return error;
            };
            let superseded = entry.is_superseded(ticket);
            entry.forget_request(ticket);
            if superseded {
                entry.settle_status();
                debug!("Ignoring failure of superseded request {}: {}", ticket.id, error);
                return QueryError::Cancelled;
            }
            entry.error = Some(error.clone());
            entry.status = if entry.is_fetching() {
                FetchStatus::FetchingMore
            } else {
                FetchStatus::Failed
            };
            entry.subscribers > 0
        };
        if notify {
            self.emit(ticket.key, CacheEventKind::Failed);
        }
        error
    }

    /// Mark every entry tagged with any of `tags` stale.
    ///
    /// Returns the keys that have subscribers and must be refetched now. The
    /// rest refetch on their next access.
    pub fn invalidate(&self, tags: &TagSet) -> Vec<CacheKey> {
        let mut refetch = Vec::new();
        let mut notified = Vec::new();
        {
            let mut state = self.state.lock();
            for (key, entry) in state.entries.iter_mut() {
                if entry.tags.is_disjoint(tags) {
                    continue;
                }
                entry.stale = true;
                entry.generation += 1;
                if matches!(key, CacheKey::TaskList) {
                    entry.reset_pending = true;
                }
                if entry.subscribers > 0 {
                    refetch.push(*key);
                    notified.push(*key);
                }
            }
        }
        info!(
            "Invalidated tags {:?}, {} subscribed entries to refetch",
            tags,
            refetch.len()
        );
        for key in notified {
            self.emit(key, CacheEventKind::Invalidated);
        }
        refetch
    }

    /// Apply an optimistic edit to `key` and record its undo.
    ///
    /// A patch is recorded even when there is nothing cached to edit, so that
    /// every in-flight mutation owns exactly one patch.
    pub fn apply_patch(&self, key: CacheKey, edit: impl FnOnce(&mut CachedData) -> Undo) -> PatchId {
        let (id, notify) = {
            let mut state = self.state.lock();
            let (undo, notify) = match state.entries.get_mut(&key) {
                Some(entry) => match entry.data.as_mut() {
                    Some(data) => (edit(data), entry.subscribers > 0),
                    None => (Undo::NoOp, false),
                },
                None => (Undo::NoOp, false),
            };
            state.next_patch += 1;
            let id = state.next_patch;
            state.patches.insert(
                id,
                PendingPatch {
                    target: key,
                    undo,
                    committed: false,
                },
            );
            (id, notify)
        };
        if notify {
            self.emit(key, CacheEventKind::Updated);
        }
        id
    }

    /// Discard the undo record of a confirmed patch
    pub fn confirm_patch(&self, id: PatchId) -> Option<PendingPatch> {
        let mut patch = self.state.lock().patches.remove(&id)?;
        patch.committed = true;
        debug!("Patch {} on {} confirmed", id, patch.target);
        Some(patch)
    }

    /// Undo a pending patch
    pub fn revert_patch(&self, id: PatchId) -> bool {
        let (target, notify) = {
            let mut state = self.state.lock();
            let Some(patch) = state.patches.remove(&id) else {
                return false;
            };
            let target = patch.target;
            let notify = match state.entries.get_mut(&target) {
                Some(entry) => match entry.data.as_mut() {
                    Some(data) => {
                        patch.undo.apply(data);
                        entry.subscribers > 0
                    }
                    None => false,
                },
                None => false,
            };
            (target, notify)
        };
        debug!("Patch {} on {} reverted", id, target);
        if notify {
            self.emit(target, CacheEventKind::Updated);
        }
        true
    }

    pub fn pending_patches(&self) -> usize {
        self.state.lock().patches.len()
    }

    /// Evict unsubscribed entries whose retention window has passed
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let patched: BTreeSet<CacheKey> = state.patches.values().map(|p| p.target).collect();
        let retention = self.retention;
        let before = state.entries.len();
        state.entries.retain(|key, entry| {
            let expired = entry.subscribers == 0
                && !entry.is_fetching()
                && !patched.contains(key)
                && entry
                    .released_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= retention);
            if expired {
                debug!("Evicting {}", key);
            }
            !expired
        });
        before - state.entries.len()
    }

    /// Drop every entry and pending patch
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.patches.clear();
    }

    fn emit(&self, key: CacheKey, kind: CacheEventKind) {
        // No receivers is fine
        let _ = self.events.send(CacheEvent { key, kind });
    }
}

/// A live consumer of one cache entry. Dropping it releases the entry.
pub struct Subscription {
    key: CacheKey,
    store: CacheStore,
    events: broadcast::Receiver<CacheEvent>,
}

impl Subscription {
    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub fn snapshot(&self) -> Option<CacheEntry> {
        self.store.get(&self.key)
    }

    /// Wait for the next change to this entry
    pub async fn changed(&mut self) -> Result<CacheEventKind> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.key == self.key => return Ok(event.kind),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return Ok(CacheEventKind::Updated),
                Err(broadcast::error::RecvError::Closed) => return Err(QueryError::Cancelled),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.release(&self.key);
    }
}
