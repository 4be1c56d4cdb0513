//! Task query cache
//!
//! The operation surface consumed by the dashboard: paginated task listing
//! with infinite scroll, task detail, statistics, and the task mutations.
//! It composes the store, the fetch executor and the optimistic engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use td_core::envelope::{ApiEnvelope, ErrorBody};
use td_core::statistics::TaskStatistics;
use td_core::task::{BulkAction, Pagination, Task, TaskDraft, TaskId, TaskPage, TaskPatch};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{QueryError, Result};
use crate::executor::{ApiRequest, FetchExecutor, HttpExecutor};
use crate::key::CacheKey;
use crate::optimistic::{Mutation, MutationGuard};
use crate::store::{CacheEntry, CacheStore, CachedData, FetchStatus, Fetched, Subscription};
use crate::tags::TagSet;

/// What a consumer sees of one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub status: FetchStatus,
    pub data: Option<T>,
    pub error: Option<QueryError>,
    /// Accumulated pagination, list queries only
    pub pagination: Option<Pagination>,
    pub is_stale: bool,
    pub is_fetching: bool,
}

impl<T> QueryResult<T> {
    fn uninitialized() -> Self {
        Self {
            status: FetchStatus::Uninitialized,
            data: None,
            error: None,
            pagination: None,
            is_stale: false,
            is_fetching: false,
        }
    }

    fn from_entry(entry: &CacheEntry, project: impl FnOnce(&CachedData) -> Option<T>) -> Self {
        Self {
            status: entry.status,
            data: entry.data.as_ref().and_then(project),
            error: entry.error.clone(),
            pagination: entry.task_list().and_then(|l| l.pagination),
            is_stale: entry.stale,
            is_fetching: entry.is_fetching(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Succeeded
    }

    pub fn has_next(&self) -> bool {
        self.pagination.is_some_and(|p| p.has_next)
    }
}

struct CacheInner {
    store: CacheStore,
    executor: Arc<dyn FetchExecutor>,
    config: CacheConfig,
    disposed: AtomicBool,
}

/// Client-side query/cache layer for the task API
#[derive(Clone)]
pub struct TaskQueryCache {
    inner: Arc<CacheInner>,
}

impl TaskQueryCache {
    /// Create an isolated cache instance over `executor`
    pub fn create(executor: Arc<dyn FetchExecutor>, config: CacheConfig) -> Self {
        info!("Creating task query cache for {}", config.base_url);
        Self {
            inner: Arc::new(CacheInner {
                store: CacheStore::new(config.retention),
                executor,
                config,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a cache talking HTTP to `config.base_url`
    pub fn connect(config: CacheConfig) -> Result<Self> {
        let executor = HttpExecutor::new(&config)?;
        Ok(Self::create(Arc::new(executor), config))
    }

    /// Drop all cached state. Every later operation fails with `Cancelled`.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.inner.store.clear();
            info!("Task query cache disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(QueryError::Cancelled);
        }
        Ok(())
    }

    pub fn subscribe(&self, key: CacheKey) -> Result<Subscription> {
        self.ensure_live()?;
        Ok(self.inner.store.subscribe(key))
    }

    pub fn subscribe_tasks(&self) -> Result<Subscription> {
        self.subscribe(CacheKey::TaskList)
    }

    pub fn subscribe_statistics(&self) -> Result<Subscription> {
        self.subscribe(CacheKey::Statistics)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current state of the accumulated task list, without fetching
    pub fn tasks_snapshot(&self) -> QueryResult<Vec<Task>> {
        match self.inner.store.get(&CacheKey::TaskList) {
            Some(entry) => QueryResult::from_entry(&entry, |data| match data {
                CachedData::TaskList(list) => Some(list.tasks.clone()),
                _ => None,
            }),
            None => QueryResult::uninitialized(),
        }
    }

    /// Fetch page `page` of the task list and merge it into the accumulated
    /// list. Served from cache when that page is the last one applied and
    /// nothing invalidated it since.
    pub async fn list_tasks(&self, page: u32, limit: u32) -> Result<QueryResult<Vec<Task>>> {
        self.ensure_live()?;
        if page == 0 || limit == 0 {
            return Err(QueryError::validation("page and limit start at 1"));
        }

        if let Some(entry) = self.inner.store.get(&CacheKey::TaskList) {
            let same_page = entry
                .task_list()
                .and_then(|l| l.pagination)
                .is_some_and(|p| p.current_page == page && p.page_size == limit);
            if entry.is_fresh() && same_page {
                debug!("Serving task list page {} from cache", page);
                return Ok(self.tasks_snapshot());
            }
        }

        self.fetch_list_page(page, limit).await?;
        Ok(self.tasks_snapshot())
    }

    /// Fetch the page after the last one applied, if there is one and no
    /// list request is in flight
    pub async fn load_more(&self) -> Result<QueryResult<Vec<Task>>> {
        self.ensure_live()?;
        let snapshot = self.tasks_snapshot();
        let Some(pagination) = snapshot.pagination else {
            return Ok(snapshot);
        };
        if !pagination.has_next || snapshot.is_fetching {
            debug!(
                "Not loading more (has_next={}, fetching={})",
                pagination.has_next, snapshot.is_fetching
            );
            return Ok(snapshot);
        }

        self.fetch_list_page(pagination.current_page + 1, pagination.page_size)
            .await?;
        Ok(self.tasks_snapshot())
    }

    /// Restart the list from page 1
    pub async fn refetch_tasks(&self) -> Result<QueryResult<Vec<Task>>> {
        self.ensure_live()?;
        self.fetch_list_page(1, self.list_page_size()).await?;
        Ok(self.tasks_snapshot())
    }

    pub async fn get_task(&self, id: TaskId) -> Result<QueryResult<Task>> {
        self.ensure_live()?;
        let key = CacheKey::task(id);
        let fresh = self.inner.store.get(&key).is_some_and(|e| e.is_fresh());
        if !fresh {
            self.fetch_task(id).await?;
        }
        Ok(self.snapshot(&key, |data| match data {
            CachedData::Task(task) => Some(task.clone()),
            _ => None,
        }))
    }

    pub async fn get_statistics(&self) -> Result<QueryResult<TaskStatistics>> {
        self.ensure_live()?;
        let fresh = self
            .inner
            .store
            .get(&CacheKey::Statistics)
            .is_some_and(|e| e.is_fresh());
        if !fresh {
            self.fetch_statistics().await?;
        }
        Ok(self.snapshot(&CacheKey::Statistics, |data| match data {
            CachedData::Statistics(stats) => Some(*stats),
            _ => None,
        }))
    }

    fn snapshot<T>(&self, key: &CacheKey, project: impl FnOnce(&CachedData) -> Option<T>) -> QueryResult<T> {
        match self.inner.store.get(key) {
            Some(entry) => QueryResult::from_entry(&entry, project),
            None => QueryResult::uninitialized(),
        }
    }

    fn list_page_size(&self) -> u32 {
        self.inner
            .store
            .get(&CacheKey::TaskList)
            .and_then(|e| e.task_list().and_then(|l| l.pagination))
            .map(|p| p.page_size)
            .unwrap_or(self.inner.config.default_page_size)
    }

    async fn fetch_list_page(&self, page: u32, limit: u32) -> Result<()> {
        let request = ApiRequest::get("/tasks")
            .with_query("page", page)
            .with_query("limit", limit);
        self.fetch(CacheKey::TaskList, format!("page={}&limit={}", page, limit), request, move |body| {
            let (tasks, pagination) = decode_data::<Vec<Task>>(body)?;
            // A response without pagination is a single, final page
            let pagination = pagination.unwrap_or(Pagination {
                has_next: false,
                has_previous: page > 1,
                current_page: page,
                total_pages: page,
                total_items: tasks.len() as u64,
                page_size: limit,
            });
            Ok(Fetched::Page(TaskPage { tasks, pagination }))
        })
        .await
    }

    async fn fetch_task(&self, id: TaskId) -> Result<()> {
        let key = CacheKey::task(id);
        let request = ApiRequest::get(format!("/tasks/{}", id));
        self.fetch(key, key.signature(), request, |body| {
            decode_data::<Task>(body).map(|(task, _)| Fetched::Task(task))
        })
        .await
    }

    async fn fetch_statistics(&self) -> Result<()> {
        let request = ApiRequest::get("/statistics");
        self.fetch(CacheKey::Statistics, String::new(), request, |body| {
            decode_data::<TaskStatistics>(body).map(|(stats, _)| Fetched::Statistics(stats))
        })
        .await
    }

    async fn fetch(
        &self,
        key: CacheKey,
        args: String,
        request: ApiRequest,
        decode: impl FnOnce(Value) -> Result<Fetched>,
    ) -> Result<()> {
        // Withdrawn on drop if this future is abandoned mid-request
        let pending = self.inner.store.track(key, args);
        let outcome = match self.inner.executor.execute(request).await {
            Ok(body) => decode(body),
            Err(e) => Err(QueryError::from(e)),
        };
        match outcome {
            Ok(fetched) => pending.commit(fetched),
            Err(e) => {
                let surfaced = pending.fail(e);
                if surfaced.is_user_visible() {
                    warn!("Fetching {} failed: {}", key, surfaced);
                }
                Err(surfaced)
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        self.mutate(Mutation::Create(draft))
            .await?
            .ok_or_else(|| QueryError::malformed("Create response is missing the task"))
    }

    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        self.mutate(Mutation::Update { id, patch })
            .await?
            .ok_or_else(|| QueryError::malformed("Update response is missing the task"))
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<()> {
        self.mutate(Mutation::Delete { id }).await.map(|_| ())
    }

    pub async fn bulk_action(&self, action: BulkAction, ids: Vec<TaskId>) -> Result<()> {
        self.mutate(Mutation::Bulk { action, ids }).await.map(|_| ())
    }

    async fn mutate(&self, mutation: Mutation) -> Result<Option<Task>> {
        self.ensure_live()?;
        mutation.validate()?;
        let request = mutation.request()?;

        let guard = MutationGuard::begin(&self.inner.store, &mutation, self.inner.config.eager_updates);
        let outcome = match self.inner.executor.execute(request).await {
            Ok(body) if mutation.returns_task() => decode_data::<Task>(body).map(|(task, _)| Some(task)),
            Ok(body) => decode_ack(body).map(|_| None),
            Err(e) => Err(QueryError::from(e)),
        };

        match outcome {
            Ok(task) => {
                guard.confirm();
                mutation.apply_success(&self.inner.store, task.as_ref());
                info!("Mutation {} confirmed", mutation.kind());
                self.invalidate(&mutation.invalidates()).await;
                Ok(task)
            }
            Err(err) => {
                guard.revert();
                warn!("Mutation {} failed: {}", mutation.kind(), err);
                Err(err)
            }
        }
    }

    /// Mark everything tagged with `tags` stale and refetch what is subscribed
    pub async fn invalidate(&self, tags: &TagSet) {
        if self.is_disposed() {
            return;
        }
        let keys = self.inner.store.invalidate(tags);
        let refetches = keys
            .into_iter()
            .map(|key| async move { (key, self.refetch(key).await) });

        for (key, result) in join_all(refetches).await {
            match result {
                Ok(()) => debug!("Refetched {}", key),
                Err(QueryError::Cancelled) => debug!("Refetch of {} superseded", key),
                // Already recorded on the entry
                Err(e) => warn!("Refetch of {} failed: {}", key, e),
            }
        }
    }

    async fn refetch(&self, key: CacheKey) -> Result<()> {
        match key {
            CacheKey::TaskList => self.fetch_list_page(1, self.list_page_size()).await,
            CacheKey::Task { id } => self.fetch_task(id).await,
            CacheKey::Statistics => self.fetch_statistics().await,
        }
    }

    /// Evict unsubscribed entries past their retention window
    pub fn prune(&self) -> usize {
        self.inner.store.prune()
    }
}

/// Unwrap the payload of a success envelope
fn decode_data<T: DeserializeOwned>(body: Value) -> Result<(T, Option<Pagination>)> {
    let envelope: ApiEnvelope<T> = serde_json::from_value(body)
        .map_err(|e| QueryError::malformed(format!("Unexpected response shape: {}", e)))?;
    if !envelope.success {
        return Err(envelope_error(envelope.error));
    }
    let data = envelope
        .data
        .ok_or_else(|| QueryError::malformed("Response is missing data"))?;
    Ok((data, envelope.pagination))
}

/// Check a payload-less acknowledgement
fn decode_ack(body: Value) -> Result<()> {
    if body.is_null() {
        return Ok(());
    }
    let envelope: ApiEnvelope<Value> = serde_json::from_value(body)
        .map_err(|e| QueryError::malformed(format!("Unexpected response shape: {}", e)))?;
    if !envelope.success {
        return Err(envelope_error(envelope.error));
    }
    Ok(())
}

fn envelope_error(error: Option<ErrorBody>) -> QueryError {
    match error {
        Some(error) => QueryError::from_code(error.code, None, error.message),
        None => QueryError::malformed("Request reported failure without details"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::error::FetchError;
    use crate::executor::Method;
    use crate::tags::Tag;
    use crate::testing::{ack_json, data_json, page_json, stats_json, task_json, ScriptedExecutor};

    fn setup() -> (TaskQueryCache, Arc<ScriptedExecutor>) {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = CacheConfig::new("http://localhost:8000/api/v1").unwrap();
        let cache = TaskQueryCache::create(executor.clone(), config);
        (cache, executor)
    }

    fn ids(cache: &TaskQueryCache) -> Vec<TaskId> {
        cache
            .tasks_snapshot()
            .data
            .unwrap_or_default()
            .iter()
            .map(|t| t.id)
            .collect()
    }

    async fn seed(cache: &TaskQueryCache, executor: &ScriptedExecutor, ids: &[TaskId]) {
        executor.reply_ok(Method::Get, "/tasks", page_json(ids, 1, 1, 10));
        cache.list_tasks(1, 10).await.unwrap();
    }

    #[tokio::test]
    async fn test_fresh_page_is_served_from_cache() {
        let (cache, executor) = setup();
        seed(&cache, &executor, &[1, 2]).await;

        let again = cache.list_tasks(1, 10).await.unwrap();
        assert!(again.is_success());
        assert_eq!(again.data.unwrap().len(), 2);
        assert_eq!(executor.call_count(Method::Get, "/tasks"), 1);
        assert_eq!(executor.calls()[0].to_string(), "GET /tasks?page=1&limit=10");
    }

    #[tokio::test]
    async fn test_page_and_limit_must_be_positive() {
        let (cache, executor) = setup();
        let err = cache.list_tasks(0, 10).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation { .. }));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_load_more_appends_until_last_page() {
        let (cache, executor) = setup();
        executor.reply_ok(Method::Get, "/tasks", page_json(&[1, 2], 1, 2, 2));
        executor.reply_ok(Method::Get, "/tasks", page_json(&[3, 4], 2, 2, 2));

        cache.list_tasks(1, 2).await.unwrap();
        let result = cache.load_more().await.unwrap();
        assert_eq!(ids(&cache), vec![1, 2, 3, 4]);
        assert!(!result.has_next());

        // Nothing left, no request
        cache.load_more().await.unwrap();
        assert_eq!(executor.call_count(Method::Get, "/tasks"), 2);
    }

    #[tokio::test]
    async fn test_delete_is_optimistic_and_restored_on_failure() {
        let (cache, executor) = setup();
        seed(&cache, &executor, &[1, 5, 9]).await;
        let before = cache.tasks_snapshot().data.unwrap();

        let gate = executor.gate(Method::Delete, "/tasks/5");
        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.delete_task(5).await }
        });
        executor.wait_for_calls(2).await;
        assert_eq!(ids(&cache), vec![1, 9]);

        gate.send(Err(FetchError::http(500, "boom"))).unwrap();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, QueryError::Server { status: Some(500), .. }));
        assert_eq!(cache.tasks_snapshot().data.unwrap(), before);
        assert_eq!(cache.store().pending_patches(), 0);
    }

    #[tokio::test]
    async fn test_failed_bulk_delete_restores_relative_order() {
        let (cache, executor) = setup();
        seed(&cache, &executor, &[1, 2, 3, 4]).await;
        let body = json!({
            "success": false,
            "error": { "code": "validation_error", "message": "Unknown task id" }
        });
        executor.reply(
            Method::Patch,
            "/tasks/bulk-delete",
            Err(FetchError::http(422, body.to_string())),
        );

        let err = cache.bulk_action(BulkAction::Delete, vec![2, 3]).await.unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert!(matches!(err, QueryError::Validation { .. }));
        assert_eq!(ids(&cache), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_create_prepends_server_task() {
        let (cache, executor) = setup();
        seed(&cache, &executor, &[1, 2]).await;
        executor.reply_ok(Method::Post, "/tasks", data_json(task_json(99, "A")));

        let task = cache.create_task(TaskDraft::new("A")).await.unwrap();
        assert_eq!(task.id, 99);
        assert_eq!(ids(&cache), vec![99, 1, 2]);

        let body = executor.calls()[1].body.clone().unwrap();
        assert_eq!(body["title"], "A");
    }

    #[tokio::test]
    async fn test_update_replaces_task_in_list() {
        let (cache, executor) = setup();
        seed(&cache, &executor, &[1, 2]).await;
        executor.reply_ok(Method::Put, "/tasks/2", data_json(task_json(2, "Renamed")));

        let task = cache
            .update_task(2, TaskPatch::default().with_title("Renamed"))
            .await
            .unwrap();
        assert_eq!(task.title, "Renamed");
        let tasks = cache.tasks_snapshot().data.unwrap();
        assert_eq!(tasks[1].title, "Renamed");
        assert_eq!(ids(&cache), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_invalid_mutation_is_rejected_before_sending() {
        let (cache, executor) = setup();
        seed(&cache, &executor, &[1]).await;

        let err = cache.update_task(1, TaskPatch::default()).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation { status: None, .. }));
        assert!(cache.bulk_action(BulkAction::Complete, vec![]).await.is_err());
        assert_eq!(executor.calls().len(), 1);
        assert_eq!(cache.store().pending_patches(), 0);
    }

    #[tokio::test]
    async fn test_mutation_refetches_subscribed_entries_and_resets_list() {
        let (cache, executor) = setup();
        let _stats = cache.subscribe_statistics().unwrap();
        executor.reply_ok(Method::Get, "/statistics", stats_json(4, 0));
        assert_eq!(cache.get_statistics().await.unwrap().data.unwrap().total_tasks, 4);

        executor.reply_ok(Method::Get, "/tasks", page_json(&[1, 2], 1, 2, 2));
        executor.reply_ok(Method::Get, "/tasks", page_json(&[3, 4], 2, 2, 2));
        cache.list_tasks(1, 2).await.unwrap();
        cache.load_more().await.unwrap();

        executor.reply_ok(Method::Delete, "/tasks/1", ack_json());
        executor.reply_ok(Method::Get, "/statistics", stats_json(3, 0));
        cache.delete_task(1).await.unwrap();

        assert_eq!(executor.call_count(Method::Get, "/statistics"), 2);
        let stats = cache.get_statistics().await.unwrap();
        assert_eq!(stats.data.unwrap().total_tasks, 3);
        assert!(!stats.is_stale);

        // The unsubscribed list is stale; asking for page 1 starts over
        assert!(cache.tasks_snapshot().is_stale);
        executor.reply_ok(Method::Get, "/tasks", page_json(&[2, 3], 1, 2, 2));
        let list = cache.list_tasks(1, 2).await.unwrap();
        assert_eq!(ids(&cache), vec![2, 3]);
        assert_eq!(list.pagination.unwrap().current_page, 1);
    }

    #[tokio::test]
    async fn test_subscribed_list_refetches_first_page_on_invalidation() {
        let (cache, executor) = setup();
        let mut tasks = cache.subscribe_tasks().unwrap();
        executor.reply_ok(Method::Get, "/tasks", page_json(&[1, 2], 1, 3, 2));
        executor.reply_ok(Method::Get, "/tasks", page_json(&[3, 4], 2, 3, 2));
        cache.list_tasks(1, 2).await.unwrap();
        cache.load_more().await.unwrap();

        executor.reply_ok(Method::Get, "/tasks", page_json(&[7, 1], 1, 3, 2));
        cache.invalidate(&TagSet::from([Tag::Tasks])).await;

        let last = executor.calls().last().unwrap().to_string();
        assert_eq!(last, "GET /tasks?page=1&limit=2");
        assert_eq!(ids(&cache), vec![7, 1]);
        assert_eq!(tasks.changed().await.unwrap(), crate::store::CacheEventKind::Updated);
    }

    #[tokio::test]
    async fn test_late_page_response_keeps_tasks_and_newer_pagination() {
        let (cache, executor) = setup();
        executor.reply_ok(Method::Get, "/tasks", page_json(&[1, 2], 1, 4, 2));
        cache.list_tasks(1, 2).await.unwrap();

        let page_two = executor.gate(Method::Get, "/tasks");
        let page_three = executor.gate(Method::Get, "/tasks");
        let more = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load_more().await }
        });
        executor.wait_for_calls(2).await;
        let jump = tokio::spawn({
            let cache = cache.clone();
            async move { cache.list_tasks(3, 2).await }
        });
        executor.wait_for_calls(3).await;

        page_three.send(Ok(page_json(&[5, 6], 3, 4, 2))).unwrap();
        jump.await.unwrap().unwrap();
        page_two.send(Ok(page_json(&[3, 4], 2, 4, 2))).unwrap();
        more.await.unwrap().unwrap();

        let snapshot = cache.tasks_snapshot();
        assert_eq!(snapshot.pagination.unwrap().current_page, 3);
        assert_eq!(snapshot.status, FetchStatus::Succeeded);
        assert_eq!(ids(&cache), vec![1, 2, 5, 6, 3, 4]);

        // Scrolling continues after the newest page, with no gap left behind
        executor.reply_ok(Method::Get, "/tasks", page_json(&[7, 8], 4, 4, 2));
        cache.load_more().await.unwrap();
        assert_eq!(ids(&cache), vec![1, 2, 5, 6, 3, 4, 7, 8]);
        assert_eq!(
            executor.calls().last().unwrap().to_string(),
            "GET /tasks?page=4&limit=2"
        );
    }

    #[tokio::test]
    async fn test_abandoned_load_more_does_not_block_the_next_one() {
        let (cache, executor) = setup();
        executor.reply_ok(Method::Get, "/tasks", page_json(&[1, 2], 1, 2, 2));
        cache.list_tasks(1, 2).await.unwrap();

        let held = executor.gate(Method::Get, "/tasks");
        let abandoned = tokio::time::timeout(Duration::from_millis(20), cache.load_more()).await;
        assert!(abandoned.is_err());

        let snapshot = cache.tasks_snapshot();
        assert!(!snapshot.is_fetching);
        assert_eq!(snapshot.status, FetchStatus::Succeeded);

        executor.reply_ok(Method::Get, "/tasks", page_json(&[3, 4], 2, 2, 2));
        cache.load_more().await.unwrap();
        assert_eq!(ids(&cache), vec![1, 2, 3, 4]);
        assert_eq!(executor.call_count(Method::Get, "/tasks"), 3);

        drop(held);
    }

    #[tokio::test]
    async fn test_missing_task_surfaces_not_found() {
        let (cache, executor) = setup();
        let body = json!({
            "success": false,
            "error": { "code": "not_found", "message": "Task 7 not found" }
        });
        executor.reply(Method::Get, "/tasks/7", Err(FetchError::http(404, body.to_string())));

        let err = cache.get_task(7).await.unwrap_err();
        assert_eq!(
            err,
            QueryError::NotFound {
                message: "Task 7 not found".into()
            }
        );
        let entry = cache.store().get(&CacheKey::task(7)).unwrap();
        assert_eq!(entry.status, FetchStatus::Failed);
    }

    #[tokio::test]
    async fn test_success_without_data_is_a_server_error() {
        let (cache, executor) = setup();
        executor.reply_ok(Method::Get, "/statistics", json!({ "success": true }));

        let err = cache.get_statistics().await.unwrap_err();
        assert!(matches!(err, QueryError::Server { status: None, .. }));
    }

    #[tokio::test]
    async fn test_list_without_pagination_is_a_single_page() {
        let (cache, executor) = setup();
        executor.reply_ok(
            Method::Get,
            "/tasks",
            data_json(json!([task_json(1, "One"), task_json(2, "Two")])),
        );

        let result = cache.list_tasks(1, 10).await.unwrap();
        let pagination = result.pagination.unwrap();
        assert!(!pagination.has_next);
        assert_eq!(pagination.total_items, 2);
    }

    #[tokio::test]
    async fn test_disposed_cache_cancels_everything() {
        let (cache, executor) = setup();
        seed(&cache, &executor, &[1]).await;
        cache.dispose();

        assert!(cache.is_disposed());
        assert!(cache.store().keys().is_empty());
        assert_eq!(cache.list_tasks(1, 10).await.unwrap_err(), QueryError::Cancelled);
        assert_eq!(
            cache.create_task(TaskDraft::new("late")).await.unwrap_err(),
            QueryError::Cancelled
        );
        assert!(cache.subscribe_tasks().is_err());
        assert_eq!(executor.calls().len(), 1);
    }
}
