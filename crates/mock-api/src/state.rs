//! Application state

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use td_core::statistics::TaskStatistics;
use td_core::task::{BulkAction, Pagination, Task, TaskDraft, TaskId, TaskPage, TaskPatch, TaskStatus};
use td_core::{Error, Result};

struct StoredTask {
    task: Task,
    is_deleted: bool,
}

#[derive(Default)]
struct TaskTable {
    tasks: BTreeMap<TaskId, StoredTask>,
    last_id: TaskId,
    modified: u64,
    deleted: u64,
}

impl TaskTable {
    fn live_mut(&mut self, id: TaskId) -> Result<&mut StoredTask> {
        match self.tasks.get_mut(&id) {
            Some(stored) if !stored.is_deleted => Ok(stored),
            _ => Err(Error::TaskNotFound(id)),
        }
    }

    fn ensure_live(&self, ids: &[TaskId]) -> Result<()> {
        for &id in ids {
            match self.tasks.get(&id) {
                Some(stored) if !stored.is_deleted => {}
                _ => return Err(Error::TaskNotFound(id)),
            }
        }
        Ok(())
    }

    fn soft_delete(&mut self, id: TaskId) -> Result<()> {
        let stored = self.live_mut(id)?;
        stored.is_deleted = true;
        stored.task.updated_at = Some(Utc::now());
        self.deleted += 1;
        Ok(())
    }
}

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<RwLock<TaskTable>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table with `count` pending tasks titled `Task N`
    pub async fn with_tasks(count: usize) -> Self {
        let state = Self::new();
        for n in 1..=count {
            // Seeded titles are never empty
            let _ = state.create(TaskDraft::new(format!("Task {}", n))).await;
        }
        state
    }

    /// Live tasks, newest first, cut into pages of `limit`
    pub async fn list(&self, page: u32, limit: u32) -> TaskPage {
        let table = self.inner.read().await;
        let live: Vec<&Task> = table
            .tasks
            .values()
            .rev()
            .filter(|stored| !stored.is_deleted)
            .map(|stored| &stored.task)
            .collect();

        let pagination = Pagination::for_page(page, limit, live.len() as u64);
        let skip = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let tasks = live
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect();
        TaskPage { tasks, pagination }
    }

    pub async fn get(&self, id: TaskId) -> Result<Task> {
        let table = self.inner.read().await;
        match table.tasks.get(&id) {
            Some(stored) if !stored.is_deleted => Ok(stored.task.clone()),
            _ => Err(Error::TaskNotFound(id)),
        }
    }

    pub async fn create(&self, draft: TaskDraft) -> Result<Task> {
        draft.validate()?;
        let mut table = self.inner.write().await;
        table.last_id += 1;
        let task = Task {
            id: table.last_id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            status: draft.status,
            created_at: Utc::now(),
            updated_at: None,
        };
        table.tasks.insert(
            task.id,
            StoredTask {
                task: task.clone(),
                is_deleted: false,
            },
        );
        tracing::info!("Created task {}", task.id);
        Ok(task)
    }

    /// Apply `patch`; `is_deleted: true` soft-deletes the task
    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(Error::InvalidInput("Update contains no fields".to_string()));
        }
        patch.validate()?;

        let mut table = self.inner.write().await;
        let stored = table.live_mut(id)?;
        patch.apply_to(&mut stored.task);
        let task = stored.task.clone();
        table.modified += 1;

        if patch.is_deleted == Some(true) {
            table.soft_delete(id)?;
        }
        Ok(task)
    }

    pub async fn delete(&self, id: TaskId) -> Result<()> {
        self.inner.write().await.soft_delete(id)?;
        tracing::info!("Deleted task {}", id);
        Ok(())
    }

    /// Apply `action` to every id. Nothing changes unless all ids exist.
    pub async fn bulk(&self, action: BulkAction, ids: &[TaskId]) -> Result<usize> {
        if ids.is_empty() {
            return Err(Error::InvalidInput("task_ids cannot be empty".to_string()));
        }

        let mut table = self.inner.write().await;
        table.ensure_live(ids)?;
        let mut affected = 0;
        for &id in ids {
            match action {
                BulkAction::Complete => {
                    let stored = table.live_mut(id)?;
                    if stored.task.status != TaskStatus::Completed {
                        stored.task.status = TaskStatus::Completed;
                        stored.task.updated_at = Some(Utc::now());
                        table.modified += 1;
                        affected += 1;
                    }
                }
                BulkAction::Delete => {
                    // Duplicate ids are already gone on their second visit
                    if table.soft_delete(id).is_ok() {
                        affected += 1;
                    }
                }
            }
        }
        tracing::info!("Bulk {} affected {} tasks", action.as_str(), affected);
        Ok(affected)
    }

    pub async fn statistics(&self) -> TaskStatistics {
        let table = self.inner.read().await;
        let live = table.tasks.values().filter(|stored| !stored.is_deleted);
        let (total, completed) = live.fold((0, 0), |(total, completed), stored| {
            (total + 1, completed + u64::from(stored.task.is_completed()))
        });
        TaskStatistics {
            total_tasks: total,
            modified_tasks: table.modified,
            deleted_tasks: table.deleted,
            completed_tasks: completed,
        }
    }
}
