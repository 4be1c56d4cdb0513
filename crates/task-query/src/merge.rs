//! Page merge strategy for the task list
//!
//! Successive pages accumulate into one list. Order is the order in which
//! ids first appeared and an id never appears twice. Pagination metadata
//! always reflects the last page that was merged.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use td_core::task::{Pagination, Task, TaskId, TaskPage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub pagination: Option<Pagination>,
}

impl TaskList {
    pub fn from_page(page: TaskPage) -> Self {
        let mut list = Self::default();
        list.merge_page(page);
        list
    }

    /// Append the tasks of `page` whose id is not present yet and take over
    /// its pagination. Returns how many tasks were appended.
    pub fn merge_page(&mut self, page: TaskPage) -> usize {
        let appended = self.merge_tasks(page.tasks);
        self.pagination = Some(page.pagination);
        appended
    }

    /// Append the tasks whose id is not present yet, leaving pagination alone
    pub fn merge_tasks(&mut self, tasks: Vec<Task>) -> usize {
        let mut seen: HashSet<TaskId> = self.tasks.iter().map(|t| t.id).collect();
        let before = self.tasks.len();
        for task in tasks {
            if seen.insert(task.id) {
                self.tasks.push(task);
            }
        }
        self.tasks.len() - before
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn has_next(&self) -> bool {
        self.pagination.is_some_and(|p| p.has_next)
    }

    pub fn current_page(&self) -> Option<u32> {
        self.pagination.map(|p| p.current_page)
    }

    /// Put a task at the head of the list, unless it is already there
    pub fn prepend(&mut self, task: Task) -> bool {
        if self.contains(task.id) {
            return false;
        }
        self.tasks.insert(0, task);
        true
    }

    /// Replace the task with the same id in place, returning the old value
    pub fn replace(&mut self, task: Task) -> Option<Task> {
        let slot = self.tasks.iter_mut().find(|t| t.id == task.id)?;
        Some(std::mem::replace(slot, task))
    }

    pub fn remove(&mut self, id: TaskId) -> Option<(usize, Task)> {
        let index = self.position(id)?;
        Some((index, self.tasks.remove(index)))
    }

    /// Remove every task in `ids`, returning `(original index, task)` pairs
    /// in ascending index order
    pub fn remove_many(&mut self, ids: &[TaskId]) -> Vec<(usize, Task)> {
        let wanted: HashSet<TaskId> = ids.iter().copied().collect();
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.tasks.len());
        for (index, task) in std::mem::take(&mut self.tasks).into_iter().enumerate() {
            if wanted.contains(&task.id) {
                removed.push((index, task));
            } else {
                kept.push(task);
            }
        }
        self.tasks = kept;
        removed
    }

    /// Insert at `index` (clamped to the end). Ignored if the id is present.
    pub fn insert_at(&mut self, index: usize, task: Task) -> bool {
        if self.contains(task.id) {
            return false;
        }
        let index = index.min(self.tasks.len());
        self.tasks.insert(index, task);
        true
    }
}
