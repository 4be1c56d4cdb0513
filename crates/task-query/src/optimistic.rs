//! Optimistic mutation engine
//!
//! Each mutation variant decides its own local pre-patch, the undo record
//! for it, and what a confirmed response does to the cache:
//!
//! | Mutation | Pre-patch | On success |
//! |---|---|---|
//! | create | none | prepend returned task to the list |
//! | update | none, or eager edit when configured | replace task in place |
//! | delete | remove task | nothing |
//! | bulk delete | remove all ids | nothing |
//! | bulk complete | none | nothing, refetch via tags |
//!
//! Undo records are plain data so they can be inspected and replayed
//! without the mutation that produced them.

use serde::{Deserialize, Serialize};
use td_core::task::{BulkAction, Task, TaskDraft, TaskId, TaskPatch, TasksBulkRequest};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{QueryError, Result};
use crate::executor::{ApiRequest, Method};
use crate::key::CacheKey;
use crate::merge::TaskList;
use crate::store::{CacheStore, CachedData, PatchId};
use crate::tags::{invalidated_by, MutationKind, TagSet};

/// Inverse of an optimistic edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Undo {
    /// Put a removed task back at its original position
    Reinsert { task: Task, index: usize },
    /// Put back the pre-edit copy of a task
    Restore { previous: Task },
    /// Several undo steps, applied in order
    Batch { steps: Vec<Undo> },
    NoOp,
}

impl Undo {
    /// Reverse the edit on the cached value it was recorded against
    pub fn apply(self, data: &mut CachedData) {
        match data {
            CachedData::TaskList(list) => self.apply_to_list(list),
            CachedData::Task(current) => {
                if let Self::Restore { previous } = self {
                    if previous.id == current.id {
                        *current = previous;
                    }
                }
            }
            CachedData::Statistics(_) => {}
        }
    }

    pub fn apply_to_list(self, list: &mut TaskList) {
        match self {
            Self::Reinsert { task, index } => {
                let id = task.id;
                if !list.insert_at(index, task) {
                    debug!("Task {} already back in list, skipping reinsert", id);
                }
            }
            Self::Restore { previous } => {
                list.replace(previous);
            }
            // Steps were recorded in ascending index order, so replaying them
            // in order restores the original relative positions.
            Self::Batch { steps } => {
                for step in steps {
                    step.apply_to_list(list);
                }
            }
            Self::NoOp => {}
        }
    }
}

/// Undo record held while a mutation is in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPatch {
    pub target: CacheKey,
    pub undo: Undo,
    pub committed: bool,
}

/// A write operation against the task API
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(TaskDraft),
    Update { id: TaskId, patch: TaskPatch },
    Delete { id: TaskId },
    Bulk { action: BulkAction, ids: Vec<TaskId> },
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Create(_) => MutationKind::Create,
            Self::Update { .. } => MutationKind::Update,
            Self::Delete { .. } => MutationKind::Delete,
            Self::Bulk { action, .. } => MutationKind::Bulk(*action),
        }
    }

    /// Client-side checks done before anything is patched or sent
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Create(draft) => draft.validate()?,
            Self::Update { patch, .. } => {
                if patch.is_empty() {
                    return Err(QueryError::validation("Update contains no fields"));
                }
                patch.validate()?;
            }
            Self::Delete { .. } => {}
            Self::Bulk { ids, .. } => {
                if ids.is_empty() {
                    return Err(QueryError::validation("Bulk action needs at least one task"));
                }
            }
        }
        Ok(())
    }

    pub fn request(&self) -> Result<ApiRequest> {
        let request = match self {
            Self::Create(draft) => ApiRequest::new(Method::Post, "/tasks").with_body(to_body(draft)?),
            Self::Update { id, patch } => {
                ApiRequest::new(Method::Put, format!("/tasks/{}", id)).with_body(to_body(patch)?)
            }
            Self::Delete { id } => ApiRequest::new(Method::Delete, format!("/tasks/{}", id)),
            Self::Bulk { action, ids } => {
                ApiRequest::new(Method::Patch, format!("/tasks/{}", action.path_segment()))
                    .with_body(to_body(&TasksBulkRequest {
                        task_ids: ids.clone(),
                    })?)
            }
        };
        Ok(request)
    }

    /// Whether a confirmed response carries the resulting task
    pub fn returns_task(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Update { .. })
    }

    pub fn invalidates(&self) -> TagSet {
        invalidated_by(self.kind())
    }

    /// Edit the cached list ahead of the server and describe how to undo it
    pub fn pre_patch(&self, list: &mut TaskList, eager_updates: bool) -> Undo {
        match self {
            Self::Create(_) => Undo::NoOp,
            Self::Update { id, patch } => {
                if !eager_updates {
                    return Undo::NoOp;
                }
                let Some(current) = list.get(*id) else {
                    return Undo::NoOp;
                };
                let previous = current.clone();
                let mut edited = previous.clone();
                patch.apply_to(&mut edited);
                list.replace(edited);
                Undo::Restore { previous }
            }
            Self::Delete { id } => match list.remove(*id) {
                Some((index, task)) => Undo::Reinsert { task, index },
                None => Undo::NoOp,
            },
            Self::Bulk {
                action: BulkAction::Delete,
                ids,
            } => {
                let steps: Vec<Undo> = list
                    .remove_many(ids)
                    .into_iter()
                    .map(|(index, task)| Undo::Reinsert { task, index })
                    .collect();
                if steps.is_empty() {
                    Undo::NoOp
                } else {
                    Undo::Batch { steps }
                }
            }
            Self::Bulk {
                action: BulkAction::Complete,
                ..
            } => Undo::NoOp,
        }
    }

    /// Fold a confirmed response into the cache
    pub fn apply_success(&self, store: &CacheStore, task: Option<&Task>) {
        match (self, task) {
            (Self::Create(_), Some(task)) => {
                store.update(&CacheKey::TaskList, |data| {
                    if let CachedData::TaskList(list) = data {
                        list.prepend(task.clone());
                    }
                });
            }
            (Self::Update { id, .. }, Some(task)) => {
                store.update(&CacheKey::TaskList, |data| {
                    if let CachedData::TaskList(list) = data {
                        list.replace(task.clone());
                    }
                });
                store.update(&CacheKey::task(*id), |data| {
                    *data = CachedData::Task(task.clone());
                });
            }
            _ => {}
        }
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| QueryError::validation(e.to_string()))
}

/// Lifecycle of one mutation instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Issued,
    InFlight,
    Confirmed,
    Reverted,
}

/// Owns the optimistic patch of one in-flight mutation.
///
/// The patch is either confirmed or reverted exactly once; a guard dropped
/// while still in flight reverts it.
pub struct MutationGuard {
    id: Uuid,
    kind: MutationKind,
    store: CacheStore,
    patch: Option<PatchId>,
    phase: MutationPhase,
}

impl MutationGuard {
    /// Apply the pre-patch of `mutation` and move it in flight
    pub fn begin(store: &CacheStore, mutation: &Mutation, eager_updates: bool) -> Self {
        let id = Uuid::new_v4();
        debug!("Mutation {} ({}) issued", id, mutation.kind());

        let patch = store.apply_patch(CacheKey::TaskList, |data| match data {
            CachedData::TaskList(list) => mutation.pre_patch(list, eager_updates),
            _ => Undo::NoOp,
        });

        Self {
            id,
            kind: mutation.kind(),
            store: store.clone(),
            patch: Some(patch),
            phase: MutationPhase::InFlight,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn confirm(mut self) -> MutationPhase {
        if let Some(patch) = self.patch.take() {
            self.store.confirm_patch(patch);
        }
        self.phase = MutationPhase::Confirmed;
        debug!("Mutation {} ({}) confirmed", self.id, self.kind);
        self.phase
    }

    pub fn revert(mut self) -> MutationPhase {
        self.rollback();
        self.phase
    }

    fn rollback(&mut self) {
        if let Some(patch) = self.patch.take() {
            self.store.revert_patch(patch);
        }
        self.phase = MutationPhase::Reverted;
        debug!("Mutation {} ({}) reverted", self.id, self.kind);
    }
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        if self.patch.is_some() {
            warn!("Mutation {} ({}) dropped in flight, reverting", self.id, self.kind);
            self.rollback();
        }
    }
}
