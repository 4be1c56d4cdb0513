//! Task model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Server-assigned task identifier
pub type TaskId = i64;

/// Task status on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl TaskStatus {
    /// The opposite status, used by the completion toggle
    pub fn toggled(self) -> Self {
        match self {
            Self::Pending => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }
}

/// A task as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task with a known id, as the server would after insertion
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Body of `POST /tasks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Reject drafts the server would refuse
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("Title cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Partial update body of `PUT /tasks/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, alias = "isDeleted", skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

impl TaskPatch {
    /// Patch flipping the completion state of a task currently in `current`
    pub fn toggle_status(current: TaskStatus) -> Self {
        Self {
            status: Some(current.toggled()),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.is_deleted.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput("Title cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Apply the present fields to a local copy of the task.
    ///
    /// `is_deleted` has no local representation and is ignored here.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        task.updated_at = Some(Utc::now());
    }
}

/// Actions available on `PATCH /tasks/bulk-{action}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Complete,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Delete => "delete",
        }
    }

    /// Path segment of the bulk endpoint, relative to `/tasks`
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Complete => "bulk-complete",
            Self::Delete => "bulk-delete",
        }
    }
}

/// Body of the bulk endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksBulkRequest {
    #[serde(alias = "taskIds")]
    pub task_ids: Vec<TaskId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_task() {
        let task = Task::new(7, "Test task");
        assert_eq!(task.id, 7);
        assert_eq!(task.title, "Test task");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.description.is_none());
        assert!(task.updated_at.is_none());
    }

    #[test]
    fn test_task_accepts_camel_case_timestamps() {
        let json = r#"{"id":1,"title":"A","status":"completed","createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-02T00:00:00Z"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert!(task.is_completed());
        assert!(task.updated_at.is_some());
    }

    #[test]
    fn test_task_serializes_snake_case() {
        let task = Task::new(3, "A");
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("created_at").is_some());
        assert!(value.get("updated_at").is_none());
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn test_draft_validation() {
        assert!(TaskDraft::new("Write docs").validate().is_ok());
        assert!(TaskDraft::new("   ").validate().is_err());
    }

    #[test]
    fn test_patch_validation_and_apply() {
        assert!(TaskPatch::default().with_title("").validate().is_err());

        let mut task = Task::new(1, "Old");
        let patch = TaskPatch::default()
            .with_title("New")
            .with_status(TaskStatus::Completed);
        patch.validate().unwrap();
        patch.apply_to(&mut task);

        assert_eq!(task.title, "New");
        assert!(task.is_completed());
        assert!(task.updated_at.is_some());
    }

    #[test]
    fn test_status_defaults_to_pending() {
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
        let draft: TaskDraft = serde_json::from_str(r#"{"title":"A"}"#).unwrap();
        assert_eq!(draft.status, TaskStatus::Pending);
    }

    #[test]
    fn test_toggle_status_patch() {
        let patch = TaskPatch::toggle_status(TaskStatus::Pending);
        assert_eq!(patch.status, Some(TaskStatus::Completed));
        assert!(patch.title.is_none());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_bulk_request_wire_format() {
        let body = TasksBulkRequest { task_ids: vec![2, 3] };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["task_ids"], serde_json::json!([2, 3]));
        assert_eq!(BulkAction::Delete.path_segment(), "bulk-delete");
    }
}
