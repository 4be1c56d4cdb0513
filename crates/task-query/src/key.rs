//! Cache keys
//!
//! A key is the endpoint identity plus a stable signature of the arguments
//! that select the cached value. The task list deliberately has no argument
//! signature: every page lands on the same entry.

use std::fmt;

use serde::{Deserialize, Serialize};
use td_core::task::TaskId;

/// Query endpoints that are cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    ListTasks,
    GetTask,
    GetStatistics,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListTasks => "listTasks",
            Self::GetTask => "getTask",
            Self::GetStatistics => "getStatistics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum CacheKey {
    /// The accumulated, paginated task list
    TaskList,
    /// A single task detail
    Task { id: TaskId },
    Statistics,
}

impl CacheKey {
    pub fn task(id: TaskId) -> Self {
        Self::Task { id }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::TaskList => Endpoint::ListTasks,
            Self::Task { .. } => Endpoint::GetTask,
            Self::Statistics => Endpoint::GetStatistics,
        }
    }

    /// Stable argument signature; empty when the endpoint ignores its arguments
    pub fn signature(&self) -> String {
        match self {
            Self::TaskList | Self::Statistics => String::new(),
            Self::Task { id } => id.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint().as_str(), self.signature())
    }
}
