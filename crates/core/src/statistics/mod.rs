//! Task statistics overview

use serde::{Deserialize, Serialize};

/// Aggregate counters served by `GET /statistics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    #[serde(alias = "totalTasks")]
    pub total_tasks: u64,
    #[serde(alias = "modifiedTasks")]
    pub modified_tasks: u64,
    #[serde(alias = "deletedTasks")]
    pub deleted_tasks: u64,
    #[serde(alias = "completedTasks")]
    pub completed_tasks: u64,
}

impl TaskStatistics {
    pub fn pending_tasks(&self) -> u64 {
        self.total_tasks.saturating_sub(self.completed_tasks)
    }

    /// Completed share in percent, 0 when there are no tasks
    pub fn completion_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.completed_tasks as f64 * 100.0 / self.total_tasks as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_figures() {
        let stats = TaskStatistics {
            total_tasks: 8,
            modified_tasks: 1,
            deleted_tasks: 0,
            completed_tasks: 2,
        };
        assert_eq!(stats.pending_tasks(), 6);
        assert!((stats.completion_rate() - 25.0).abs() < f64::EPSILON);
        assert_eq!(TaskStatistics::default().completion_rate(), 0.0);
    }
}
