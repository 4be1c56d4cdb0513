//! Pagination metadata for task lists

use serde::{Deserialize, Serialize};

use super::model::Task;

/// Pagination block attached to list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(alias = "hasNext")]
    pub has_next: bool,
    #[serde(alias = "hasPrevious")]
    pub has_previous: bool,
    #[serde(alias = "currentPage")]
    pub current_page: u32,
    #[serde(alias = "totalPages")]
    pub total_pages: u32,
    #[serde(alias = "totalItems")]
    pub total_items: u64,
    #[serde(alias = "pageSize")]
    pub page_size: u32,
}

impl Pagination {
    /// Compute the metadata for `page` (1-based) over `total_items` items
    pub fn for_page(page: u32, page_size: u32, total_items: u64) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_items.div_ceil(u64::from(page_size)) as u32;
        let current_page = page.max(1);
        Self {
            has_next: current_page < total_pages,
            has_previous: current_page > 1,
            current_page,
            total_pages,
            total_items,
            page_size,
        }
    }
}

/// One page of tasks as delivered by `GET /tasks`
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub pagination: Pagination,
}
