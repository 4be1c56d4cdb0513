//! Core library for the task dashboard
//!
//! This crate contains the domain types shared by the query cache and the
//! REST service, including:
//! - Tasks, drafts, patches and bulk actions
//! - Page metadata for paginated task lists
//! - Task statistics
//! - The JSON response envelope used by every endpoint

pub mod envelope;
pub mod error;
pub mod statistics;
pub mod task;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
