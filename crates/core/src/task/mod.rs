//! Task module
//!
//! This module contains task-related types and logic.

mod model;
mod page;

pub use model::*;
pub use page::*;
