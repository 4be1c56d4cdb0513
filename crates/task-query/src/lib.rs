//! Client-side query cache for the task dashboard API.
//!
//! [`TaskQueryCache`] is the entry point. It fetches through a
//! [`FetchExecutor`], keeps results in a [`CacheStore`] and applies task
//! mutations optimistically, reverting them when the server rejects them.

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod key;
pub mod merge;
pub mod optimistic;
pub mod store;
pub mod tags;

#[cfg(test)]
mod testing;

pub use cache::{QueryResult, TaskQueryCache};
pub use config::{CacheConfig, ConfigError};
pub use error::{FetchError, QueryError, Result};
pub use executor::{ApiRequest, FetchExecutor, HttpExecutor, Method};
pub use key::{CacheKey, Endpoint};
pub use merge::TaskList;
pub use optimistic::{Mutation, MutationGuard, MutationPhase, Undo};
pub use store::{
    CacheEntry, CacheEvent, CacheEventKind, CacheStore, CachedData, FetchStatus, InFlight, Subscription,
};
pub use tags::{Tag, TagSet};
