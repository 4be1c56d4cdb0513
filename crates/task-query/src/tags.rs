//! Tag invalidation graph
//!
//! | Mutation | Tags invalidated |
//! |---|---|
//! | create / update / delete / bulk | `tasks` |
//!
//! Queries provide tags when their entry is created. Statistics provide both
//! `statistics` and `tasks`, so every task mutation also stales them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use td_core::task::BulkAction;

use crate::key::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Tasks,
    Statistics,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tasks => f.write_str("tasks"),
            Self::Statistics => f.write_str("statistics"),
        }
    }
}

pub type TagSet = BTreeSet<Tag>;

/// Mutation kinds, as far as invalidation is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Bulk(BulkAction),
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
            Self::Bulk(action) => write!(f, "bulk-{}", action.as_str()),
        }
    }
}

/// Tags attached to an entry of `endpoint`
pub fn provided_by(endpoint: Endpoint) -> TagSet {
    match endpoint {
        Endpoint::ListTasks | Endpoint::GetTask => TagSet::from([Tag::Tasks]),
        Endpoint::GetStatistics => TagSet::from([Tag::Statistics, Tag::Tasks]),
    }
}

/// Tags a confirmed mutation of `kind` invalidates
pub fn invalidated_by(kind: MutationKind) -> TagSet {
    match kind {
        MutationKind::Create
        | MutationKind::Update
        | MutationKind::Delete
        | MutationKind::Bulk(_) => TagSet::from([Tag::Tasks]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mutation_reaches_statistics() {
        let statistics = provided_by(Endpoint::GetStatistics);
        for kind in [
            MutationKind::Create,
            MutationKind::Update,
            MutationKind::Delete,
            MutationKind::Bulk(BulkAction::Complete),
            MutationKind::Bulk(BulkAction::Delete),
        ] {
            let invalidated = invalidated_by(kind);
            assert!(!invalidated.is_disjoint(&statistics), "{} misses statistics", kind);
            assert!(!invalidated.contains(&Tag::Statistics));
        }
    }

    #[test]
    fn test_list_does_not_provide_statistics() {
        assert!(!provided_by(Endpoint::ListTasks).contains(&Tag::Statistics));
    }
}
