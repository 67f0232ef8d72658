use thiserror::Error;

use crate::data::{EntityId, GroupId};

/// Misuse of the entity/group bookkeeping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("group {gid} does not exist")]
    UnknownGroup { gid: GroupId },
    #[error("entity {eid} is outside the population of {n} entities")]
    UnknownEntity { eid: EntityId, n: usize },
    #[error("entity {eid} is already assigned to group {gid}")]
    AlreadyAssigned { eid: EntityId, gid: GroupId },
    #[error("entity {eid} is not assigned to any group")]
    NotAssigned { eid: EntityId },
    #[error("group {gid} still holds {count} entities")]
    GroupNotEmpty { gid: GroupId, count: usize },
}

/// Problems raised by a feature model or its parameter maps.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("feature expects a {expected} value, got {found}")]
    ValueKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("parameter `{key}` is missing")]
    MissingParam { key: String },
    #[error("parameter `{key}` is not a {expected}")]
    ParamShape { key: String, expected: &'static str },
    #[error("parameter `{key}` has no component {index}")]
    ParamIndex { key: String, index: usize },
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("value outside the feature's support: {0}")]
    Support(String),
    #[error("feature {fi} does not exist ({nfeatures} features)")]
    UnknownFeature { fi: usize, nfeatures: usize },
}

/// Errors surfaced by mixture models and the kernels driving them.
///
/// All of these are contract violations: the operation that returned one
/// has stopped, and whatever it had already applied stays applied.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("expected {expected} empty groups, found {found}")]
    EmptyGroups { expected: usize, found: usize },
    #[error("entities are already assigned")]
    AlreadyAssigned,
    #[error("model must start without groups, found {ngroups}")]
    GroupsPresent { ngroups: usize },
    #[error("given {given} clusters but the model supports at most {capacity}")]
    TooManyClusters { given: usize, capacity: usize },
    #[error("row has {found} values but the model has {expected} features")]
    RowLength { expected: usize, found: usize },
    #[error("only {assigned} of {n} entities were assigned")]
    IncompleteAssignment { assigned: usize, n: usize },
    #[error("no data to bootstrap from")]
    EmptyData,
    #[error("invalid cluster concentration: {0}")]
    InvalidConcentration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
