//! Relationship errors and their retry classes

use crate::graph::UserId;
use crate::id::IdError;
use crate::persistence::StoreError;
use std::fmt;
use thiserror::Error;

/// Broad class of a [`RelationshipError`], used by callers to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A referenced user or row does not exist
    NotFound,
    /// The request contradicts the current relationship state
    Conflict,
    /// The operation could not be carried out safely; fatal for this call
    Integrity,
    /// Retry the whole operation
    Transient,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::NotFound => "not_found",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Integrity => "integrity",
            ErrorClass::Transient => "transient",
        };
        f.write_str(name)
    }
}

/// Relationship operation errors
#[derive(Error, Debug)]
pub enum RelationshipError {
    #[error("Peer {0} not found")]
    PeerNotFound(UserId),

    #[error("No pending request from {0}")]
    RequestNotFound(UserId),

    #[error("No edge between {owner} and {peer}")]
    NoEdge { owner: UserId, peer: UserId },

    #[error("Already friends with {0}")]
    AlreadyFriends(UserId),

    /// The peer has the caller on their blacklist
    #[error("Blocked by {0}")]
    Blocked(UserId),

    #[error("Edge already in the requested state")]
    NoChange,

    #[error("{0} cannot hold a relationship with themselves")]
    SelfRelation(UserId),

    #[error("Id generation failed: {0}")]
    Id(#[from] IdError),

    /// Commit rejected by the store
    #[error("Transaction failed: {0}")]
    TransactionFailure(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Operation timed out")]
    TimedOut,
}

impl RelationshipError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RelationshipError::PeerNotFound(_)
            | RelationshipError::RequestNotFound(_)
            | RelationshipError::NoEdge { .. } => ErrorClass::NotFound,

            RelationshipError::AlreadyFriends(_)
            | RelationshipError::Blocked(_)
            | RelationshipError::NoChange
            | RelationshipError::SelfRelation(_) => ErrorClass::Conflict,

            RelationshipError::Id(_)
            | RelationshipError::TransactionFailure(_)
            | RelationshipError::Storage(_) => ErrorClass::Integrity,

            RelationshipError::Transient(_) | RelationshipError::TimedOut => ErrorClass::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<StoreError> for RelationshipError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => RelationshipError::Transient(msg),
            StoreError::Conflict(msg) => RelationshipError::TransactionFailure(msg),
            other => RelationshipError::Storage(other),
        }
    }
}

pub type RelationshipResult<T> = Result<T, RelationshipError>;
