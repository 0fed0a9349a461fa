use std::time::Duration;
use thiserror::Error;

use super::collection::{CollectionId, Namespace};

/// Errors from DDL and writes against the in-memory engine
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("namespace {0} already exists")]
    NamespaceExists(Namespace),

    #[error("collection {0} not found")]
    CollectionNotFound(CollectionId),

    #[error("index {name} already exists on {namespace}")]
    IndexExists { namespace: Namespace, name: String },

    #[error("index {name} not found on {namespace}")]
    IndexNotFound { namespace: Namespace, name: String },

    #[error("document for clustered collection {0} has no _id")]
    MissingClusterKey(Namespace),

    #[error("duplicate clustering key in {0}")]
    DuplicateKey(Namespace),
}

/// Failures of a range deletion
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("timed out after {timeout:?} waiting for the lock on {namespace}")]
    LockTimeout {
        namespace: Namespace,
        timeout: Duration,
    },

    #[error("collection {0} not found")]
    CollectionNotFound(CollectionId),

    #[error("index {name} not found on {namespace}")]
    IndexNotFound { namespace: Namespace, name: String },

    #[error("collection {0} is not clustered")]
    NotClustered(Namespace),

    #[error("execution failed on {namespace}: {reason}")]
    Execution { namespace: Namespace, reason: String },
}

impl ExecutorError {
    /// The target disappeared underneath the deletion
    pub fn is_vanished(&self) -> bool {
        matches!(
            self,
            ExecutorError::CollectionNotFound(_) | ExecutorError::IndexNotFound { .. }
        )
    }
}
