//! Scope error types.

use std::error::Error as StdError;

use thiserror::Error;

/// Error returned by participants.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for scope operations.
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Errors that can occur while finalizing a scope or using the long transaction registry.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A participant failed to commit; later participants were not invoked.
    #[error("participant {position} failed to commit: {source}")]
    Commit {
        /// Registration index of the failing participant.
        position: usize,
        /// The participant's own error.
        #[source]
        source: BoxError,
    },

    /// One or more participants failed to roll back.
    #[error(transparent)]
    Rollback(#[from] RollbackErrors),

    /// No long transaction is registered under the key.
    #[error("long transaction not found: {key}")]
    NotFound { key: String },

    /// A long transaction is already registered under the key.
    #[error("long transaction already registered: {key}")]
    AlreadyExists { key: String },
}

impl ScopeError {
    /// Check if this error is a missing long transaction.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScopeError::NotFound { .. })
    }

    /// Registration index of the participant that failed to commit.
    pub fn failed_position(&self) -> Option<usize> {
        match self {
            ScopeError::Commit { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// A single participant rollback failure.
#[derive(Debug)]
pub struct RollbackFailure {
    /// Registration index of the participant.
    pub position: usize,
    /// The participant's own error.
    pub error: BoxError,
}

/// Every rollback failure of one rollback pass, in registration order.
#[derive(Debug, Error)]
#[error("{} participant(s) failed to roll back: {}", .failures.len(), failures_display(.failures))]
pub struct RollbackErrors {
    failures: Vec<RollbackFailure>,
}

fn failures_display(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.position, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RollbackErrors {
    pub(crate) fn new(failures: Vec<RollbackFailure>) -> Self {
        Self { failures }
    }

    /// Number of failed participants.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Check if no participant failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterate over the failures in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RollbackFailure> {
        self.failures.iter()
    }

    /// Consume the aggregate, returning the failures.
    pub fn into_failures(self) -> Vec<RollbackFailure> {
        self.failures
    }
}
