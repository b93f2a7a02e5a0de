//! Storage error types for the AuthDB storage abstraction layer.
//!
//! This module defines all error types that can occur during storage
//! operations.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("Record not found: {kind}/{id}")]
    NotFound {
        /// The kind of record that was not found (e.g. "account",
        /// "sessionToken").
        kind: String,
        /// The identifier that was looked up, rendered as hex.
        id: String,
    },

    /// A uniqueness or single-active-token invariant was violated.
    #[error("Duplicate record: {kind}/{id}")]
    Duplicate {
        /// The kind of record that already exists.
        kind: String,
        /// The conflicting identifier or index key.
        id: String,
    },

    /// The supplied credential does not match the stored one.
    ///
    /// Deliberately carries no detail: an absent account and a wrong hash
    /// are indistinguishable to callers.
    #[error("Incorrect password")]
    IncorrectPassword,

    /// A cross-collection inconsistency was discovered. Unrecoverable:
    /// callers must abort rather than retry.
    #[error("Integrity violation: {message}")]
    Integrity {
        /// Description of the inconsistency.
        message: String,
    },

    /// A transaction could not be applied or rolled back.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of the transaction error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Creates a new `Duplicate` error.
    #[must_use]
    pub fn duplicate(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Creates a new `IncorrectPassword` error.
    #[must_use]
    pub fn incorrect_password() -> Self {
        Self::IncorrectPassword
    }

    /// Creates a new `Integrity` error.
    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Creates a new `Transaction` error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a duplicate error.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Returns `true` if this is an incorrect password error.
    #[must_use]
    pub fn is_incorrect_password(&self) -> bool {
        matches!(self, Self::IncorrectPassword)
    }

    /// Returns `true` if this error is unrecoverable and should abort the
    /// caller rather than be handled.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Duplicate { .. } => ErrorCategory::Conflict,
            Self::IncorrectPassword => ErrorCategory::Auth,
            Self::Integrity { .. } => ErrorCategory::Integrity,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Uniqueness conflict.
    Conflict,
    /// Credential mismatch.
    Auth,
    /// Cross-collection inconsistency.
    Integrity,
    /// Transaction-related error.
    Transaction,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Auth => write!(f, "auth"),
            Self::Integrity => write!(f, "integrity"),
            Self::Transaction => write!(f, "transaction"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
