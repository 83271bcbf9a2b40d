//! # Error Types
//!
//! Structured error types for pricelist_core. Every failure the session can
//! hit maps onto one of a few kinds: bad user input, a failed remote call, a
//! broken remote watch, a malformed import file, or a local storage problem.
//! None of them are fatal; the front-end shows them as status messages.
//!
//! ## Example
//!
//! ```rust
//! use pricelist_core::errors::{PriceError, PriceResult};
//!
//! fn validate_unit(unit: &str) -> PriceResult<()> {
//!     if unit.trim().is_empty() {
//!         return Err(PriceError::validation("unit", unit, "Unit is required"));
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pricelist_core operations
pub type PriceResult<T> = Result<T, PriceError>;

/// Broad error category, used by the command layer to decide what happens
/// after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Rejected before any network call
    Validation,
    /// A create/update/delete call against the remote store failed
    RemoteOperation,
    /// The remote watch failed; the session falls back to local storage
    Subscription,
    /// An import document is malformed
    Format,
    /// Local fallback storage failed
    Storage,
}

/// Structured error type for price list operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum PriceError {
    /// A user-supplied value is invalid
    #[error("Invalid input for '{field}': {value} - {reason}")]
    Validation {
        field: String,
        value: String,
        reason: String,
    },

    /// No material with this id exists in the collection
    #[error("Material not found: {id}")]
    MaterialNotFound { id: String },

    /// A remote create/update/delete call failed
    #[error("Remote {operation} failed: {reason}")]
    Remote { operation: String, reason: String },

    /// The remote watch could not be established or broke
    #[error("Remote subscription failed: {reason}")]
    Subscription { reason: String },

    /// Import document has the wrong shape
    #[error("Invalid import format: {reason}")]
    Format { reason: String },

    /// Local storage read/write error
    #[error("Storage error: {operation} on '{key}' - {reason}")]
    Storage {
        operation: String,
        key: String,
        reason: String,
    },

    /// Local storage is locked by another process
    #[error("Storage locked: '{path}' is held by pid {pid} since {locked_at}")]
    StorageLocked {
        path: String,
        pid: u32,
        locked_at: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// Stored or imported data was written by an incompatible version
    #[error("Version mismatch: data version {found}, expected {expected}")]
    VersionMismatch { found: String, expected: String },
}

impl PriceError {
    /// Create a Validation error
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PriceError::Validation {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a MaterialNotFound error
    pub fn not_found(id: impl Into<String>) -> Self {
        PriceError::MaterialNotFound { id: id.into() }
    }

    /// Create a Remote error
    pub fn remote(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PriceError::Remote {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a Subscription error
    pub fn subscription(reason: impl Into<String>) -> Self {
        PriceError::Subscription { reason: reason.into() }
    }

    /// Create a Format error
    pub fn format(reason: impl Into<String>) -> Self {
        PriceError::Format { reason: reason.into() }
    }

    /// Create a Storage error
    pub fn storage(
        operation: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PriceError::Storage {
            operation: operation.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a Serialization error from any displayable cause
    pub fn serialization(reason: impl std::fmt::Display) -> Self {
        PriceError::Serialization {
            reason: reason.to_string(),
        }
    }

    /// Which of the error categories this belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            PriceError::Validation { .. } | PriceError::MaterialNotFound { .. } => {
                ErrorKind::Validation
            }
            PriceError::Remote { .. } => ErrorKind::RemoteOperation,
            PriceError::Subscription { .. } => ErrorKind::Subscription,
            PriceError::Format { .. } | PriceError::VersionMismatch { .. } => ErrorKind::Format,
            PriceError::Storage { .. }
            | PriceError::StorageLocked { .. }
            | PriceError::Serialization { .. } => ErrorKind::Storage,
        }
    }

    /// Check if this is a recoverable error (retrying may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PriceError::Remote { .. } | PriceError::StorageLocked { .. })
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PriceError::Validation { .. } => "VALIDATION",
            PriceError::MaterialNotFound { .. } => "MATERIAL_NOT_FOUND",
            PriceError::Remote { .. } => "REMOTE_OPERATION",
            PriceError::Subscription { .. } => "SUBSCRIPTION",
            PriceError::Format { .. } => "FORMAT",
            PriceError::Storage { .. } => "STORAGE",
            PriceError::StorageLocked { .. } => "STORAGE_LOCKED",
            PriceError::Serialization { .. } => "SERIALIZATION",
            PriceError::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }
}

impl From<serde_json::Error> for PriceError {
    fn from(e: serde_json::Error) -> Self {
        PriceError::serialization(e)
    }
}
