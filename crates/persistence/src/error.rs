//! Error types for the persistence layer.
//!
//! Every failure surfaces as a [`StorageError`], organized by category:
//! resource state, concurrency, registry lookups, value mapping and the
//! backends themselves. Native backend errors are carried unmodified as the
//! `source` of [`BackendError::Internal`].

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Optimistic locking errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Adapter and type registry errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Record and value translation errors
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns `true` for the expected "no such resource" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::Resource(ResourceError::NotFound { .. })
        )
    }

    /// Shorthand for [`ResourceError::NotFound`].
    pub fn not_found(id: impl Into<String>) -> Self {
        StorageError::Resource(ResourceError::NotFound { id: id.into() })
    }
}

/// Errors related to resource state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested resource was not found.
    #[error("resource not found: {id}")]
    NotFound { id: String },

    /// A stored type tag has no registered resource definition.
    #[error("unknown resource type: {kind}")]
    UnknownResourceType { kind: String },

    /// The requested file was not found in any storage adapter.
    #[error("file not found: {id}")]
    FileNotFound { id: String },
}

/// Errors related to optimistic locking.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The caller saved a resource read before a newer save.
    #[error("stale lock token for {id}: expected {expected}, found {actual}")]
    StaleLockToken {
        id: String,
        expected: u64,
        actual: u64,
    },
}

/// Errors related to named registries.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No adapter is registered under the given name.
    #[error("no {registry} registered as '{name}'")]
    AdapterNotFound { registry: String, name: String },

    /// An adapter is already registered under the given name.
    #[error("{registry} '{name}' is already registered")]
    AlreadyRegistered { registry: String, name: String },

    /// The registry has been frozen and can no longer change.
    #[error("{registry} is frozen")]
    Frozen { registry: String },

    /// No storage adapter handles the given file identifier.
    #[error("no storage adapter handles '{id}'")]
    NoHandler { id: String },
}

/// Errors raised while translating between resources and backend records.
#[derive(Error, Debug)]
pub enum MappingError {
    /// A backend record is missing a required field or has the wrong shape.
    #[error("invalid record {id}: {message}")]
    InvalidRecord { id: String, message: String },

    /// An attribute that must hold identifiers holds something else.
    #[error("attribute '{attribute}' does not hold resource identifiers")]
    NotAReference { attribute: String },

    /// A value has no representation in the backend's record format.
    #[error("unsupported value: {message}")]
    UnsupportedValue { message: String },

    /// An attribute name is owned by the resource model.
    #[error("attribute name '{attribute}' is reserved")]
    ReservedAttribute { attribute: String },

    /// A page cursor could not be decoded.
    #[error("invalid pagination cursor: {cursor}")]
    InvalidCursor { cursor: String },
}

/// Errors originating from a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Schema initialization error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "io".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite pool".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "elasticsearch")]
impl From<elasticsearch::Error> for StorageError {
    fn from(err: elasticsearch::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "elasticsearch".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}
