// src/error.rs
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a cluster backend before any workflow context is attached.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("object already exists: {0}")]
    Conflict(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation} failed for identity '{identity}': {source}")]
    Api {
        identity: String,
        operation: String,
        #[source]
        source: ApiError,
    },

    #[error("{operation} for identity '{identity}' conflicts with an existing object: {source}")]
    Conflict {
        identity: String,
        operation: String,
        #[source]
        source: ApiError,
    },

    #[error("certificate signing request '{csr}' for identity '{identity}' was denied: {reason}")]
    Approval {
        identity: String,
        csr: String,
        reason: String,
    },

    #[error("certificate signing request '{csr}' for identity '{identity}' was not resolved within {waited:?}")]
    Timeout {
        identity: String,
        csr: String,
        waited: Duration,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("certificate for identity '{identity}' failed verification at {}: {message}", path.display())]
    Consistency {
        identity: String,
        path: PathBuf,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl ProvisioningError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Attaches identity and operation context to a backend failure.
    pub fn api(identity: &str, operation: impl Into<String>, source: ApiError) -> Self {
        let identity = identity.to_string();
        let operation = operation.into();
        match source {
            ApiError::Conflict(_) => Self::Conflict {
                identity,
                operation,
                source,
            },
            source => Self::Api {
                identity,
                operation,
                source,
            },
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound { path: path.into() };
        }
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ProvisioningError> for io::Error {
    fn from(error: ProvisioningError) -> Self {
        let kind = match &error {
            ProvisioningError::InvalidInput(_) => io::ErrorKind::InvalidInput,
            ProvisioningError::NotFound { .. } => io::ErrorKind::NotFound,
            ProvisioningError::Conflict { .. } => io::ErrorKind::AlreadyExists,
            ProvisioningError::Timeout { .. } => io::ErrorKind::TimedOut,
            ProvisioningError::Approval { .. } => io::ErrorKind::PermissionDenied,
            ProvisioningError::Io { source, .. } => source.kind(),
            ProvisioningError::Serialization(_)
            | ProvisioningError::Consistency { .. }
            | ProvisioningError::Crypto(_) => io::ErrorKind::InvalidData,
            ProvisioningError::Api { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, error.to_string())
    }
}
