use std::path::PathBuf;

use thiserror::Error;

use crate::engine::model::ResourceKind;

// Typed errors for the sweep engine. `anyhow` stays at the CLI boundary.

/// Errors raised at run level. Only these abort `Orchestrator::prepare`
/// or an in-progress run; everything item-scoped becomes a `CleanResult`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No driver is registered under this name
    #[error("unknown driver '{0}'")]
    UnknownDriver(String),

    /// Two drivers tried to register under the same key
    #[error("driver '{0}' is already registered")]
    DuplicateDriver(String),

    /// Run mode is malformed (empty app name, no drivers, ...)
    #[error("invalid run mode: {0}")]
    InvalidMode(String),

    /// A run was started twice on the same instance
    #[error("run already started (state: {0})")]
    AlreadyStarted(String),

    /// The backup store could not open or seal a session
    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Driver-level failures: the whole resource kind is unusable, or a
/// restore could not be replayed.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The information source for this kind is unavailable at all
    #[error("{driver}: source unavailable: {reason}")]
    Unavailable { driver: String, reason: String },

    /// The driver has no restoration path
    #[error("restore is not supported for {0}")]
    RestoreUnsupported(ResourceKind),

    /// The item could not be snapshotted before removal
    #[error("failed to capture '{target}': {reason}")]
    Capture { target: String, reason: String },

    /// A single restore attempt failed
    #[error("failed to restore '{target}': {reason}")]
    Restore { target: String, reason: String },

    /// Payload capture or replay failed at the I/O level
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the durable backup store.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup directory cannot be created or written
    #[error("backup directory '{}' is not writable: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read/write of a journal, manifest or payload failed
    #[error("backup I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest or journal (de)serialization failed
    #[error("backup serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// `record` was called after `seal`
    #[error("backup session '{0}' is sealed")]
    Sealed(String),

    /// The session is still open for writing in this process
    #[error("backup session '{0}' is still open")]
    InUse(String),

    /// No session with this id exists (or it was opened elsewhere)
    #[error("backup session '{0}' not found")]
    NotFound(String),

    /// Manifest or journal contents are unreadable
    #[error("backup session '{session}' is corrupt: {reason}")]
    Corrupt { session: String, reason: String },

    /// A payload file does not match its recorded checksum
    #[error("payload #{index} of session '{session}' does not match its checksum")]
    PayloadMismatch { session: String, index: usize },

    /// The driver could not produce the item's payload
    #[error(transparent)]
    Capture(DriverError),
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }
}

impl DriverError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn restore(target: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        DriverError::Restore {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn capture(target: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        DriverError::Capture {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unavailable(driver: &str, reason: impl std::fmt::Display) -> Self {
        DriverError::Unavailable {
            driver: driver.to_string(),
            reason: reason.to_string(),
        }
    }
}
