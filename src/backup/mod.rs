//! Write-ahead backup sessions and their on-disk manifest format.

pub mod manifest;
pub mod store;

pub use manifest::{BackupEntry, BackupSession, ItemIdentity, PayloadRef, SessionSummary};
pub use store::{BackupStore, CaptureFn, DirectoryBackupStore, PayloadSink};
