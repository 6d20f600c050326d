use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::model::{DetailValue, ResourceKind, ScanResult};

/// Manifest format version written into every session
pub const MANIFEST_VERSION: u32 = 1;

/// Enough of a scanned item to reconstruct it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemIdentity {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub details: BTreeMap<String, DetailValue>,
}

impl From<&ScanResult> for ItemIdentity {
    fn from(item: &ScanResult) -> Self {
        Self {
            name: item.name.clone(),
            location: item.location.clone(),
            description: item.description.clone(),
            size_bytes: item.size_bytes,
            details: item.details.clone(),
        }
    }
}

/// Where a captured payload lives inside the session directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadRef {
    /// Path relative to the session directory
    pub file: String,
    pub size: u64,
    /// Hex SHA-256 of the payload bytes
    pub sha256: String,
}

/// One write-ahead backup record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// 1-based position in the session
    pub index: usize,
    /// Registry key of the driver that owns the item
    pub driver: String,
    pub resource_kind: ResourceKind,
    pub identity: ItemIdentity,
    pub payload: Option<PayloadRef>,
    pub captured_at: DateTime<Utc>,
}

impl BackupEntry {
    /// Unindexed entry for an item, stamped now
    pub fn for_item(driver: &str, item: &ScanResult, payload: Option<PayloadRef>) -> Self {
        Self {
            index: 0,
            driver: driver.to_string(),
            resource_kind: item.resource_kind,
            identity: ItemIdentity::from(item),
            payload,
            captured_at: Utc::now(),
        }
    }

    /// Rebuild the scan result this entry was captured from
    pub fn to_scan_result(&self) -> ScanResult {
        let mut item = ScanResult::new(
            self.resource_kind,
            self.identity.name.clone(),
            self.identity.location.clone(),
        )
        .with_description(self.identity.description.clone())
        .with_size(self.identity.size_bytes);
        item.details = self.identity.details.clone();
        item
    }
}

/// A complete backup session: one per destructive run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSession {
    pub version: u32,
    pub session_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// False when the run crashed before sealing; entries then come
    /// from the write-ahead journal
    pub sealed: bool,
    pub sealed_at: Option<DateTime<Utc>>,
    pub entries: Vec<BackupEntry>,
}

impl BackupSession {
    pub fn new(session_id: &str, name: Option<&str>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            session_id: session_id.to_string(),
            name: name.map(str::to_string),
            created_at: Utc::now(),
            sealed: false,
            sealed_at: None,
            entries: Vec::new(),
        }
    }

    pub fn payload_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter_map(|e| e.payload.as_ref())
            .map(|p| p.size)
            .sum()
    }

    /// Distinct resource kinds present, in kind order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.entries.iter().map(|e| e.resource_kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            sealed: self.sealed,
            entry_count: self.entries.len(),
            payload_bytes: self.payload_bytes(),
            kinds: self.kinds(),
        }
    }
}

/// Summary info about a backup session (for listing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sealed: bool,
    pub entry_count: usize,
    pub payload_bytes: u64,
    pub kinds: Vec<ResourceKind>,
}
