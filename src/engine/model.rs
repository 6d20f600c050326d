use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Category of OS-managed state the engine can discover and destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ConfigEntries,
    Filesystem,
    Services,
    Drivers,
    Network,
    ScheduledTasks,
    StartupItems,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::ConfigEntries,
        ResourceKind::Filesystem,
        ResourceKind::Services,
        ResourceKind::Drivers,
        ResourceKind::Network,
        ResourceKind::ScheduledTasks,
        ResourceKind::StartupItems,
    ];

    /// Stable registry key
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ConfigEntries => "config-entries",
            ResourceKind::Filesystem => "filesystem",
            ResourceKind::Services => "services",
            ResourceKind::Drivers => "drivers",
            ResourceKind::Network => "network",
            ResourceKind::ScheduledTasks => "scheduled-tasks",
            ResourceKind::StartupItems => "startup-items",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown resource kind '{}'", s))
    }
}

/// A detail value attached to a scan result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Flag(bool),
    Int(i64),
    Text(String),
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Text(v.to_string())
    }
}
impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        DetailValue::Text(v)
    }
}
impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Flag(v)
    }
}
impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        DetailValue::Int(v)
    }
}

/// One discovered item. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub resource_kind: ResourceKind,

    /// Short identifying name (service name, file name, label)
    pub name: String,

    /// Opaque locator: path, key, or service name
    pub location: String,

    /// Free-text description, also matched by patterns
    #[serde(default)]
    pub description: String,

    /// Bytes reclaimed if this item is removed
    #[serde(default)]
    pub size_bytes: u64,

    #[serde(default)]
    pub details: BTreeMap<String, DetailValue>,

    pub discovered_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(kind: ResourceKind, name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            resource_kind: kind,
            name: name.into(),
            location: location.into(),
            description: String::new(),
            size_bytes: 0,
            details: BTreeMap::new(),
            discovered_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<DetailValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Location interpreted as a filesystem path
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.location)
    }

    pub fn detail_flag(&self, key: &str) -> bool {
        matches!(self.details.get(key), Some(DetailValue::Flag(true)))
    }

    pub fn detail_text(&self, key: &str) -> Option<&str> {
        match self.details.get(key) {
            Some(DetailValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn detail_int(&self, key: &str) -> Option<i64> {
        match self.details.get(key) {
            Some(DetailValue::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

/// What was done (or would be done) to one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanAction {
    Delete,
    Skip,
    Disable,
    Restore,
}

impl std::fmt::Display for CleanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanAction::Delete => write!(f, "delete"),
            CleanAction::Skip => write!(f, "skip"),
            CleanAction::Disable => write!(f, "disable"),
            CleanAction::Restore => write!(f, "restore"),
        }
    }
}

/// Outcome for exactly one attempted item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanResult {
    pub resource_kind: ResourceKind,
    pub action: CleanAction,
    pub target: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub bytes_freed: u64,
    /// Predictive result produced under dry-run
    #[serde(default)]
    pub simulated: bool,
    pub finished_at: DateTime<Utc>,
}

impl CleanResult {
    fn build(item: &ScanResult, action: CleanAction, success: bool, message: String) -> Self {
        Self {
            resource_kind: item.resource_kind,
            action,
            target: item.location.clone(),
            success,
            message,
            bytes_freed: 0,
            simulated: false,
            finished_at: Utc::now(),
        }
    }

    /// Item was destroyed; `bytes_freed` taken from the scan
    pub fn deleted(item: &ScanResult, message: impl Into<String>) -> Self {
        let mut result = Self::build(item, CleanAction::Delete, true, message.into());
        result.bytes_freed = item.size_bytes;
        result
    }

    /// Identity was already gone; nothing reclaimed
    pub fn already_removed(item: &ScanResult) -> Self {
        Self::build(item, CleanAction::Delete, true, "already removed".to_string())
    }

    /// Item was disabled rather than removed. Nothing is reclaimed.
    pub fn disabled(item: &ScanResult, message: impl Into<String>) -> Self {
        Self::build(item, CleanAction::Disable, true, message.into())
    }

    pub fn disable_failed(item: &ScanResult, message: impl Into<String>) -> Self {
        Self::build(item, CleanAction::Disable, false, message.into())
    }

    /// Destructive action failed for this item
    pub fn failed(item: &ScanResult, message: impl Into<String>) -> Self {
        Self::build(item, CleanAction::Delete, false, message.into())
    }

    /// Item was not touched
    pub fn skipped(item: &ScanResult, message: impl Into<String>) -> Self {
        Self::build(item, CleanAction::Skip, false, message.into())
    }

    /// Dry-run prediction for an item
    pub fn simulated(item: &ScanResult, message: impl Into<String>) -> Self {
        let mut result = Self::deleted(item, message);
        result.simulated = true;
        result
    }

    /// Dry-run prediction for a disable
    pub fn simulated_disable(item: &ScanResult, message: impl Into<String>) -> Self {
        let mut result = Self::disabled(item, message);
        result.simulated = true;
        result
    }

    /// Outcome of replaying one backup entry
    pub fn restored(item: &ScanResult, success: bool, message: impl Into<String>) -> Self {
        Self::build(item, CleanAction::Restore, success, message.into())
    }

    pub fn is_skip(&self) -> bool {
        self.action == CleanAction::Skip
    }
}

/// Run configuration snapshot, passed by value into every component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub dry_run: bool,
    pub force: bool,
    pub create_backup: bool,
    /// Disable items instead of deleting them where the driver supports it
    #[serde(default)]
    pub disable: bool,
    /// Where this run's backup session is written
    pub backup_directory: PathBuf,
    pub verbose: bool,
}

impl RunConfig {
    pub fn from_settings(settings: &crate::common::config::Settings) -> Self {
        Self {
            dry_run: false,
            force: false,
            create_backup: settings.create_backup,
            disable: false,
            backup_directory: settings.backup_dir.clone(),
            verbose: false,
        }
    }

    /// Backups are only taken for real, destructive runs
    pub fn backups_active(&self) -> bool {
        self.create_backup && !self.dry_run
    }
}
