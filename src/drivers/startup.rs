use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{
    capture_file, is_absent, remove_path_verified, replace_file, restore_file, with_entry_details,
};
use crate::backup::{BackupEntry, PayloadSink};
use crate::common::errors::DriverError;
use crate::engine::control::ExecutionController;
use crate::engine::driver::{ResourceDriver, ScanFilter, ScanStream};
use crate::engine::model::{CleanResult, ResourceKind, ScanResult};

/// launchd agents and daemons defined by property lists in the
/// configured LaunchAgents/LaunchDaemons directories
#[derive(Debug, Clone)]
pub struct StartupItemDriver {
    dirs: Vec<PathBuf>,
}

impl StartupItemDriver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    fn list_plists(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|d| d.is_dir())
            .filter_map(|dir| match std::fs::read_dir(dir) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!(dir = %dir.display(), "cannot list startup items: {}", e);
                    None
                }
            })
            .flat_map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("plist"))
            .collect();
        files.sort();
        files
    }
}

fn is_disabled(dict: &plist::Dictionary) -> bool {
    dict.get("Disabled")
        .and_then(|v| v.as_boolean())
        .unwrap_or(false)
}

/// Whether the plist on disk currently carries `Disabled = true`
fn disabled_on_disk(path: &Path) -> bool {
    plist::Value::from_file(path)
        .ok()
        .and_then(|v| v.as_dictionary().map(is_disabled))
        .unwrap_or(false)
}

/// Build a scan result from a launchd plist. Unparseable files are still
/// reported, named after the file.
fn parse_launch_plist(path: &Path) -> ScanResult {
    let file_stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let size = std::fs::symlink_metadata(path).map(|m| m.len()).unwrap_or(0);
    let item = ScanResult::new(
        ResourceKind::StartupItems,
        file_stem.clone(),
        path.display().to_string(),
    )
    .with_size(size);
    let item = with_entry_details(item, path);

    let value = match plist::Value::from_file(path) {
        Ok(v) => v,
        Err(e) => {
            debug!(path = %path.display(), "unreadable plist: {}", e);
            return item.with_detail("parse_error", e.to_string());
        }
    };
    let Some(dict) = value.as_dictionary() else {
        return item;
    };

    let label = dict
        .get("Label")
        .and_then(|v| v.as_string())
        .unwrap_or(file_stem.as_str())
        .to_string();

    let program = dict
        .get("Program")
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
        .or_else(|| {
            dict.get("ProgramArguments")
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.as_string())
                .map(|s| s.to_string())
        });

    let run_at_load = dict
        .get("RunAtLoad")
        .and_then(|v| v.as_boolean())
        .unwrap_or(false);
    let disabled = is_disabled(dict);

    let mut item = ScanResult {
        name: label,
        ..item
    }
    .with_detail("run_at_load", run_at_load)
    .with_detail("disabled", disabled);
    if let Some(program) = program {
        item = item.with_description(program);
    }
    item
}

impl ResourceDriver for StartupItemDriver {
    fn name(&self) -> &str {
        ResourceKind::StartupItems.as_str()
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::StartupItems
    }

    fn scan<'a>(
        &'a self,
        filter: &'a ScanFilter,
        controller: &'a ExecutionController,
    ) -> Result<ScanStream<'a>, DriverError> {
        Ok(Box::new(
            self.list_plists()
                .into_iter()
                .take_while(move |_| controller.checkpoint())
                .map(|path| parse_launch_plist(&path))
                .filter(move |item| filter.matches_item(item)),
        ))
    }

    fn remove(&self, item: &ScanResult) -> CleanResult {
        remove_path_verified(item)
    }

    fn supports_disable(&self) -> bool {
        true
    }

    /// Set `Disabled = true` in the property list, leaving it in place
    fn disable(&self, item: &ScanResult) -> CleanResult {
        let path = item.path();
        if is_absent(&path) {
            return CleanResult::already_removed(item);
        }
        let mut value = match plist::Value::from_file(&path) {
            Ok(v) => v,
            Err(e) => return CleanResult::disable_failed(item, format!("unreadable plist: {}", e)),
        };
        let Some(dict) = value.as_dictionary_mut() else {
            return CleanResult::disable_failed(item, "not a launchd property list");
        };
        if is_disabled(dict) {
            return CleanResult::disabled(item, "already disabled");
        }
        dict.insert("Disabled".into(), plist::Value::Boolean(true));
        if let Err(e) = value.to_file_xml(&path) {
            return CleanResult::disable_failed(item, e.to_string());
        }

        if disabled_on_disk(&path) {
            CleanResult::disabled(item, "disabled")
        } else {
            CleanResult::disable_failed(item, "still enabled after disabling")
        }
    }

    fn capture(&self, item: &ScanResult, out: &mut dyn PayloadSink) -> Result<bool, DriverError> {
        capture_file(&item.path(), out)
    }

    fn supports_restore(&self) -> bool {
        true
    }

    /// Re-create a removed plist, or re-enable one that was disabled
    fn restore(&self, entry: &BackupEntry, payload: Option<&Path>) -> Result<(), DriverError> {
        let item = entry.to_scan_result();
        let path = item.path();
        if !is_absent(&path) && disabled_on_disk(&path) && !item.detail_flag("disabled") {
            return replace_file(&item, payload);
        }
        restore_file(&item, payload)
    }
}
