use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{capture_file, is_absent, remove_path_verified, restore_file, with_entry_details};
use crate::backup::{BackupEntry, PayloadSink};
use crate::common::errors::DriverError;
use crate::engine::control::ExecutionController;
use crate::engine::driver::{ResourceDriver, ScanFilter, ScanStream};
use crate::engine::model::{CleanResult, ResourceKind, ScanResult};

/// Marker for "files without an extension" (cron.d entries)
const NO_EXTENSION: &str = "";

/// Suffix a disabled definition is parked under
const DISABLED_SUFFIX: &str = ".disabled";

/// A resource kind whose items are individual definition files in a set
/// of directories: service units, timers and cron entries, module load
/// configs, connection profiles, preference files.
#[derive(Debug, Clone)]
pub struct DefinitionFileDriver {
    kind: ResourceKind,
    dirs: Vec<PathBuf>,
    extensions: &'static [&'static str],
}

impl DefinitionFileDriver {
    pub fn new(
        kind: ResourceKind,
        dirs: Vec<PathBuf>,
        extensions: &'static [&'static str],
    ) -> Self {
        Self {
            kind,
            dirs,
            extensions,
        }
    }

    pub fn services(dirs: Vec<PathBuf>) -> Self {
        Self::new(ResourceKind::Services, dirs, &["service", "socket"])
    }

    pub fn scheduled_tasks(dirs: Vec<PathBuf>) -> Self {
        Self::new(ResourceKind::ScheduledTasks, dirs, &["timer", NO_EXTENSION])
    }

    pub fn drivers(dirs: Vec<PathBuf>) -> Self {
        Self::new(ResourceKind::Drivers, dirs, &["conf"])
    }

    pub fn network(dirs: Vec<PathBuf>) -> Self {
        Self::new(ResourceKind::Network, dirs, &["nmconnection", "network"])
    }

    pub fn config_entries(dirs: Vec<PathBuf>) -> Self {
        Self::new(ResourceKind::ConfigEntries, dirs, &["plist", "conf", "ini"])
    }

    fn accepts(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or(NO_EXTENSION);
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        !hidden && self.extensions.contains(&ext)
    }

    /// List candidate files. Fails only if every existing directory is
    /// unreadable; missing directories just mean nothing is installed.
    fn list_candidates(&self) -> Result<Vec<PathBuf>, DriverError> {
        let mut files = Vec::new();
        let mut existing = 0usize;
        let mut last_error = None;

        for dir in &self.dirs {
            if !dir.is_dir() {
                continue;
            }
            existing += 1;
            match std::fs::read_dir(dir) {
                Ok(entries) => files.extend(
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| is_file_or_link(p) && self.accepts(p)),
                ),
                Err(e) => {
                    warn!(dir = %dir.display(), "cannot list definitions: {}", e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            if files.is_empty() && existing > 0 {
                return Err(DriverError::unavailable(self.kind.as_str(), e));
            }
        }
        files.sort();
        Ok(files)
    }

    fn describe(&self, path: &Path) -> ScanResult {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let size = std::fs::symlink_metadata(path).map(|m| m.len()).unwrap_or(0);
        let mut item = ScanResult::new(self.kind, name, path.display().to_string())
            .with_size(size)
            .with_description(read_description(path).unwrap_or_default());
        if let Some(dir) = path.parent() {
            item = item.with_detail("dir", dir.display().to_string());
        }
        with_entry_details(item, path)
    }
}

/// Regular files and symlinks (masked units point at /dev/null)
fn is_file_or_link(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_file() || m.file_type().is_symlink())
        .unwrap_or(false)
}

/// `acme.service` -> `acme.service.disabled`
fn disabled_path(path: &Path) -> PathBuf {
    let mut parked = OsString::from(path.as_os_str());
    parked.push(DISABLED_SUFFIX);
    PathBuf::from(parked)
}

/// `Description=` from a unit-style file, or the first comment line
fn read_description(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let mut comment = None;
    for line in contents.lines().map(str::trim) {
        if let Some(desc) = line.strip_prefix("Description=") {
            return Some(desc.trim().to_string());
        }
        if comment.is_none() {
            comment = line
                .strip_prefix('#')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }
    }
    comment
}

impl ResourceDriver for DefinitionFileDriver {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn scan<'a>(
        &'a self,
        filter: &'a ScanFilter,
        controller: &'a ExecutionController,
    ) -> Result<ScanStream<'a>, DriverError> {
        let candidates = self.list_candidates()?;
        debug!(driver = self.name(), candidates = candidates.len(), "definition files listed");
        Ok(Box::new(
            candidates
                .into_iter()
                .take_while(move |_| controller.checkpoint())
                .map(move |path| self.describe(&path))
                .filter(move |item| filter.matches_item(item)),
        ))
    }

    fn remove(&self, item: &ScanResult) -> CleanResult {
        remove_path_verified(item)
    }

    /// Services and timers can be parked instead of deleted
    fn supports_disable(&self) -> bool {
        matches!(self.kind, ResourceKind::Services | ResourceKind::ScheduledTasks)
    }

    fn disable(&self, item: &ScanResult) -> CleanResult {
        let path = item.path();
        let parked = disabled_path(&path);
        let parked_name = parked
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if is_absent(&path) {
            return if is_absent(&parked) {
                CleanResult::already_removed(item)
            } else {
                CleanResult::disabled(item, "already disabled")
            };
        }
        if !is_absent(&parked) {
            return CleanResult::disable_failed(item, format!("{} already exists", parked_name));
        }
        if let Err(e) = std::fs::rename(&path, &parked) {
            return CleanResult::disable_failed(item, e.to_string());
        }

        if is_absent(&path) && !is_absent(&parked) {
            CleanResult::disabled(item, format!("renamed to {}", parked_name))
        } else {
            CleanResult::disable_failed(item, "still active after disabling")
        }
    }

    fn capture(&self, item: &ScanResult, out: &mut dyn PayloadSink) -> Result<bool, DriverError> {
        capture_file(&item.path(), out)
    }

    fn supports_restore(&self) -> bool {
        true
    }

    /// Put the definition back; a copy parked by `disable` is dropped
    fn restore(&self, entry: &BackupEntry, payload: Option<&Path>) -> Result<(), DriverError> {
        let item = entry.to_scan_result();
        restore_file(&item, payload)?;
        let parked = disabled_path(&item.path());
        if !is_absent(&parked) {
            if let Err(e) = std::fs::remove_file(&parked) {
                warn!(path = %parked.display(), "could not drop disabled copy: {}", e);
            }
        }
        Ok(())
    }
}
