//! Built-in resource drivers. Everything OS-specific lives here, behind
//! the [`ResourceDriver`](crate::engine::ResourceDriver) contract.

pub mod definition;
pub mod filesystem;
pub mod startup;

use std::fs::{File, Metadata};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;

use crate::backup::PayloadSink;
use crate::common::config::Settings;
use crate::common::errors::{DriverError, EngineError};
use crate::engine::driver::DriverRegistry;
use crate::engine::model::{CleanResult, ScanResult};

pub use definition::DefinitionFileDriver;
pub use filesystem::FilesystemDriver;
pub use startup::StartupItemDriver;

/// Registry with one driver per resource kind, configured from settings
pub fn default_registry(settings: &Settings) -> Result<DriverRegistry, EngineError> {
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(DefinitionFileDriver::config_entries(
        settings.config_dirs.clone(),
    )))?;
    registry.register(Arc::new(FilesystemDriver::from_settings(settings)))?;
    registry.register(Arc::new(DefinitionFileDriver::services(
        settings.service_dirs.clone(),
    )))?;
    registry.register(Arc::new(DefinitionFileDriver::drivers(
        settings.module_dirs.clone(),
    )))?;
    registry.register(Arc::new(DefinitionFileDriver::network(
        settings.network_dirs.clone(),
    )))?;
    registry.register(Arc::new(DefinitionFileDriver::scheduled_tasks(
        settings.task_dirs.clone(),
    )))?;
    registry.register(Arc::new(StartupItemDriver::new(settings.startup_dirs.clone())))?;
    Ok(registry)
}

/// True if nothing (not even a dangling symlink) exists at `path`
pub(crate) fn is_absent(path: &Path) -> bool {
    matches!(std::fs::symlink_metadata(path), Err(e) if e.kind() == ErrorKind::NotFound)
}

/// Remove a file or directory tree and confirm it is gone
pub(crate) fn remove_path_verified(item: &ScanResult) -> CleanResult {
    let path = item.path();
    let meta = match std::fs::symlink_metadata(&path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return CleanResult::already_removed(item),
        Err(e) => return CleanResult::failed(item, e.to_string()),
    };

    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(&path)
    } else {
        std::fs::remove_file(&path)
    };
    if let Err(e) = removed {
        return CleanResult::failed(item, e.to_string());
    }

    if is_absent(&path) {
        CleanResult::deleted(item, "removed")
    } else {
        CleanResult::failed(item, "still present after removal")
    }
}

/// Record how a definition file is stored so restore can rebuild the same
/// thing: a link stays a link, a file keeps its mode.
pub(crate) fn with_entry_details(item: ScanResult, path: &Path) -> ScanResult {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => item.with_detail("entry", "symlink"),
        Ok(meta) => item
            .with_detail("entry", "file")
            .with_detail("mode", i64::from(file_mode(&meta))),
        Err(_) => item,
    }
}

/// Stream a single file into a payload; a symlink is captured as its target
pub(crate) fn capture_file(path: &Path, out: &mut dyn PayloadSink) -> Result<bool, DriverError> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| DriverError::io(path, e))?;
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(path).map_err(|e| DriverError::io(path, e))?;
        out.write_all(target.to_string_lossy().as_bytes())
            .map_err(|e| DriverError::capture(path.display(), e))?;
    } else {
        let mut file = File::open(path).map_err(|e| DriverError::io(path, e))?;
        std::io::copy(&mut file, out).map_err(|e| DriverError::capture(path.display(), e))?;
    }
    Ok(true)
}

/// Re-create a single file or symlink from its payload, never overwriting
pub(crate) fn restore_file(item: &ScanResult, payload: Option<&Path>) -> Result<(), DriverError> {
    let path = item.path();
    let payload =
        payload.ok_or_else(|| DriverError::restore(path.display(), "no payload captured"))?;
    if !is_absent(&path) {
        return Err(DriverError::restore(path.display(), "already exists"));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DriverError::io(parent, e))?;
    }

    if item.detail_text("entry") == Some("symlink") {
        let target = std::fs::read_to_string(payload).map_err(|e| DriverError::io(payload, e))?;
        return restore_symlink(&path, Path::new(&target));
    }
    write_from_payload(item, &path, payload)
}

/// Put the captured contents back over whatever is at the item's path now
pub(crate) fn replace_file(item: &ScanResult, payload: Option<&Path>) -> Result<(), DriverError> {
    let path = item.path();
    let payload =
        payload.ok_or_else(|| DriverError::restore(path.display(), "no payload captured"))?;
    write_from_payload(item, &path, payload)
}

fn write_from_payload(item: &ScanResult, path: &Path, payload: &Path) -> Result<(), DriverError> {
    let mut source = File::open(payload).map_err(|e| DriverError::io(payload, e))?;
    let mut dest = File::create(path).map_err(|e| DriverError::io(path, e))?;
    std::io::copy(&mut source, &mut dest).map_err(|e| DriverError::io(path, e))?;
    match item.detail_int("mode").and_then(|m| u32::try_from(m).ok()) {
        Some(mode) => set_mode(path, mode),
        None => Ok(()),
    }
}

#[cfg(unix)]
pub(crate) fn restore_symlink(path: &Path, target: &Path) -> Result<(), DriverError> {
    std::os::unix::fs::symlink(target, path).map_err(|e| DriverError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn restore_symlink(path: &Path, _target: &Path) -> Result<(), DriverError> {
    Err(DriverError::restore(
        path.display(),
        "symlinks can only be restored on unix",
    ))
}

/// Permission bits of a file or directory
#[cfg(unix)]
pub(crate) fn file_mode(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub(crate) fn file_mode(meta: &Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<(), DriverError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| DriverError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<(), DriverError> {
    Ok(())
}
