use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::{
    capture_file, file_mode, is_absent, remove_path_verified, restore_file, restore_symlink,
    set_mode,
};
use crate::backup::{BackupEntry, PayloadSink};
use crate::common::config::Settings;
use crate::common::errors::DriverError;
use crate::engine::control::ExecutionController;
use crate::engine::driver::{ResourceDriver, ScanFilter, ScanStream};
use crate::engine::model::{CleanResult, ResourceKind, ScanResult};

/// Leftover files and folders under a set of search roots.
///
/// A matching directory is reported once, as a whole; the walk does not
/// descend into it.
#[derive(Debug, Clone)]
pub struct FilesystemDriver {
    roots: Vec<PathBuf>,
    max_depth: usize,
    exclude: Vec<String>,
}

impl FilesystemDriver {
    pub fn new(roots: Vec<PathBuf>, max_depth: usize) -> Self {
        Self {
            roots,
            max_depth: max_depth.max(1),
            exclude: Vec::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.filesystem_roots.clone(), settings.max_depth)
            .with_excludes(settings.exclude_paths.clone())
    }

    /// Skip any path containing one of these substrings
    pub fn with_excludes(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let s = path.to_string_lossy();
        self.exclude.iter().any(|e| s.contains(e.as_str()))
    }

    /// Resolve `~` and glob patterns in the configured roots
    fn expanded_roots(&self) -> Vec<PathBuf> {
        let home = dirs::home_dir().unwrap_or_default();
        let mut expanded = Vec::new();
        for root in &self.roots {
            let raw = root.to_string_lossy();
            let resolved = match raw.strip_prefix('~') {
                Some(rest) => format!("{}{}", home.display(), rest),
                None => raw.to_string(),
            };
            if resolved.contains(['*', '?', '[']) {
                match glob::glob(&resolved) {
                    Ok(paths) => expanded.extend(paths.filter_map(|p| p.ok())),
                    Err(e) => debug!(root = %resolved, "bad root pattern: {}", e),
                }
            } else {
                expanded.push(PathBuf::from(resolved));
            }
        }
        expanded
    }
}

/// Lazy walk over every root, yielding matches
struct FsScan<'a> {
    driver: &'a FilesystemDriver,
    filter: &'a ScanFilter,
    controller: &'a ExecutionController,
    roots: std::vec::IntoIter<PathBuf>,
    current: Option<(PathBuf, walkdir::IntoIter)>,
}

impl Iterator for FsScan<'_> {
    type Item = ScanResult;

    fn next(&mut self) -> Option<ScanResult> {
        loop {
            if !self.controller.checkpoint() {
                return None;
            }

            let Some((root, walker)) = self.current.as_mut() else {
                let root = self.roots.next()?;
                if root.is_dir() && !self.driver.is_excluded(&root) {
                    let walker = WalkDir::new(&root)
                        .min_depth(1)
                        .max_depth(self.driver.max_depth)
                        .follow_links(false)
                        .into_iter();
                    self.current = Some((root, walker));
                }
                continue;
            };

            let entry = match walker.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    debug!("skipping unreadable entry: {}", e);
                    continue;
                }
                None => {
                    self.current = None;
                    continue;
                }
            };

            let path = entry.path();
            if self.driver.is_excluded(path) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let relative = path
                .strip_prefix(&*root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            if !self.filter.matches(&[&name, &relative]) {
                continue;
            }

            let is_dir = entry.file_type().is_dir();
            if is_dir {
                walker.skip_current_dir();
            }
            return Some(describe(path, name, root, &entry));
        }
    }
}

fn describe(path: &Path, name: String, root: &Path, entry: &walkdir::DirEntry) -> ScanResult {
    let file_type = entry.file_type();
    let meta = entry.metadata().ok();
    let (kind, size) = if file_type.is_symlink() {
        ("symlink", 0)
    } else if file_type.is_dir() {
        ("dir", dir_size(path))
    } else {
        ("file", meta.as_ref().map(|m| m.len()).unwrap_or(0))
    };
    let item = ScanResult::new(ResourceKind::Filesystem, name, path.display().to_string())
        .with_size(size)
        .with_detail("entry", kind)
        .with_detail("root", root.display().to_string());
    match meta {
        Some(meta) if !file_type.is_symlink() => {
            item.with_detail("mode", i64::from(file_mode(&meta)))
        }
        _ => item,
    }
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Stream a directory tree into a zip archive. Symlinks inside the tree are
/// stored as links and every entry carries its permission bits.
fn archive_dir(dir: &Path, out: &mut dyn PayloadSink) -> Result<(), DriverError> {
    let fail = |reason: String| DriverError::capture(dir.display(), reason);
    let mut zip = ZipWriter::new(out);

    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| fail(e.to_string()))?;
        let path = entry.path();
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| fail(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        let meta = entry.metadata().map_err(|e| fail(e.to_string()))?;
        let options = SimpleFileOptions::default().unix_permissions(file_mode(&meta));

        if entry.file_type().is_symlink() {
            let target = std::fs::read_link(path).map_err(|e| DriverError::io(path, e))?;
            zip.add_symlink(relative, target.to_string_lossy(), SimpleFileOptions::default())
                .map_err(|e| fail(e.to_string()))?;
        } else if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", relative), options)
                .map_err(|e| fail(e.to_string()))?;
        } else if entry.file_type().is_file() {
            let options = options.large_file(meta.len() >= u64::from(u32::MAX));
            zip.start_file(relative, options)
                .map_err(|e| fail(e.to_string()))?;
            let mut file = File::open(path).map_err(|e| DriverError::io(path, e))?;
            std::io::copy(&mut file, &mut zip).map_err(|e| DriverError::io(path, e))?;
        }
    }

    zip.finish().map_err(|e| fail(e.to_string()))?;
    Ok(())
}

/// Unpack an archive written by `archive_dir` into `dest`
fn extract_archive(archive: &Path, dest: &Path) -> Result<(), DriverError> {
    let fail = |reason: String| DriverError::restore(dest.display(), reason);
    let file = File::open(archive).map_err(|e| DriverError::io(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;
    let mut dir_modes = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| fail(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry outside the tree");
            continue;
        };
        let out_path = dest.join(relative);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| DriverError::io(&out_path, e))?;
            if let Some(mode) = mode {
                dir_modes.push((out_path, mode));
            }
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DriverError::io(parent, e))?;
        }
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| DriverError::io(&out_path, e))?;
            restore_symlink(&out_path, Path::new(&target))?;
        } else {
            let mut out = File::create(&out_path).map_err(|e| DriverError::io(&out_path, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| DriverError::io(&out_path, e))?;
            if let Some(mode) = mode {
                set_mode(&out_path, mode)?;
            }
        }
    }

    // Deepest first, so a read-only directory is closed after its contents
    for (path, mode) in dir_modes.into_iter().rev() {
        set_mode(&path, mode)?;
    }
    Ok(())
}

impl ResourceDriver for FilesystemDriver {
    fn name(&self) -> &str {
        ResourceKind::Filesystem.as_str()
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Filesystem
    }

    fn scan<'a>(
        &'a self,
        filter: &'a ScanFilter,
        controller: &'a ExecutionController,
    ) -> Result<ScanStream<'a>, DriverError> {
        Ok(Box::new(FsScan {
            driver: self,
            filter,
            controller,
            roots: self.expanded_roots().into_iter(),
            current: None,
        }))
    }

    fn remove(&self, item: &ScanResult) -> CleanResult {
        remove_path_verified(item)
    }

    fn simulate(&self, item: &ScanResult) -> CleanResult {
        if is_absent(&item.path()) {
            let mut result = CleanResult::already_removed(item);
            result.simulated = true;
            return result;
        }
        CleanResult::simulated(item, format!("would remove {}", item.location))
    }

    /// Files as raw bytes, directories as a zip archive, symlinks as
    /// their target path
    fn capture(&self, item: &ScanResult, out: &mut dyn PayloadSink) -> Result<bool, DriverError> {
        let path = item.path();
        let meta = std::fs::symlink_metadata(&path).map_err(|e| DriverError::io(&path, e))?;
        if meta.is_dir() {
            archive_dir(&path, out)?;
            Ok(true)
        } else {
            capture_file(&path, out)
        }
    }

    fn supports_restore(&self) -> bool {
        true
    }

    fn restore(&self, entry: &BackupEntry, payload: Option<&Path>) -> Result<(), DriverError> {
        let item = entry.to_scan_result();
        if item.detail_text("entry") != Some("dir") {
            return restore_file(&item, payload);
        }

        let path = item.path();
        let payload =
            payload.ok_or_else(|| DriverError::restore(path.display(), "no payload captured"))?;
        if !is_absent(&path) {
            return Err(DriverError::restore(path.display(), "already exists"));
        }
        std::fs::create_dir_all(&path).map_err(|e| DriverError::io(&path, e))?;
        extract_archive(payload, &path)?;
        match item.detail_int("mode").and_then(|m| u32::try_from(m).ok()) {
            Some(mode) => set_mode(&path, mode),
            None => Ok(()),
        }
    }
}
