#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracesweep::backup::{
    BackupEntry, BackupSession, BackupStore, CaptureFn, DirectoryBackupStore, PayloadSink,
    SessionSummary,
};
use tracesweep::common::errors::{BackupError, DriverError};
use tracesweep::engine::{
    CleanResult, DriverRegistry, ExecutionController, Orchestrator, ResourceDriver, ResourceKind,
    RunConfig, ScanFilter, ScanResult, ScanStream,
};

/// In-memory driver whose "system" is a set of names, with failure
/// injection for every stage of the pipeline
pub struct ScriptedDriver {
    name: String,
    kind: ResourceKind,
    present: Mutex<BTreeSet<String>>,
    fail_remove: BTreeSet<String>,
    fail_capture: BTreeSet<String>,
    scan_error: Option<String>,
    panic_on_scan: bool,
    restorable: bool,
    remove_delay: Duration,
    removals: Mutex<Vec<(String, DateTime<Utc>)>>,
    cancel_on_remove: Mutex<Option<Arc<ExecutionController>>>,
    pause_on_remove: Mutex<Option<Arc<ExecutionController>>>,
}

impl ScriptedDriver {
    pub fn new(name: &str, kind: ResourceKind, items: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            present: Mutex::new(items.iter().map(|s| s.to_string()).collect()),
            fail_remove: BTreeSet::new(),
            fail_capture: BTreeSet::new(),
            scan_error: None,
            panic_on_scan: false,
            restorable: true,
            remove_delay: Duration::ZERO,
            removals: Mutex::new(Vec::new()),
            cancel_on_remove: Mutex::new(None),
            pause_on_remove: Mutex::new(None),
        }
    }

    pub fn failing_remove(mut self, item: &str) -> Self {
        self.fail_remove.insert(item.to_string());
        self
    }

    pub fn failing_capture(mut self, item: &str) -> Self {
        self.fail_capture.insert(item.to_string());
        self
    }

    pub fn unavailable(mut self, reason: &str) -> Self {
        self.scan_error = Some(reason.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_scan = true;
        self
    }

    pub fn without_restore(mut self) -> Self {
        self.restorable = false;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.remove_delay = delay;
        self
    }

    /// Cancel `controller` right after the next successful removal
    pub fn cancel_on_remove(&self, controller: Arc<ExecutionController>) {
        *self.cancel_on_remove.lock().unwrap() = Some(controller);
    }

    /// Pause `controller` during the next successful removal, once
    pub fn pause_on_remove(&self, controller: Arc<ExecutionController>) {
        *self.pause_on_remove.lock().unwrap() = Some(controller);
    }

    pub fn present(&self) -> Vec<String> {
        self.present.lock().unwrap().iter().cloned().collect()
    }

    pub fn removals(&self) -> Vec<(String, DateTime<Utc>)> {
        self.removals.lock().unwrap().clone()
    }

    pub fn location(&self, item: &str) -> String {
        format!("{}:{}", self.name, item)
    }

    fn item(&self, name: &str) -> ScanResult {
        ScanResult::new(self.kind, name, self.location(name)).with_size(100)
    }
}

impl ResourceDriver for ScriptedDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn scan<'a>(
        &'a self,
        filter: &'a ScanFilter,
        controller: &'a ExecutionController,
    ) -> Result<ScanStream<'a>, DriverError> {
        if self.panic_on_scan {
            panic!("scripted panic in {}", self.name);
        }
        if let Some(reason) = &self.scan_error {
            return Err(DriverError::Unavailable {
                driver: self.name.clone(),
                reason: reason.clone(),
            });
        }
        let items: Vec<ScanResult> = self.present().iter().map(|n| self.item(n)).collect();
        Ok(Box::new(
            items
                .into_iter()
                .take_while(move |_| controller.checkpoint())
                .filter(move |item| filter.matches_item(item)),
        ))
    }

    fn remove(&self, item: &ScanResult) -> CleanResult {
        if self.fail_remove.contains(&item.name) {
            return CleanResult::failed(item, "access denied");
        }
        std::thread::sleep(self.remove_delay);
        if !self.present.lock().unwrap().remove(&item.name) {
            return CleanResult::already_removed(item);
        }
        if let Some(controller) = self.pause_on_remove.lock().unwrap().take() {
            controller.pause();
        }
        self.removals
            .lock()
            .unwrap()
            .push((item.name.clone(), Utc::now()));
        if let Some(controller) = self.cancel_on_remove.lock().unwrap().as_ref() {
            controller.cancel();
        }
        CleanResult::deleted(item, "removed")
    }

    fn capture(&self, item: &ScanResult, out: &mut dyn PayloadSink) -> Result<bool, DriverError> {
        let capture_err = |reason: String| DriverError::Capture {
            target: item.location.clone(),
            reason,
        };
        if self.fail_capture.contains(&item.name) {
            return Err(capture_err("resource is locked".into()));
        }
        out.write_all(item.name.as_bytes())
            .map_err(|e| capture_err(e.to_string()))?;
        Ok(true)
    }

    fn supports_restore(&self) -> bool {
        self.restorable
    }

    fn restore(&self, entry: &BackupEntry, payload: Option<&Path>) -> Result<(), DriverError> {
        let restore_err = |reason: &str| DriverError::Restore {
            target: entry.identity.location.clone(),
            reason: reason.to_string(),
        };
        let bytes = payload.and_then(|p| std::fs::read(p).ok());
        if bytes.as_deref() != Some(entry.identity.name.as_bytes()) {
            return Err(restore_err("payload does not match identity"));
        }
        if !self
            .present
            .lock()
            .unwrap()
            .insert(entry.identity.name.clone())
        {
            return Err(restore_err("already exists"));
        }
        Ok(())
    }
}

/// Directory store that fails the Nth `record` call (1-based), and
/// optionally every `seal`
pub struct FailingStore {
    inner: DirectoryBackupStore,
    fail_on: usize,
    fail_seal: bool,
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new(root: &Path, fail_on: usize) -> Self {
        Self {
            inner: DirectoryBackupStore::new(root),
            fail_on,
            fail_seal: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_seal(mut self) -> Self {
        self.fail_seal = true;
        self
    }
}

impl BackupStore for FailingStore {
    fn begin_session(&self, name: Option<&str>) -> Result<String, BackupError> {
        self.inner.begin_session(name)
    }

    fn record_with(
        &self,
        session_id: &str,
        driver: &str,
        item: &ScanResult,
        capture: &mut CaptureFn<'_>,
    ) -> Result<BackupEntry, BackupError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(disk_full("journal.jsonl"));
        }
        self.inner.record_with(session_id, driver, item, capture)
    }

    fn seal(&self, session_id: &str) -> Result<(), BackupError> {
        if self.fail_seal {
            return Err(disk_full("manifest.json"));
        }
        self.inner.seal(session_id)
    }

    fn load(&self, session_id: &str) -> Result<BackupSession, BackupError> {
        self.inner.load(session_id)
    }

    fn payload_path(
        &self,
        session_id: &str,
        entry: &BackupEntry,
    ) -> Result<Option<PathBuf>, BackupError> {
        self.inner.payload_path(session_id, entry)
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackupError> {
        self.inner.list_sessions()
    }

    fn delete_session(&self, session_id: &str) -> Result<(), BackupError> {
        self.inner.delete_session(session_id)
    }
}

fn disk_full(file: &str) -> BackupError {
    BackupError::Io {
        path: PathBuf::from(file),
        source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
    }
}

pub fn registry(drivers: &[Arc<ScriptedDriver>]) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    for driver in drivers {
        registry.register(driver.clone()).unwrap();
    }
    registry
}

pub fn orchestrator(drivers: &[Arc<ScriptedDriver>], backup_root: &Path) -> Orchestrator {
    Orchestrator::new(
        registry(drivers),
        Arc::new(DirectoryBackupStore::new(backup_root)),
    )
    .with_max_workers(4)
}

pub fn config(backup_root: &Path) -> RunConfig {
    RunConfig {
        dry_run: false,
        force: false,
        create_backup: true,
        disable: false,
        backup_directory: backup_root.to_path_buf(),
        verbose: false,
    }
}
