use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::app_sweep::{AppProfile, PatternBoundDriver};
use super::control::ExecutionController;
use super::driver::{CleanContext, DriverRegistry, ResourceDriver, ScanFilter};
use super::events::{EventSink, RunEvent};
use super::model::{CleanResult, ResourceKind, RunConfig, ScanResult};
use super::stats::{CleanStats, ModuleState, StatsAggregator};
use crate::backup::{BackupStore, DirectoryBackupStore, PayloadSink};
use crate::common::config::Settings;
use crate::common::errors::EngineError;
use crate::common::safety::ProtectedItemPolicy;

/// How the modules of a full sweep are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// One module at a time, in registration order
    Sequential,
    /// Modules as independent tasks on a bounded worker pool
    Parallel,
}

/// What a run does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Every registered driver
    Full {
        pattern: Option<String>,
        policy: ExecutionPolicy,
    },
    /// Exactly one named driver
    SingleKind {
        driver: String,
        pattern: Option<String>,
    },
    /// Every driver, re-targeted at patterns derived from an app name
    AppSweep { app_name: String },
    /// Discovery only; never cleans
    ScanOnly { pattern: Option<String> },
}

impl RunMode {
    pub fn is_destructive(&self) -> bool {
        !matches!(self, RunMode::ScanOnly { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Full { .. } => "full",
            RunMode::SingleKind { .. } => "single-kind",
            RunMode::AppSweep { .. } => "app-sweep",
            RunMode::ScanOnly { .. } => "scan-only",
        }
    }

    fn policy(&self) -> ExecutionPolicy {
        match self {
            RunMode::Full { policy, .. } => *policy,
            _ => ExecutionPolicy::Sequential,
        }
    }

    fn pattern(&self) -> Option<&str> {
        match self {
            RunMode::Full { pattern, .. }
            | RunMode::SingleKind { pattern, .. }
            | RunMode::ScanOnly { pattern } => pattern.as_deref(),
            RunMode::AppSweep { .. } => None,
        }
    }

    /// Name given to the run's backup session
    fn session_name(&self) -> Option<&str> {
        match self {
            RunMode::SingleKind { driver, .. } => Some(driver),
            RunMode::AppSweep { app_name } => Some(app_name.trim()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a finished run hands back to its caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: String,
    pub state: RunState,
    pub dry_run: bool,
    pub stats: CleanStats,
    /// Backup session written by this run, if any
    pub backup_session: Option<String>,
    /// Set when the session's entries were journaled but its manifest could
    /// not be finalized. The session still loads by journal replay.
    #[serde(default)]
    pub seal_error: Option<String>,
}

impl RunReport {
    /// No item or module errors, and the backup session (if any) sealed
    pub fn is_success(&self) -> bool {
        self.stats.is_success() && self.seal_error.is_none()
    }
}

/// Outcome of replaying a backup session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub session_id: String,
    /// False when restoring from a run that never sealed its session
    pub sealed: bool,
    pub restored: usize,
    pub failed: usize,
    pub results: Vec<CleanResult>,
}

/// Composes drivers, policy, backups and control into run modes
pub struct Orchestrator {
    registry: DriverRegistry,
    policy: ProtectedItemPolicy,
    store: Arc<dyn BackupStore>,
    max_workers: usize,
    timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(registry: DriverRegistry, store: Arc<dyn BackupStore>) -> Self {
        let max_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            registry,
            policy: ProtectedItemPolicy::new(),
            store,
            max_workers,
            timeout: None,
        }
    }

    /// Wire up an orchestrator the way the configuration describes it
    pub fn from_settings(registry: DriverRegistry, settings: &Settings) -> Self {
        let store = Arc::new(DirectoryBackupStore::new(&settings.backup_dir));
        let timeout =
            (settings.timeout_secs > 0).then(|| Duration::from_secs(settings.timeout_secs));
        Self::new(registry, store)
            .with_policy(ProtectedItemPolicy::new().with_extra(&settings.extra_protected))
            .with_max_workers(settings.worker_count())
            .with_timeout(timeout)
    }

    pub fn with_policy(mut self, policy: ProtectedItemPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Cancel runs that outlive `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn BackupStore> {
        &self.store
    }

    /// The store that owns `backup_directory`: the configured one when it is
    /// directory-backed there (or not directory-backed at all), otherwise a
    /// fresh directory store rooted at it.
    pub fn store_for(&self, backup_directory: &Path) -> Arc<dyn BackupStore> {
        match self.store.location() {
            Some(root) if root != backup_directory => {
                debug!(dir = %backup_directory.display(), "using run-specific backup directory");
                Arc::new(DirectoryBackupStore::new(backup_directory))
            }
            _ => Arc::clone(&self.store),
        }
    }

    /// Validate a run request and bind it to its modules. Nothing is
    /// touched until [`Run::execute`].
    pub fn prepare(&self, mode: RunMode, config: RunConfig) -> Result<Run<'_>, EngineError> {
        if self.registry.is_empty() {
            return Err(EngineError::InvalidMode("no drivers are registered".into()));
        }

        let modules: Vec<Arc<dyn ResourceDriver>> = match &mode {
            RunMode::Full { .. } | RunMode::ScanOnly { .. } => self.registry.all(),
            RunMode::SingleKind { driver, .. } => vec![self.registry.resolve(driver)?],
            RunMode::AppSweep { app_name } => {
                let profile = AppProfile::from_name(app_name).ok_or_else(|| {
                    EngineError::InvalidMode("app-sweep needs a non-empty application name".into())
                })?;
                debug!(app = %profile.name, variants = ?profile.variants, "app sweep patterns");
                self.registry
                    .all()
                    .into_iter()
                    .map(|d| {
                        let bound: Arc<dyn ResourceDriver> =
                            Arc::new(PatternBoundDriver::for_app(d, &profile));
                        bound
                    })
                    .collect()
            }
        };

        let match_all = !mode.is_destructive();
        let modules = modules
            .into_iter()
            .map(|driver| {
                let match_all = match_all || !driver.requires_pattern();
                let filter = ScanFilter::from_pattern(mode.pattern(), match_all);
                (driver, filter)
            })
            .collect();

        let store = self.store_for(&config.backup_directory);
        Ok(Run {
            orchestrator: self,
            store,
            mode,
            config,
            modules,
            controller: ExecutionController::new(),
            stats: StatsAggregator::new(),
            state: Mutex::new(RunState::Idle),
        })
    }

    /// Convenience: prepare and execute in one call
    pub fn run(
        &self,
        mode: RunMode,
        config: RunConfig,
        sink: &dyn EventSink,
    ) -> Result<RunReport, EngineError> {
        self.prepare(mode, config)?.execute(sink)
    }

    /// Replay a backup session through the owning drivers, newest entry
    /// first. Existing resources are never overwritten.
    pub fn restore(
        &self,
        session_id: &str,
        kind: Option<ResourceKind>,
    ) -> Result<RestoreReport, EngineError> {
        self.restore_from(self.store.as_ref(), session_id, kind)
    }

    /// [`Orchestrator::restore`] for a session written under another backup
    /// directory
    pub fn restore_in(
        &self,
        backup_directory: &Path,
        session_id: &str,
        kind: Option<ResourceKind>,
    ) -> Result<RestoreReport, EngineError> {
        let store = self.store_for(backup_directory);
        self.restore_from(store.as_ref(), session_id, kind)
    }

    fn restore_from(
        &self,
        store: &dyn BackupStore,
        session_id: &str,
        kind: Option<ResourceKind>,
    ) -> Result<RestoreReport, EngineError> {
        let session = store.load(session_id)?;
        if !session.sealed {
            warn!(session = session_id, "restoring from an unsealed session");
        }

        let mut report = RestoreReport {
            session_id: session.session_id.clone(),
            sealed: session.sealed,
            restored: 0,
            failed: 0,
            results: Vec::new(),
        };

        for entry in session.entries.iter().rev() {
            if kind.is_some_and(|k| k != entry.resource_kind) {
                continue;
            }
            let item = entry.to_scan_result();
            let driver = self
                .registry
                .get(&entry.driver)
                .or_else(|| self.registry.for_kind(entry.resource_kind));

            let outcome = match driver {
                None => Err(format!("no driver registered for '{}'", entry.driver)),
                Some(d) if !d.supports_restore() => {
                    Err(format!("{} does not support restore", d.name()))
                }
                Some(d) => store
                    .payload_path(session_id, entry)
                    .map_err(|e| e.to_string())
                    .and_then(|payload| {
                        d.restore(entry, payload.as_deref()).map_err(|e| e.to_string())
                    }),
            };

            let result = match outcome {
                Ok(()) => {
                    report.restored += 1;
                    info!(location = %item.location, "restored");
                    CleanResult::restored(&item, true, "restored")
                }
                Err(reason) => {
                    report.failed += 1;
                    warn!(location = %item.location, "restore failed: {}", reason);
                    CleanResult::restored(&item, false, reason)
                }
            };
            report.results.push(result);
        }

        info!(
            session = session_id,
            restored = report.restored,
            failed = report.failed,
            "restore finished"
        );
        Ok(report)
    }
}

/// One prepared orchestrator run: `Idle` until executed, then `Running`,
/// ending in `Completed` or `Cancelled`.
pub struct Run<'o> {
    orchestrator: &'o Orchestrator,
    store: Arc<dyn BackupStore>,
    mode: RunMode,
    config: RunConfig,
    modules: Vec<(Arc<dyn ResourceDriver>, ScanFilter)>,
    controller: Arc<ExecutionController>,
    stats: StatsAggregator,
    state: Mutex<RunState>,
}

impl<'o> Run<'o> {
    /// Token for cancelling or pausing this run from another thread
    pub fn controller(&self) -> Arc<ExecutionController> {
        Arc::clone(&self.controller)
    }

    pub fn state(&self) -> RunState {
        *self.lock_state()
    }

    /// Live statistics, readable while the run executes
    pub fn stats(&self) -> CleanStats {
        self.stats.snapshot()
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn execute(&self, sink: &dyn EventSink) -> Result<RunReport, EngineError> {
        {
            let mut state = self.lock_state();
            if *state != RunState::Idle {
                return Err(EngineError::AlreadyStarted(state.to_string()));
            }
            *state = RunState::Running;
        }

        let store = &self.store;
        let session = if self.mode.is_destructive() && self.config.backups_active() {
            match store.begin_session(self.mode.session_name()) {
                Ok(id) => Some(id),
                Err(e) => {
                    *self.lock_state() = RunState::Completed;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            mode = self.mode.label(),
            modules = self.modules.len(),
            dry_run = self.config.dry_run,
            force = self.config.force,
            backup = ?session,
            "run started"
        );

        let deadline = self
            .orchestrator
            .timeout
            .map(|t| self.controller.cancel_after(t));

        match self.mode.policy() {
            ExecutionPolicy::Sequential => self.run_sequential(session.as_deref(), sink),
            ExecutionPolicy::Parallel => self.run_parallel(session.as_deref(), sink),
        }

        self.controller.finish();
        if let Some(handle) = deadline {
            let _ = handle.join();
        }

        let seal_error = session.as_ref().and_then(|id| match store.seal(id) {
            Ok(()) => None,
            Err(e) => {
                error!(session = %id, "failed to seal backup session: {}", e);
                Some(e.to_string())
            }
        });

        let stats = self.stats.finish();
        let state = if self.controller.is_cancelled() {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        *self.lock_state() = state;

        info!(
            state = %state,
            scanned = stats.items_scanned,
            cleaned = stats.items_cleaned,
            skipped = stats.items_skipped,
            errors = stats.errors,
            bytes = stats.bytes_reclaimed,
            "run finished"
        );

        Ok(RunReport {
            mode: self.mode.label().to_string(),
            state,
            dry_run: self.config.dry_run,
            stats,
            backup_session: session,
            seal_error,
        })
    }

    fn run_sequential(&self, session: Option<&str>, sink: &dyn EventSink) {
        for (driver, filter) in &self.modules {
            self.run_module(driver.as_ref(), filter, session, sink);
        }
    }

    fn run_parallel(&self, session: Option<&str>, sink: &dyn EventSink) {
        let workers = self.orchestrator.max_workers.min(self.modules.len()).max(1);
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tracesweep-worker-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("worker pool unavailable, running sequentially: {}", e);
                return self.run_sequential(session, sink);
            }
        };

        debug!(workers, "running modules in parallel");
        pool.install(|| {
            self.modules.par_iter().for_each(|(driver, filter)| {
                self.run_module(driver.as_ref(), filter, session, sink);
            });
        });
    }

    /// Scan and (unless scan-only) clean one module. A panicking driver
    /// fails only its own module.
    fn run_module(
        &self,
        driver: &dyn ResourceDriver,
        filter: &ScanFilter,
        session: Option<&str>,
        sink: &dyn EventSink,
    ) {
        if !self.controller.checkpoint() {
            return;
        }

        let module = driver.name().to_string();
        let started = Instant::now();
        self.stats.module_started(&module);
        sink.on_event(&RunEvent::ModuleStarted {
            module: module.clone(),
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.scan_and_clean(driver, &module, filter, session, sink)
        }));

        let state = match outcome {
            Ok(Ok(())) if self.controller.is_cancelled() => ModuleState::Cancelled,
            Ok(Ok(())) => ModuleState::Completed,
            Ok(Err(reason)) => self.fail_module(&module, &reason, sink),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                self.fail_module(&module, &format!("driver panicked: {}", reason), sink)
            }
        };

        self.stats
            .module_finished(&module, state, started.elapsed().as_secs_f64());
        let snapshot = self.stats.snapshot();
        if let Some(stats) = snapshot.per_module.get(&module) {
            sink.on_event(&RunEvent::ModuleFinished {
                module: module.clone(),
                stats: stats.clone(),
            });
        }
    }

    fn fail_module(&self, module: &str, reason: &str, sink: &dyn EventSink) -> ModuleState {
        error!(module, "module failed: {}", reason);
        self.stats.record_module_failure(module, reason);
        sink.on_event(&RunEvent::ModuleFailed {
            module: module.to_string(),
            reason: reason.to_string(),
        });
        ModuleState::Failed
    }

    fn scan_and_clean(
        &self,
        driver: &dyn ResourceDriver,
        module: &str,
        filter: &ScanFilter,
        session: Option<&str>,
        sink: &dyn EventSink,
    ) -> Result<(), String> {
        if filter.is_nothing() {
            debug!(module, "no pattern given, nothing selected");
            return Ok(());
        }

        let stream = driver
            .scan(filter, &self.controller)
            .map_err(|e| e.to_string())?;

        let mut items = Vec::new();
        for item in stream {
            self.stats.record_scanned(module, 1);
            sink.on_event(&RunEvent::ItemScanned {
                module: module.to_string(),
                item: item.clone(),
            });
            items.push(item);
        }
        debug!(module, count = items.len(), "scan finished");

        if !self.mode.is_destructive() {
            return Ok(());
        }

        for item in items {
            let result = if self.controller.checkpoint() {
                self.clean_item(driver, &item, session)
            } else {
                CleanResult::skipped(&item, "cancelled")
            };

            let (location, success) = (&result.target, result.success);
            if self.config.verbose {
                info!(module, location = %location, success, "{}", result.message);
            } else {
                debug!(module, location = %location, success, "{}", result.message);
            }
            self.stats.record_result(module, &result);
            sink.on_event(&RunEvent::ItemCleaned {
                module: module.to_string(),
                result,
            });
        }
        Ok(())
    }

    /// Policy check, then write-ahead backup, then the destructive call
    fn clean_item(
        &self,
        driver: &dyn ResourceDriver,
        item: &ScanResult,
        session: Option<&str>,
    ) -> CleanResult {
        let protected = self.orchestrator.policy.is_protected(driver.kind(), item);
        if protected && !self.config.force {
            return CleanResult::skipped(item, "protected system item");
        }
        if protected {
            warn!(
                location = %item.location,
                dry_run = self.config.dry_run,
                "protected item forced"
            );
        }

        if let Some(session) = session {
            let mut capture = |out: &mut dyn PayloadSink| driver.capture(item, out);
            let recorded = self
                .store
                .record_with(session, driver.name(), item, &mut capture);
            if let Err(reason) = recorded {
                error!(
                    location = %item.location,
                    "backup failed, item left untouched: {}", reason
                );
                return CleanResult::failed(item, format!("backup failed: {}", reason));
            }
        }

        let ctx = CleanContext {
            config: &self.config,
            controller: &self.controller,
        };
        let mut result = driver
            .clean(vec![item.clone()], ctx)
            .next()
            .unwrap_or_else(|| CleanResult::failed(item, "driver returned no result"));

        if protected && result.simulated {
            result.message = format!("{} (protected, forced)", result.message);
        }
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
