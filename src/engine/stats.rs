use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::model::{CleanAction, CleanResult};

/// Lifecycle of one module within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Per-module counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleStats {
    pub state: ModuleState,
    pub scanned: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub errors: usize,
    pub bytes_reclaimed: u64,
    /// Driver-wide failure reason, if the module failed as a whole
    pub failure: Option<String>,
    pub duration_secs: f64,
}

/// Aggregate statistics for one orchestrator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanStats {
    pub items_scanned: usize,
    pub items_cleaned: usize,
    /// Subset of `items_cleaned` that was disabled rather than removed
    #[serde(default)]
    pub items_disabled: usize,
    pub items_skipped: usize,
    pub bytes_reclaimed: u64,
    pub errors: usize,
    pub per_module: BTreeMap<String, ModuleStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for CleanStats {
    fn default() -> Self {
        Self {
            items_scanned: 0,
            items_cleaned: 0,
            items_disabled: 0,
            items_skipped: 0,
            bytes_reclaimed: 0,
            errors: 0,
            per_module: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

impl CleanStats {
    /// Run-level success: no errors anywhere
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

/// The only writer of `CleanStats`. Every update is a single critical
/// section, so totals always equal the sum of module contributions.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<CleanStats>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CleanStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn module_started(&self, module: &str) {
        self.lock().per_module.entry(module.to_string()).or_default().state = ModuleState::Running;
    }

    pub fn record_scanned(&self, module: &str, count: usize) {
        let mut stats = self.lock();
        stats.items_scanned += count;
        stats.per_module.entry(module.to_string()).or_default().scanned += count;
    }

    pub fn record_result(&self, module: &str, result: &CleanResult) {
        let mut stats = self.lock();
        let CleanStats {
            items_cleaned,
            items_disabled,
            items_skipped,
            bytes_reclaimed,
            errors,
            per_module,
            ..
        } = &mut *stats;
        let module_stats = per_module.entry(module.to_string()).or_default();

        if result.is_skip() {
            *items_skipped += 1;
            module_stats.skipped += 1;
        } else if result.success {
            *items_cleaned += 1;
            if result.action == CleanAction::Disable {
                *items_disabled += 1;
            }
            *bytes_reclaimed += result.bytes_freed;
            module_stats.cleaned += 1;
            module_stats.bytes_reclaimed += result.bytes_freed;
        } else {
            *errors += 1;
            module_stats.errors += 1;
        }
    }

    /// A whole module failed (source unavailable, panic)
    pub fn record_module_failure(&self, module: &str, reason: &str) {
        let mut stats = self.lock();
        stats.errors += 1;
        let module_stats = stats.per_module.entry(module.to_string()).or_default();
        module_stats.errors += 1;
        module_stats.state = ModuleState::Failed;
        module_stats.failure = Some(reason.to_string());
    }

    pub fn module_finished(&self, module: &str, state: ModuleState, duration_secs: f64) {
        let mut stats = self.lock();
        let module_stats = stats.per_module.entry(module.to_string()).or_default();
        if module_stats.state != ModuleState::Failed {
            module_stats.state = state;
        }
        module_stats.duration_secs = duration_secs;
    }

    pub fn snapshot(&self) -> CleanStats {
        self.lock().clone()
    }

    /// Final snapshot, stamped with the finish time
    pub fn finish(&self) -> CleanStats {
        let mut stats = self.lock();
        stats.finished_at = Some(Utc::now());
        stats.clone()
    }
}
