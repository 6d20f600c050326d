use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::control::ExecutionController;
use super::model::{CleanResult, ResourceKind, RunConfig, ScanResult};
use crate::backup::{BackupEntry, PayloadSink};
use crate::common::errors::{DriverError, EngineError};

/// Lazy, finite, non-restartable stream of discovered items
pub type ScanStream<'a> = Box<dyn Iterator<Item = ScanResult> + 'a>;

/// Lazy stream of per-item outcomes, order-preserving
pub type CleanStream<'a> = Box<dyn Iterator<Item = CleanResult> + 'a>;

/// Which items a scan should yield
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// Every item (scan-only mode without a pattern)
    Everything,
    /// Case-insensitive substring over identifying fields
    Substring(String),
    /// Nothing: destructive sweeps must be explicitly targeted
    Nothing,
}

impl ScanFilter {
    /// Build the filter for one driver call.
    /// `match_all_when_empty` is set for scan-only runs and for drivers
    /// that are not safety-sensitive.
    pub fn from_pattern(pattern: Option<&str>, match_all_when_empty: bool) -> Self {
        match pattern.map(str::trim) {
            Some(p) if !p.is_empty() => ScanFilter::Substring(p.to_lowercase()),
            _ if match_all_when_empty => ScanFilter::Everything,
            _ => ScanFilter::Nothing,
        }
    }

    /// Match against identifying fields (name, location, description)
    pub fn matches(&self, fields: &[&str]) -> bool {
        match self {
            ScanFilter::Everything => true,
            ScanFilter::Nothing => false,
            ScanFilter::Substring(needle) => {
                fields.iter().any(|f| f.to_lowercase().contains(needle.as_str()))
            }
        }
    }

    pub fn matches_item(&self, item: &ScanResult) -> bool {
        self.matches(&[&item.name, &item.location, &item.description])
    }

    pub fn is_nothing(&self) -> bool {
        *self == ScanFilter::Nothing
    }
}

/// Per-call context handed to `clean`
#[derive(Clone, Copy)]
pub struct CleanContext<'a> {
    pub config: &'a RunConfig,
    pub controller: &'a ExecutionController,
}

/// Pluggable scan/clean implementation for one resource kind.
///
/// Drivers only mutate the kind they own, never depend on item ordering,
/// and poll the controller at item boundaries inside `scan`.
pub trait ResourceDriver: Send + Sync {
    /// Unique registry key
    fn name(&self) -> &str;

    fn kind(&self) -> ResourceKind;

    /// When false, an absent pattern matches everything even in
    /// destructive modes.
    fn requires_pattern(&self) -> bool {
        true
    }

    /// Discover items. `Err` means the whole source is unavailable.
    fn scan<'a>(
        &'a self,
        filter: &'a ScanFilter,
        controller: &'a ExecutionController,
    ) -> Result<ScanStream<'a>, DriverError>;

    /// Destroy one item. Must verify absence before reporting success and
    /// report `"already removed"` for an identity that is already gone.
    fn remove(&self, item: &ScanResult) -> CleanResult;

    /// Predict the outcome of `remove` with no side effects
    fn simulate(&self, item: &ScanResult) -> CleanResult {
        CleanResult::simulated(item, format!("would remove {}", item.name))
    }

    /// Deactivate the item without destroying it, for kinds where that is
    /// a real alternative to removal
    fn supports_disable(&self) -> bool {
        false
    }

    /// Same verification rules as `remove`: report success only once the
    /// item is observably inactive.
    fn disable(&self, item: &ScanResult) -> CleanResult {
        CleanResult::failed(item, format!("{} items cannot be disabled", self.kind()))
    }

    /// Stream a snapshot of the item into `out` for write-ahead backup.
    /// `Ok(false)` means there is nothing to keep beyond its identity.
    fn capture(&self, _item: &ScanResult, _out: &mut dyn PayloadSink) -> Result<bool, DriverError> {
        Ok(false)
    }

    fn supports_restore(&self) -> bool {
        false
    }

    /// Re-create an item from its backup entry and verified payload file
    fn restore(&self, _entry: &BackupEntry, _payload: Option<&Path>) -> Result<(), DriverError> {
        Err(DriverError::RestoreUnsupported(self.kind()))
    }

    /// Clean a batch, one result per item, order preserved. Under dry-run
    /// nothing is mutated. Items left when cancellation hits are skipped.
    fn clean<'a>(&'a self, items: Vec<ScanResult>, ctx: CleanContext<'a>) -> CleanStream<'a> {
        let disable = ctx.config.disable && self.supports_disable();
        Box::new(items.into_iter().map(move |item| {
            if !ctx.controller.checkpoint() {
                return CleanResult::skipped(&item, "cancelled");
            }
            match (ctx.config.dry_run, disable) {
                (true, true) => {
                    CleanResult::simulated_disable(&item, format!("would disable {}", item.name))
                }
                (true, false) => self.simulate(&item),
                (false, true) => self.disable(&item),
                (false, false) => self.remove(&item),
            }
        }))
    }
}

/// Explicit driver registry, populated at startup, resolved by name at
/// run time. Iteration follows registration order.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    order: Vec<String>,
    drivers: BTreeMap<String, Arc<dyn ResourceDriver>>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry").field("drivers", &self.order).finish()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn ResourceDriver>) -> Result<(), EngineError> {
        let name = driver.name().to_string();
        if self.drivers.contains_key(&name) {
            return Err(EngineError::DuplicateDriver(name));
        }
        self.order.push(name.clone());
        self.drivers.insert(name, driver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ResourceDriver>> {
        self.drivers.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ResourceDriver>, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownDriver(name.to_string()))
    }

    /// First registered driver owning `kind`
    pub fn for_kind(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceDriver>> {
        self.all().into_iter().find(|d| d.kind() == kind)
    }

    /// All drivers in registration order
    pub fn all(&self) -> Vec<Arc<dyn ResourceDriver>> {
        self.order
            .iter()
            .filter_map(|name| self.drivers.get(name).cloned())
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::CleanAction;
    use std::path::PathBuf;

    struct Fixed {
        name: &'static str,
        items: Vec<&'static str>,
    }

    impl ResourceDriver for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> ResourceKind {
            ResourceKind::Network
        }
        fn scan<'a>(
            &'a self,
            filter: &'a ScanFilter,
            _controller: &'a ExecutionController,
        ) -> Result<ScanStream<'a>, DriverError> {
            Ok(Box::new(
                self.items
                    .iter()
                    .map(|n| ScanResult::new(ResourceKind::Network, *n, *n))
                    .filter(move |i| filter.matches_item(i)),
            ))
        }
        fn remove(&self, item: &ScanResult) -> CleanResult {
            CleanResult::deleted(item, "removed")
        }
    }

    fn config(dry_run: bool) -> RunConfig {
        RunConfig {
            dry_run,
            force: false,
            create_backup: false,
            disable: false,
            backup_directory: PathBuf::from("/tmp"),
            verbose: false,
        }
    }

    #[test]
    fn test_filter_from_pattern() {
        assert_eq!(ScanFilter::from_pattern(None, false), ScanFilter::Nothing);
        assert_eq!(ScanFilter::from_pattern(Some("  "), false), ScanFilter::Nothing);
        assert_eq!(ScanFilter::from_pattern(None, true), ScanFilter::Everything);
        assert_eq!(
            ScanFilter::from_pattern(Some("Acme"), true),
            ScanFilter::Substring("acme".into())
        );
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let filter = ScanFilter::Substring("acme".into());
        assert!(filter.matches(&["ACME Corp"]));
        assert!(filter.matches(&["x", "/opt/AcMe/bin"]));
        assert!(!filter.matches(&["other"]));
        assert!(!ScanFilter::Nothing.matches(&["acme"]));
    }

    #[test]
    fn test_registry_order_and_duplicates() {
        let mut reg = DriverRegistry::new();
        reg.register(Arc::new(Fixed { name: "b", items: vec![] })).unwrap();
        reg.register(Arc::new(Fixed { name: "a", items: vec![] })).unwrap();
        assert_eq!(reg.names(), ["b".to_string(), "a".to_string()]);
        assert!(matches!(
            reg.register(Arc::new(Fixed { name: "a", items: vec![] })),
            Err(EngineError::DuplicateDriver(_))
        ));
        assert!(matches!(reg.resolve("zzz"), Err(EngineError::UnknownDriver(_))));
        assert_eq!(reg.for_kind(ResourceKind::Network).unwrap().name(), "b");
    }

    #[test]
    fn test_default_clean_respects_dry_run_and_cancel() {
        let driver = Fixed { name: "net", items: vec!["a", "b"] };
        let ctl = ExecutionController::new();
        let items: Vec<_> = driver.scan(&ScanFilter::Everything, &ctl).unwrap().collect();

        let cfg = config(true);
        let ctx = CleanContext { config: &cfg, controller: &ctl };
        let results: Vec<_> = driver.clean(items.clone(), ctx).collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.simulated && r.success));

        let cfg = config(false);
        ctl.cancel();
        let ctx = CleanContext { config: &cfg, controller: &ctl };
        let results: Vec<_> = driver.clean(items, ctx).collect();
        assert!(results.iter().all(|r| r.is_skip() && r.message == "cancelled"));
    }

    #[test]
    fn test_disable_falls_back_to_remove_when_unsupported() {
        let driver = Fixed { name: "net", items: vec!["a"] };
        let ctl = ExecutionController::new();
        let items: Vec<_> = driver.scan(&ScanFilter::Everything, &ctl).unwrap().collect();

        let mut cfg = config(false);
        cfg.disable = true;
        let ctx = CleanContext { config: &cfg, controller: &ctl };
        let results: Vec<_> = driver.clean(items, ctx).collect();
        assert_eq!(results[0].action, CleanAction::Delete);
        assert!(results[0].success);
    }

    #[test]
    fn test_restore_unsupported_by_default() {
        let driver = Fixed { name: "net", items: vec![] };
        assert!(!driver.supports_restore());
        let entry = BackupEntry::for_item(
            "net",
            &ScanResult::new(ResourceKind::Network, "a", "a"),
            None,
        );
        assert!(matches!(
            driver.restore(&entry, None),
            Err(DriverError::RestoreUnsupported(ResourceKind::Network))
        ));
    }
}
