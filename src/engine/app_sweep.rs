use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::control::ExecutionController;
use super::driver::{CleanContext, CleanStream, ResourceDriver, ScanFilter, ScanStream};
use super::model::{CleanResult, ResourceKind, ScanResult};
use crate::backup::{BackupEntry, PayloadSink};
use crate::common::errors::DriverError;

/// Identity patterns derived from a single application name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppProfile {
    pub name: String,
    /// Lowercased variants: as typed, compact, dashed, underscored
    pub variants: Vec<String>,
}

impl AppProfile {
    /// `"Acme Studio"` → `acme studio`, `acmestudio`, `acme-studio`, `acme_studio`
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let lower = name.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_' || c == '.')
            .filter(|w| !w.is_empty())
            .collect();

        let mut variants = vec![lower.clone(), words.concat(), words.join("-"), words.join("_")];
        let mut seen = HashSet::new();
        variants.retain(|v| !v.is_empty() && seen.insert(v.clone()));

        Some(Self {
            name: name.to_string(),
            variants,
        })
    }

    /// Patterns used against one resource kind. Folder and config entries
    /// may carry spaces; service-like identifiers never do.
    pub fn patterns_for(&self, kind: ResourceKind) -> Vec<String> {
        match kind {
            ResourceKind::Filesystem | ResourceKind::ConfigEntries => self.variants.clone(),
            _ => self
                .variants
                .iter()
                .filter(|v| !v.contains(char::is_whitespace))
                .cloned()
                .collect(),
        }
    }
}

/// A registered driver re-targeted at a fixed set of patterns for one run.
/// Keeps the inner driver's name so backups replay through it.
pub struct PatternBoundDriver {
    inner: Arc<dyn ResourceDriver>,
    filters: Vec<ScanFilter>,
}

impl PatternBoundDriver {
    pub fn new(inner: Arc<dyn ResourceDriver>, patterns: &[String]) -> Self {
        let filters = patterns
            .iter()
            .map(|p| ScanFilter::from_pattern(Some(p), false))
            .filter(|f| !f.is_nothing())
            .collect();
        Self { inner, filters }
    }

    pub fn for_app(inner: Arc<dyn ResourceDriver>, profile: &AppProfile) -> Self {
        let patterns = profile.patterns_for(inner.kind());
        Self::new(inner, &patterns)
    }
}

impl ResourceDriver for PatternBoundDriver {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    fn requires_pattern(&self) -> bool {
        false
    }

    /// Union of the inner driver's scans over every bound pattern, deduplicated
    /// by location. The caller's filter further narrows the union.
    fn scan<'a>(
        &'a self,
        filter: &'a ScanFilter,
        controller: &'a ExecutionController,
    ) -> Result<ScanStream<'a>, DriverError> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for bound in &self.filters {
            if !controller.checkpoint() {
                break;
            }
            for item in self.inner.scan(bound, controller)? {
                if filter.matches_item(&item) && seen.insert(item.location.clone()) {
                    items.push(item);
                }
            }
        }
        Ok(Box::new(items.into_iter()))
    }

    fn remove(&self, item: &ScanResult) -> CleanResult {
        self.inner.remove(item)
    }

    fn simulate(&self, item: &ScanResult) -> CleanResult {
        self.inner.simulate(item)
    }

    fn supports_disable(&self) -> bool {
        self.inner.supports_disable()
    }

    fn disable(&self, item: &ScanResult) -> CleanResult {
        self.inner.disable(item)
    }

    fn capture(&self, item: &ScanResult, out: &mut dyn PayloadSink) -> Result<bool, DriverError> {
        self.inner.capture(item, out)
    }

    fn supports_restore(&self) -> bool {
        self.inner.supports_restore()
    }

    fn restore(&self, entry: &BackupEntry, payload: Option<&Path>) -> Result<(), DriverError> {
        self.inner.restore(entry, payload)
    }

    fn clean<'a>(&'a self, items: Vec<ScanResult>, ctx: CleanContext<'a>) -> CleanStream<'a> {
        self.inner.clean(items, ctx)
    }
}
