use std::sync::mpsc::Sender;
use std::sync::Mutex;

use super::model::{CleanResult, ScanResult};
use super::stats::ModuleStats;

/// Progress notifications emitted while a run executes
#[derive(Debug, Clone)]
pub enum RunEvent {
    ModuleStarted { module: String },
    ItemScanned { module: String, item: ScanResult },
    ItemCleaned { module: String, result: CleanResult },
    ModuleFinished { module: String, stats: ModuleStats },
    ModuleFailed { module: String, reason: String },
}

impl RunEvent {
    pub fn module(&self) -> &str {
        match self {
            RunEvent::ModuleStarted { module }
            | RunEvent::ItemScanned { module, .. }
            | RunEvent::ItemCleaned { module, .. }
            | RunEvent::ModuleFinished { module, .. }
            | RunEvent::ModuleFailed { module, .. } => module,
        }
    }
}

/// Receiver of run progress. Called from worker threads in parallel runs.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &RunEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: &RunEvent) {}
}

impl<F> EventSink for F
where
    F: Fn(&RunEvent) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent) {
        self(event)
    }
}

/// Forwards clones over a channel. A dropped receiver is ignored.
pub struct ChannelSink {
    tx: Mutex<Sender<RunEvent>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<RunEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: &RunEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event.clone());
        }
    }
}
