//! The sweep engine: driver contract, run control, statistics and the
//! orchestrator that composes them into run modes.

pub mod app_sweep;
pub mod control;
pub mod driver;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod stats;

pub use control::ExecutionController;
pub use driver::{CleanContext, DriverRegistry, ResourceDriver, ScanFilter, ScanStream};
pub use events::{ChannelSink, EventSink, NullSink, RunEvent};
pub use model::{CleanAction, CleanResult, DetailValue, ResourceKind, RunConfig, ScanResult};
pub use orchestrator::{
    ExecutionPolicy, Orchestrator, RestoreReport, Run, RunMode, RunReport, RunState,
};
pub use stats::{CleanStats, ModuleState, ModuleStats, StatsAggregator};
