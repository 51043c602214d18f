//! Execution engine — capital simulator, run control and accounting audit.

pub mod audit;
pub mod config;
pub mod control;
pub mod simulator;

pub use audit::{
    audit, AuditCounters, AuditFlags, AuditReport, REPLENISHMENT_HOUR, ZERO_TRADES_NOTE,
};
pub use config::ExecutionConfig;
pub use control::RunControl;
pub use simulator::{run_execution, ExecutionError, ExecutionResult, ExecutionStats, Simulator};
