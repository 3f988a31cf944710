//! # Execution Module
//!
//! Turns scored opportunities into settlement transactions, one at a time.

/// Dispatch decision and single-flight submission
pub mod dispatcher;
/// Settlement contract boundary
pub mod settlement;

pub use dispatcher::{
    DispatcherConfig, ExecutionDispatcher, ExecutionReport, Opportunity, OpportunityKind, Outcome,
    SkipReason,
};
pub use settlement::{ChainSettlement, Confirmation, GasConfig, Settlement};
