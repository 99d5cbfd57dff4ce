//! Analysis job lifecycle.
//!
//! ## Components
//!
//! - `AnalysisJob`: the analysis slice of a behavior record
//! - `JobStore`: read-by-id plus status-guarded conditional update
//! - `AnalysisOrchestrator`: idempotency guard, timeout race, bounded retry, conditional commit

pub mod orchestrator;
pub mod store;
pub mod types;

pub use orchestrator::AnalysisOrchestrator;
pub use store::{InMemoryJobStore, JobStore, StoreError};
pub use types::{AnalysisJob, AnalysisOutcome, AnalysisResponse, FailureReason, JobPatch};
