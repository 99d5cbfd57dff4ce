//! `sprout-core` — shared building blocks for the observation analysis subsystem.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the analysis lifecycle status, and the observation a caregiver logs.

pub mod error;
pub mod id;
pub mod observation;
pub mod status;

pub use error::{DomainError, DomainResult};
pub use id::{ChildId, RecordId};
pub use observation::{BehaviorCategory, Observation};
pub use status::{AnalysisStatus, ExpectedStatus};
