//! Contact reconciliation: decide whether a freshly extracted contact should
//! update an existing CRM record or create a new one, and recover through
//! ranked fallbacks when the chosen record is rejected.

pub mod backend;
pub mod engine;
pub mod memory;

pub use backend::{CandidateSource, NotePayload, RecordWriter, WriteError};
pub use engine::{EngineOptions, ReconciliationEngine, ReconciliationInput};
pub use memory::{RecordingCrm, StaticCandidateSource, WriteCall};
