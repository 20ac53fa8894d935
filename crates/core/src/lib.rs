pub mod config;
pub mod domain;
pub mod phone;
pub mod ranking;
pub mod recon;
pub mod sanitize;

pub use config::{AppConfig, ConfigError, ConfigOverrides, CreatePolicy, LoadOptions};
pub use domain::candidate::{Candidate, CandidateKind, RankedCandidate, RecordId};
pub use domain::contact::ExtractedContact;
pub use domain::decision::{
    ExecutionStatus, FieldMap, InputId, ReconcileAction, ReconciliationDecision,
};
pub use phone::{NormalizedPhone, PhoneNormalizer, Region};
pub use ranking::{CandidateRanker, SimilarityScorer, TokenOverlap};
pub use recon::backend::{CandidateSource, NotePayload, RecordWriter, WriteError};
pub use recon::engine::{EngineOptions, ReconciliationEngine, ReconciliationInput};
pub use sanitize::FieldSanitizer;
