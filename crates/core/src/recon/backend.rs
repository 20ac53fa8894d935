//! Capability boundary between the engine and the CRM backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::candidate::{Candidate, RecordId};
use crate::domain::decision::FieldMap;
use crate::phone::NormalizedPhone;

/// Candidate lookup. Implementations must degrade to an empty list when the
/// backend is unreachable or uninitialized; transport problems are logged at
/// the adapter and never raised past this boundary, so the engine always has
/// a well-defined fallback (create new).
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn search_by_name(&self, first: Option<&str>, last: Option<&str>) -> Vec<Candidate>;
    async fn search_by_phone(&self, phone: &NormalizedPhone) -> Vec<Candidate>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    /// The backend refused the write because the record was already converted
    /// into an account/opportunity. Drives the fallback loop.
    #[error("record is converted and cannot be updated: {0}")]
    Converted(String),
    /// Any other rejection, including timeouts. Terminal for the attempt.
    #[error("write rejected: {0}")]
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    pub title: String,
    pub body: String,
}

/// Write side of the CRM boundary.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn create_record(&self, fields: &FieldMap) -> Result<RecordId, WriteError>;
    async fn update_record(&self, id: &RecordId, fields: &FieldMap) -> Result<(), WriteError>;
    async fn attach_note(&self, parent: &RecordId, note: &NotePayload)
        -> Result<RecordId, WriteError>;
}

#[async_trait]
impl<T> CandidateSource for std::sync::Arc<T>
where
    T: CandidateSource + ?Sized,
{
    async fn search_by_name(&self, first: Option<&str>, last: Option<&str>) -> Vec<Candidate> {
        (**self).search_by_name(first, last).await
    }

    async fn search_by_phone(&self, phone: &NormalizedPhone) -> Vec<Candidate> {
        (**self).search_by_phone(phone).await
    }
}

#[async_trait]
impl<T> RecordWriter for std::sync::Arc<T>
where
    T: RecordWriter + ?Sized,
{
    async fn create_record(&self, fields: &FieldMap) -> Result<RecordId, WriteError> {
        (**self).create_record(fields).await
    }

    async fn update_record(&self, id: &RecordId, fields: &FieldMap) -> Result<(), WriteError> {
        (**self).update_record(id, fields).await
    }

    async fn attach_note(
        &self,
        parent: &RecordId,
        note: &NotePayload,
    ) -> Result<RecordId, WriteError> {
        (**self).attach_note(parent, note).await
    }
}
