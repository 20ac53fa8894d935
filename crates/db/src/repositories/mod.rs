use async_trait::async_trait;
use thiserror::Error;

use leadflow_core::domain::decision::{InputId, ReconciliationDecision};

pub mod decision;
pub mod memory;
pub mod message;

pub use decision::SqlDecisionRepository;
pub use memory::{InMemoryDecisionRepository, InMemoryMessageRepository};
pub use message::{SqlMessageRepository, StoredMessage};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable store of reconciliation decision records, keyed by input id.
/// Re-running the same input overwrites the previous record.
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn upsert(&self, decision: &ReconciliationDecision) -> Result<(), RepositoryError>;

    async fn find_by_input_id(
        &self,
        input_id: &InputId,
    ) -> Result<Option<ReconciliationDecision>, RepositoryError>;

    async fn list_recent(&self, limit: i64)
        -> Result<Vec<ReconciliationDecision>, RepositoryError>;
}

/// Archive of every inbound gateway delivery, regardless of sender.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: &StoredMessage) -> Result<(), RepositoryError>;

    async fn list_for_sender(
        &self,
        sender_number: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;
}
