//! In-memory repository doubles for tests and simulation runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use leadflow_core::domain::decision::{InputId, ReconciliationDecision};

use super::{DecisionRepository, MessageRepository, RepositoryError, StoredMessage};

#[derive(Default)]
pub struct InMemoryDecisionRepository {
    records: Mutex<HashMap<String, ReconciliationDecision>>,
}

impl InMemoryDecisionRepository {
    fn with_records<R>(&self, f: impl FnOnce(&mut HashMap<String, ReconciliationDecision>) -> R) -> R {
        match self.records.lock() {
            Ok(mut records) => f(&mut records),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn upsert(&self, decision: &ReconciliationDecision) -> Result<(), RepositoryError> {
        self.with_records(|records| {
            records.insert(decision.input_id.0.clone(), decision.clone());
        });
        Ok(())
    }

    async fn find_by_input_id(
        &self,
        input_id: &InputId,
    ) -> Result<Option<ReconciliationDecision>, RepositoryError> {
        Ok(self.with_records(|records| records.get(&input_id.0).cloned()))
    }

    async fn list_recent(
        &self,
        limit: i64,
    ) -> Result<Vec<ReconciliationDecision>, RepositoryError> {
        let mut records = self.with_records(|records| records.values().cloned().collect::<Vec<_>>());
        records.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: Mutex<Vec<StoredMessage>>,
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: &StoredMessage) -> Result<(), RepositoryError> {
        let mut messages = match self.messages.lock() {
            Ok(messages) => messages,
            Err(poisoned) => poisoned.into_inner(),
        };
        messages.retain(|existing| existing.id != message.id);
        messages.push(message.clone());
        Ok(())
    }

    async fn list_for_sender(
        &self,
        sender_number: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let messages = match self.messages.lock() {
            Ok(messages) => messages,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut matching: Vec<StoredMessage> = messages
            .iter()
            .filter(|message| message.sender_number == sender_number)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}
