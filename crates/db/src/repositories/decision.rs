use sqlx::Row;

use leadflow_core::domain::decision::{InputId, ReconciliationDecision};

use super::{DecisionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDecisionRepository {
    pool: DbPool,
}

impl SqlDecisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_document(document: &str) -> Result<ReconciliationDecision, RepositoryError> {
    serde_json::from_str(document)
        .map_err(|error| RepositoryError::Decode(format!("decision document: {error}")))
}

#[async_trait::async_trait]
impl DecisionRepository for SqlDecisionRepository {
    async fn upsert(&self, decision: &ReconciliationDecision) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(decision)
            .map_err(|error| RepositoryError::Decode(format!("decision document: {error}")))?;

        sqlx::query(
            "INSERT INTO decision (\n                input_id, action, status_kind, target_id,\n                source_phone, normalized_phone, document, decided_at\n             )\n             VALUES (?, ?, ?, ?, ?, ?, ?, ?)\n             ON CONFLICT(input_id) DO UPDATE SET\n                action = excluded.action,\n                status_kind = excluded.status_kind,\n                target_id = excluded.target_id,\n                source_phone = excluded.source_phone,\n                normalized_phone = excluded.normalized_phone,\n                document = excluded.document,\n                decided_at = excluded.decided_at",
        )
        .bind(&decision.input_id.0)
        .bind(decision.action.as_str())
        .bind(decision.status.kind())
        .bind(decision.target_id.as_ref().map(|id| id.0.as_str()))
        .bind(decision.source_phone.as_deref())
        .bind(decision.normalized_phone.as_ref().map(|phone| phone.as_str()))
        .bind(&document)
        .bind(decision.decided_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_input_id(
        &self,
        input_id: &InputId,
    ) -> Result<Option<ReconciliationDecision>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM decision WHERE input_id = ?")
            .bind(&input_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(decode_document(&row.get::<String, _>("document"))?)),
            None => Ok(None),
        }
    }

    async fn list_recent(
        &self,
        limit: i64,
    ) -> Result<Vec<ReconciliationDecision>, RepositoryError> {
        let rows = sqlx::query("SELECT document FROM decision ORDER BY decided_at DESC LIMIT ?")
            .bind(limit.max(1))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| decode_document(&row.get::<String, _>("document"))).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use leadflow_core::domain::candidate::RecordId;
    use leadflow_core::domain::decision::{
        ExecutionStatus, InputId, ReconcileAction, ReconciliationDecision,
    };

    use super::{DecisionRepository, SqlDecisionRepository};
    use crate::{connect_url, migrations};

    fn decision(input_id: &str, status: ExecutionStatus) -> ReconciliationDecision {
        ReconciliationDecision {
            input_id: InputId(input_id.to_string()),
            action: ReconcileAction::NoCandidatesFound,
            target_id: status.record_id().cloned(),
            candidates: Vec::new(),
            status,
            source_phone: Some("65991234567".to_string()),
            normalized_phone: None,
            decided_at: Utc::now(),
        }
    }

    async fn repository() -> SqlDecisionRepository {
        let pool = connect_url("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlDecisionRepository::new(pool)
    }

    #[tokio::test]
    async fn round_trips_a_decision_document() {
        let repository = repository().await;
        let stored = decision("msg-1", ExecutionStatus::Created(RecordId("00Q1".to_string())));

        repository.upsert(&stored).await.expect("upsert");
        let loaded = repository
            .find_by_input_id(&InputId("msg-1".to_string()))
            .await
            .expect("query")
            .expect("record should exist");

        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn rerun_with_the_same_input_overwrites() {
        let repository = repository().await;

        repository
            .upsert(&decision("msg-1", ExecutionStatus::Failed("first try".to_string())))
            .await
            .expect("first upsert");
        repository
            .upsert(&decision("msg-1", ExecutionStatus::Updated(RecordId("00Q9".to_string()))))
            .await
            .expect("second upsert");

        let loaded = repository
            .find_by_input_id(&InputId("msg-1".to_string()))
            .await
            .expect("query")
            .expect("record should exist");
        assert_eq!(loaded.status, ExecutionStatus::Updated(RecordId("00Q9".to_string())));

        let all = repository.list_recent(10).await.expect("list");
        assert_eq!(all.len(), 1, "overwrite must not duplicate the record");
    }

    #[tokio::test]
    async fn missing_records_are_none() {
        let repository = repository().await;
        let loaded =
            repository.find_by_input_id(&InputId("absent".to_string())).await.expect("query");
        assert!(loaded.is_none());
    }
}
