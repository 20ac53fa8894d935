use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::{MessageRepository, RepositoryError};
use crate::DbPool;

/// One archived gateway delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub sender_number: String,
    pub push_name: Option<String>,
    pub kind: String,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
}

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, RepositoryError> {
    let received_at_raw: String = row.get("received_at");
    let received_at = DateTime::parse_from_rfc3339(&received_at_raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("received_at: {error}")))?;

    Ok(StoredMessage {
        id: row.get("id"),
        sender_number: row.get("sender_number"),
        push_name: row.get("push_name"),
        kind: row.get("kind"),
        body: row.get("body"),
        received_at,
    })
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn append(&self, message: &StoredMessage) -> Result<(), RepositoryError> {
        // Gateways redeliver; replacing by id keeps the archive idempotent.
        sqlx::query(
            "INSERT OR REPLACE INTO inbound_message (\n                id, sender_number, push_name, kind, body, received_at\n             )\n             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.sender_number)
        .bind(message.push_name.as_deref())
        .bind(&message.kind)
        .bind(message.body.as_deref())
        .bind(message.received_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_sender(
        &self,
        sender_number: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, sender_number, push_name, kind, body, received_at\n             FROM inbound_message\n             WHERE sender_number = ?\n             ORDER BY received_at DESC\n             LIMIT ?",
        )
        .bind(sender_number)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}
