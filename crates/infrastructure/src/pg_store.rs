use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{ChatMessage, DisplayName, MessageBody, MessageId, RepositoryError, Timestamp};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use application::MessageStore;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    username: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let username =
            DisplayName::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let body = MessageBody::parse(value.body).map_err(|err| invalid_data(err.to_string()))?;

        Ok(ChatMessage::new(
            MessageId::new(value.id),
            username,
            body,
            value.created_at,
        ))
    }
}

/// PostgreSQL 消息存储
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(
        &self,
        username: DisplayName,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Result<ChatMessage, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (username, body, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, username, body, created_at
            "#,
        )
        .bind(username.as_str())
        .bind(body.as_str())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ChatMessage::try_from(record)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, username, body, created_at
            FROM (
                SELECT id, username, body, created_at
                FROM messages
                ORDER BY id DESC
                LIMIT $1
            ) recent
            ORDER BY id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ChatMessage::try_from).collect()
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
