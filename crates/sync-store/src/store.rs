//! [`PostgresSyncStateStore`]: the production [`SyncStateStore`] implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use vault_sync_core::{StoreError, SyncStateStore, SyncStatus, SyncedSecretRecord};

pub struct PostgresSyncStateStore {
    pool: PgPool,
}

impl PostgresSyncStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct Row {
    secret_backend: String,
    secret_path: String,
    destination_cluster: String,
    source_version: i64,
    destination_version: Option<i64>,
    last_sync_attempt: chrono::DateTime<chrono::Utc>,
    last_sync_success: Option<chrono::DateTime<chrono::Utc>>,
    status: String,
    error_message: Option<String>,
}

impl TryFrom<Row> for SyncedSecretRecord {
    type Error = StoreError;

    fn try_from(row: Row) -> Result<Self, StoreError> {
        let status: SyncStatus = row
            .status
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        Ok(SyncedSecretRecord {
            secret_backend: row.secret_backend,
            secret_path: row.secret_path,
            destination_cluster: row.destination_cluster,
            source_version: row.source_version,
            destination_version: row.destination_version,
            last_sync_attempt: row.last_sync_attempt,
            last_sync_success: row.last_sync_success,
            status,
            error_message: row.error_message,
        })
    }
}

#[async_trait]
impl SyncStateStore for PostgresSyncStateStore {
    async fn get(
        &self,
        backend: &str,
        path: &str,
        destination: &str,
    ) -> Result<Option<SyncedSecretRecord>, StoreError> {
        let row = sqlx::query_as!(
            Row,
            r#"
            SELECT
                secret_backend,
                secret_path,
                destination_cluster,
                source_version,
                destination_version,
                last_sync_attempt,
                last_sync_success,
                status,
                error_message
            FROM synced_secrets
            WHERE secret_backend = $1 AND secret_path = $2 AND destination_cluster = $3
            "#,
            backend,
            path,
            destination,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        row.map(SyncedSecretRecord::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<SyncedSecretRecord>, StoreError> {
        let rows = sqlx::query_as!(
            Row,
            r#"
            SELECT
                secret_backend,
                secret_path,
                destination_cluster,
                source_version,
                destination_version,
                last_sync_attempt,
                last_sync_success,
                status,
                error_message
            FROM synced_secrets
            ORDER BY secret_backend, secret_path, destination_cluster
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.into_iter().map(SyncedSecretRecord::try_from).collect()
    }

    async fn upsert(&self, record: &SyncedSecretRecord) -> Result<(), StoreError> {
        sqlx::query!(
            r#"
            INSERT INTO synced_secrets (
                secret_backend, secret_path, destination_cluster,
                source_version, destination_version,
                last_sync_attempt, last_sync_success, status, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (secret_backend, secret_path, destination_cluster)
            DO UPDATE SET
                source_version = EXCLUDED.source_version,
                destination_version = EXCLUDED.destination_version,
                last_sync_attempt = EXCLUDED.last_sync_attempt,
                last_sync_success = EXCLUDED.last_sync_success,
                status = EXCLUDED.status,
                error_message = EXCLUDED.error_message
            "#,
            record.secret_backend,
            record.secret_path,
            record.destination_cluster,
            record.source_version,
            record.destination_version,
            record.last_sync_attempt,
            record.last_sync_success,
            record.status.to_string(),
            record.error_message,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(
        &self,
        backend: &str,
        path: &str,
        destination: &str,
    ) -> Result<(), StoreError> {
        sqlx::query!(
            r#"
            DELETE FROM synced_secrets
            WHERE secret_backend = $1 AND secret_path = $2 AND destination_cluster = $3
            "#,
            backend,
            path,
            destination,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}
