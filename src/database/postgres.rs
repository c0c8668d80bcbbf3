//! PostgreSQL storage engine
//!
//! All entity families share the `items` table (see `migrations/`). Conditional
//! writes are expressed in SQL (`ON CONFLICT DO NOTHING`, `WHERE version = $n`)
//! and a transaction runs every operation inside one SQL transaction, rolling
//! it back as soon as the collected conditions show any failure.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};

use super::engine::{
    build_page, validate_cursor, validate_transaction, with_deadline, Condition, ConditionFailure,
    FailureReason, IndexEntry, ItemKey, QueryPage, QueryRequest, QueryTarget, StorageEngine,
    StoredItem, WriteOp, DEFAULT_OPERATION_TIMEOUT,
};
use crate::utils::errors::{StorageError, StorageResult};

const SELECT_COLUMNS: &str = "pk, sk, version, body, index_pk, index_sk";

#[derive(Debug, FromRow)]
struct ItemRow {
    pk: String,
    sk: String,
    version: i64,
    body: Json<serde_json::Value>,
    index_pk: Option<String>,
    index_sk: Option<String>,
}

impl From<ItemRow> for StoredItem {
    fn from(row: ItemRow) -> Self {
        let index = match (row.index_pk, row.index_sk) {
            (Some(partition), Some(sort)) => Some(IndexEntry { partition, sort }),
            _ => None,
        };
        StoredItem { key: ItemKey { pk: row.pk, sk: row.sk }, version: row.version, body: row.body.0, index }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresEngine {
    pool: PgPool,
    deadline: Duration,
}

impl PostgresEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, deadline: DEFAULT_OPERATION_TIMEOUT }
    }

    /// Set the per-call deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn fetch_error(&self, operation: &'static str, err: sqlx::Error) -> StorageError {
        match err {
            sqlx::Error::PoolTimedOut => StorageError::Timeout { operation, after: self.deadline },
            other => StorageError::FetchFailed(Box::new(other)),
        }
    }

    fn write_error(&self, operation: &'static str, err: sqlx::Error) -> StorageError {
        match err {
            sqlx::Error::PoolTimedOut => StorageError::Timeout { operation, after: self.deadline },
            other => StorageError::WriteFailed(Box::new(other)),
        }
    }
}

fn index_parts(item: &StoredItem) -> (Option<&str>, Option<&str>) {
    match &item.index {
        Some(index) => (Some(index.partition.as_str()), Some(index.sort.as_str())),
        None => (None, None),
    }
}

/// Insert unless the key is taken; `false` when a row already exists
async fn insert_row(conn: &mut PgConnection, item: &StoredItem) -> Result<bool, sqlx::Error> {
    let (index_pk, index_sk) = index_parts(item);
    let result = sqlx::query(
        r#"
        INSERT INTO items (pk, sk, version, body, index_pk, index_sk, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        ON CONFLICT (pk, sk) DO NOTHING
        "#,
    )
    .bind(&item.key.pk)
    .bind(&item.key.sk)
    .bind(item.version)
    .bind(Json(&item.body))
    .bind(index_pk)
    .bind(index_sk)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn upsert_row(conn: &mut PgConnection, item: &StoredItem) -> Result<(), sqlx::Error> {
    let (index_pk, index_sk) = index_parts(item);
    sqlx::query(
        r#"
        INSERT INTO items (pk, sk, version, body, index_pk, index_sk, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        ON CONFLICT (pk, sk) DO UPDATE
        SET version = EXCLUDED.version,
            body = EXCLUDED.body,
            index_pk = EXCLUDED.index_pk,
            index_sk = EXCLUDED.index_sk,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&item.key.pk)
    .bind(&item.key.sk)
    .bind(item.version)
    .bind(Json(&item.body))
    .bind(index_pk)
    .bind(index_sk)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Update an existing row, optionally only at `expected` version
async fn update_row(conn: &mut PgConnection, item: &StoredItem, expected: Option<i64>) -> Result<bool, sqlx::Error> {
    let (index_pk, index_sk) = index_parts(item);
    let result = sqlx::query(
        r#"
        UPDATE items
        SET version = $3,
            body = $4,
            index_pk = $5,
            index_sk = $6,
            updated_at = NOW()
        WHERE pk = $1 AND sk = $2 AND ($7::BIGINT IS NULL OR version = $7)
        "#,
    )
    .bind(&item.key.pk)
    .bind(&item.key.sk)
    .bind(item.version)
    .bind(Json(&item.body))
    .bind(index_pk)
    .bind(index_sk)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn delete_row(conn: &mut PgConnection, key: &ItemKey, expected: Option<i64>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM items WHERE pk = $1 AND sk = $2 AND ($3::BIGINT IS NULL OR version = $3)")
        .bind(&key.pk)
        .bind(&key.sk)
        .bind(expected)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

async fn current_version(conn: &mut PgConnection, key: &ItemKey) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT version FROM items WHERE pk = $1 AND sk = $2")
        .bind(&key.pk)
        .bind(&key.sk)
        .fetch_optional(&mut *conn)
        .await
}

async fn version_failure(conn: &mut PgConnection, key: &ItemKey, expected: i64) -> Result<FailureReason, sqlx::Error> {
    Ok(match current_version(conn, key).await? {
        None => FailureReason::DoesNotExist,
        Some(actual) => FailureReason::VersionMismatch { expected, actual },
    })
}

/// Apply one operation; `Some(reason)` when its condition did not hold
async fn apply_op(conn: &mut PgConnection, op: &WriteOp) -> Result<Option<FailureReason>, sqlx::Error> {
    match op {
        WriteOp::Put { item, condition } => match *condition {
            Condition::None => {
                upsert_row(conn, item).await?;
                Ok(None)
            }
            Condition::NotExists => {
                let inserted = insert_row(conn, item).await?;
                Ok((!inserted).then_some(FailureReason::AlreadyExists))
            }
            Condition::Exists => {
                let updated = update_row(conn, item, None).await?;
                Ok((!updated).then_some(FailureReason::DoesNotExist))
            }
            Condition::VersionEquals(expected) => {
                if update_row(conn, item, Some(expected)).await? {
                    Ok(None)
                } else {
                    Ok(Some(version_failure(conn, &item.key, expected).await?))
                }
            }
        },
        WriteOp::Delete { key, condition } => match *condition {
            Condition::None => {
                delete_row(conn, key, None).await?;
                Ok(None)
            }
            Condition::NotExists => {
                let exists = current_version(conn, key).await?.is_some();
                Ok(exists.then_some(FailureReason::AlreadyExists))
            }
            Condition::Exists => {
                let deleted = delete_row(conn, key, None).await?;
                Ok((!deleted).then_some(FailureReason::DoesNotExist))
            }
            Condition::VersionEquals(expected) => {
                if delete_row(conn, key, Some(expected)).await? {
                    Ok(None)
                } else {
                    Ok(Some(version_failure(conn, key, expected).await?))
                }
            }
        },
    }
}

#[async_trait]
impl StorageEngine for PostgresEngine {
    async fn get(&self, key: &ItemKey) -> StorageResult<StoredItem> {
        with_deadline("get", self.deadline, async {
            let row = sqlx::query_as::<_, ItemRow>(&format!(
                "SELECT {SELECT_COLUMNS} FROM items WHERE pk = $1 AND sk = $2"
            ))
            .bind(&key.pk)
            .bind(&key.sk)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.fetch_error("get", e))?;

            row.map(StoredItem::from)
                .ok_or_else(|| StorageError::NotFound { key: key.clone() })
        })
        .await
    }

    async fn put_if_absent(&self, item: StoredItem) -> StorageResult<()> {
        with_deadline("put_if_absent", self.deadline, async {
            let mut conn = self.pool.acquire().await.map_err(|e| self.write_error("put_if_absent", e))?;
            let inserted = insert_row(&mut conn, &item)
                .await
                .map_err(|e| self.write_error("put_if_absent", e))?;

            if inserted {
                Ok(())
            } else {
                Err(StorageError::AlreadyExists { key: item.key })
            }
        })
        .await
    }

    async fn put_if_version(&self, item: StoredItem, expected_prior: i64) -> StorageResult<()> {
        with_deadline("put_if_version", self.deadline, async {
            let mut conn = self.pool.acquire().await.map_err(|e| self.write_error("put_if_version", e))?;
            if update_row(&mut conn, &item, Some(expected_prior))
                .await
                .map_err(|e| self.write_error("put_if_version", e))?
            {
                return Ok(());
            }

            let failure = version_failure(&mut conn, &item.key, expected_prior)
                .await
                .map_err(|e| self.fetch_error("put_if_version", e))?;
            Err(match failure {
                FailureReason::VersionMismatch { expected, actual } => {
                    StorageError::VersionMismatch { key: item.key, expected, actual }
                }
                _ => StorageError::DoesNotExist { key: item.key },
            })
        })
        .await
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        validate_transaction(&ops)?;

        with_deadline("transact_write", self.deadline, async {
            let mut tx = self.pool.begin().await.map_err(|e| self.write_error("transact_write", e))?;

            let mut failures = Vec::new();
            for (index, op) in ops.iter().enumerate() {
                let outcome = apply_op(&mut tx, op)
                    .await
                    .map_err(|e| self.write_error("transact_write", e))?;
                if let Some(reason) = outcome {
                    failures.push(ConditionFailure { index, key: op.key().clone(), reason });
                }
            }

            if failures.is_empty() {
                tx.commit().await.map_err(|e| self.write_error("transact_write", e))?;
                Ok(())
            } else {
                tx.rollback().await.map_err(|e| self.write_error("transact_write", e))?;
                Err(StorageError::TransactionCanceled { failures })
            }
        })
        .await
    }

    async fn query(&self, request: QueryRequest) -> StorageResult<QueryPage> {
        if let Some(cursor) = &request.cursor {
            validate_cursor(&request.target, cursor)?;
        }
        let fetch_limit = (request.limit + 1) as i64;

        with_deadline("query", self.deadline, async {
            let cursor = request.cursor.as_ref();
            let rows = match &request.target {
                QueryTarget::Partition { pk, sk_prefix } => {
                    sqlx::query_as::<_, ItemRow>(&format!(
                        r#"
                        SELECT {SELECT_COLUMNS} FROM items
                        WHERE pk = $1
                          AND starts_with(sk, $2)
                          AND ($3::TEXT IS NULL OR sk > $3)
                        ORDER BY sk ASC
                        LIMIT $4
                        "#
                    ))
                    .bind(pk)
                    .bind(sk_prefix)
                    .bind(cursor.and_then(|c| c.sk()))
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await
                }
                QueryTarget::Index { partition } => {
                    sqlx::query_as::<_, ItemRow>(&format!(
                        r#"
                        SELECT {SELECT_COLUMNS} FROM items
                        WHERE index_pk = $1
                          AND ($2::TEXT IS NULL OR (index_sk, pk, sk) > ($2::TEXT, $3::TEXT, $4::TEXT))
                        ORDER BY index_sk ASC, pk ASC, sk ASC
                        LIMIT $5
                        "#
                    ))
                    .bind(partition)
                    .bind(cursor.and_then(|c| c.index_sk()))
                    .bind(cursor.and_then(|c| c.pk()))
                    .bind(cursor.and_then(|c| c.sk()))
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await
                }
            }
            .map_err(|e| self.fetch_error("query", e))?;

            let fetched = rows.into_iter().map(StoredItem::from).collect();
            Ok(build_page(&request.target, fetched, request.limit))
        })
        .await
    }
}
