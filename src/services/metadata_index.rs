//! src/services/metadata_index.rs
//!
//! MetadataIndex — the `recordings` catalog in SQLite. Records are appended
//! once and never updated; listing is newest-first.

use crate::{
    models::{
        content_address::ContentAddress,
        record::{NewRecord, Record},
    },
    services::error::{StorageError, StorageResult},
};
use futures::{Stream, TryStreamExt};
use sqlx::SqlitePool;
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

/// Embedded schema, applied statement by statement. Every statement is
/// `IF NOT EXISTS`, so re-running it is harmless.
const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct MetadataIndex {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl MetadataIndex {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create the `recordings` table and its indexes if absent.
    pub async fn init_schema(&self) -> StorageResult<()> {
        let statements = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty());

        for stmt in statements {
            debug!("Executing schema SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Append one record and return it with its assigned id.
    pub async fn insert(&self, new: NewRecord) -> StorageResult<Record> {
        if new.original_name.trim().is_empty() {
            return Err(StorageError::ConstraintViolation(
                "original_name is required".into(),
            ));
        }
        if new.size_bytes < 0 {
            return Err(StorageError::ConstraintViolation(format!(
                "size_bytes must be non-negative, got {}",
                new.size_bytes
            )));
        }

        sqlx::query_as::<_, Record>(
            r#"
            INSERT INTO recordings (content_address, original_name, size_bytes, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, content_address, original_name, size_bytes, created_at
            "#,
        )
        .bind(&new.content_address)
        .bind(&new.original_name)
        .bind(new.size_bytes)
        .bind(new.created_at)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_constraint_violation(&err) {
                StorageError::ConstraintViolation(err.to_string())
            } else {
                StorageError::Sqlx(err)
            }
        })
    }

    /// Lazily stream every record, newest first.
    ///
    /// Each call runs a fresh query; nothing is remembered between calls.
    pub fn stream_all(&self) -> impl Stream<Item = StorageResult<Record>> + Send + '_ {
        sqlx::query_as::<_, Record>(
            "SELECT id, content_address, original_name, size_bytes, created_at
             FROM recordings
             ORDER BY created_at DESC, id DESC",
        )
        .fetch(&*self.db)
        .map_err(StorageError::from)
    }

    pub async fn list_all(&self) -> StorageResult<Vec<Record>> {
        self.stream_all().try_collect().await
    }

    pub async fn get_by_id(&self, id: i64) -> StorageResult<Record> {
        sqlx::query_as::<_, Record>(
            "SELECT id, content_address, original_name, size_bytes, created_at
             FROM recordings WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StorageError::RecordNotFound(id))
    }

    /// Every blob address at least one record points at.
    pub async fn referenced_addresses(&self) -> StorageResult<HashSet<ContentAddress>> {
        let addresses = sqlx::query_scalar::<_, ContentAddress>(
            "SELECT DISTINCT content_address FROM recordings",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(addresses.into_iter().collect())
    }

    /// Lightweight connectivity check (`SELECT 1`).
    pub async fn ping(&self) -> StorageResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StorageError::Sqlx(sqlx::Error::Protocol(format!(
                "unexpected result: {}",
                one
            ))));
        }
        Ok(())
    }
}

/// Return true if the SQLx error is a NOT NULL / CHECK / UNIQUE failure.
fn is_constraint_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("constraint")
    )
}
