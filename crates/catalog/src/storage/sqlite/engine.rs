//! SQLite storage engine implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_rusqlite::Connection;

use catalog_core::catalog::{EntityId, TABLES};
use catalog_core::query::Query;
use catalog_core::storage::{StorageEngine, StorageError, StorageResult, StorageTransaction};

use super::conversions::{encode_document, format_timestamp, parse_document};
use super::error::map_tokio_rusqlite_error;
use super::schema::{self, Statement};
use crate::storage::{check_table, with_id};

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

/// Runs a SELECT returning one `data` column per row.
async fn query_documents(conn: &Connection, statement: Statement) -> StorageResult<Vec<Value>> {
    let raw: Vec<String> = conn
        .call(move |conn| {
            let mut stmt = conn.prepare(&statement.sql).map_err(wrap_err)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(statement.params.iter()), |row| {
                    row.get::<_, String>(0)
                })
                .map_err(wrap_err)?;

            let mut documents = Vec::new();
            for row in rows {
                documents.push(row.map_err(wrap_err)?);
            }
            Ok(documents)
        })
        .await
        .map_err(map_tokio_rusqlite_error)?;

    raw.iter().map(|data| parse_document(data)).collect()
}

async fn fetch_document(conn: &Connection, table: &str, id: EntityId) -> StorageResult<Option<Value>> {
    check_table(table)?;
    let statement = Statement {
        sql: schema::select_by_id(table),
        params: vec![rusqlite::types::Value::Integer(id)],
    };
    Ok(query_documents(conn, statement).await?.into_iter().next())
}

async fn select_documents(conn: &Connection, table: &str, query: &Query) -> StorageResult<Vec<Value>> {
    check_table(table)?;
    query_documents(conn, schema::select_statement(table, query)?).await
}

async fn count_rows(conn: &Connection, table: &str, query: &Query) -> StorageResult<u64> {
    check_table(table)?;
    let statement = schema::count_statement(table, query)?;
    let count: i64 = conn
        .call(move |conn| {
            conn.query_row(
                &statement.sql,
                rusqlite::params_from_iter(statement.params.iter()),
                |row| row.get(0),
            )
            .map_err(wrap_err)
        })
        .await
        .map_err(map_tokio_rusqlite_error)?;
    Ok(u64::try_from(count).unwrap_or_default())
}

/// Runs a write statement and reports whether it touched a row.
async fn execute(conn: &Connection, sql: String, params: Vec<rusqlite::types::Value>) -> StorageResult<bool> {
    let changed = conn
        .call(move |conn| {
            conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
                .map_err(wrap_err)
        })
        .await
        .map_err(map_tokio_rusqlite_error)?;
    Ok(changed > 0)
}

async fn execute_batch(conn: &Connection, sql: &'static str) -> StorageResult<()> {
    conn.call(move |conn| conn.execute_batch(sql).map_err(wrap_err))
        .await
        .map_err(map_tokio_rusqlite_error)
}

/// SQLite-backed storage engine.
///
/// Uses one connection. Writers are serialized by a lock held from
/// `BEGIN IMMEDIATE` to `COMMIT`/`ROLLBACK`; reads outside a transaction take
/// the same lock so they never observe uncommitted rows. A task holding an
/// open transaction must therefore read through that transaction.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Connection,
    lock: Arc<Mutex<()>>,
}

impl SqliteStorage {
    /// Opens (or creates) a database file and its schema.
    pub async fn new(path: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        Self::init(conn).await
    }

    /// Opens a private in-memory database. Data is lost when the engine is dropped.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> StorageResult<Self> {
        let mut ddl: String = TABLES.iter().map(|table| schema::create_table(table)).collect();
        ddl.push_str(schema::CREATE_INDEXES);

        conn.call(move |conn| conn.execute_batch(&ddl).map_err(wrap_err))
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(Self {
            conn,
            lock: Arc::new(Mutex::new(())),
        })
    }
}

#[async_trait]
impl StorageEngine for SqliteStorage {
    async fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>> {
        let guard = self.lock.clone().lock_owned().await;

        self.conn
            .call(|conn| {
                // A transaction abandoned outside a runtime is still open.
                if !conn.is_autocommit() {
                    conn.execute_batch(schema::ROLLBACK).map_err(wrap_err)?;
                }
                conn.execute_batch(schema::BEGIN).map_err(wrap_err)
            })
            .await
            .map_err(map_tokio_rusqlite_error)?;

        Ok(Box::new(SqliteTransaction {
            conn: self.conn.clone(),
            guard: Some(guard),
        }))
    }

    async fn fetch(&self, table: &str, id: EntityId) -> StorageResult<Option<Value>> {
        let _guard = self.lock.lock().await;
        fetch_document(&self.conn, table, id).await
    }

    async fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Value>> {
        let _guard = self.lock.lock().await;
        select_documents(&self.conn, table, query).await
    }

    async fn count(&self, table: &str, query: &Query) -> StorageResult<u64> {
        let _guard = self.lock.lock().await;
        count_rows(&self.conn, table, query).await
    }
}

struct SqliteTransaction {
    conn: Connection,
    /// Present until the transaction is finished.
    guard: Option<OwnedMutexGuard<()>>,
}

impl SqliteTransaction {
    async fn finish(mut self: Box<Self>, sql: &'static str) -> StorageResult<()> {
        let result = execute_batch(&self.conn, sql).await;
        if result.is_err() && sql == schema::COMMIT {
            if let Err(err) = execute_batch(&self.conn, schema::ROLLBACK).await {
                tracing::warn!(error = %err, "Rollback after failed commit failed");
            }
        }
        self.guard.take();
        result
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let conn = self.conn.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _guard = guard;
                if let Err(err) = execute_batch(&conn, schema::ROLLBACK).await {
                    tracing::warn!(error = %err, "Failed to roll back abandoned transaction");
                }
            });
        }
    }
}

#[async_trait]
impl StorageTransaction for SqliteTransaction {
    async fn fetch(&mut self, table: &str, id: EntityId) -> StorageResult<Option<Value>> {
        fetch_document(&self.conn, table, id).await
    }

    async fn select(&mut self, table: &str, query: &Query) -> StorageResult<Vec<Value>> {
        select_documents(&self.conn, table, query).await
    }

    async fn count(&mut self, table: &str, query: &Query) -> StorageResult<u64> {
        count_rows(&self.conn, table, query).await
    }

    async fn insert(&mut self, table: &str, row: Value) -> StorageResult<EntityId> {
        check_table(table)?;
        let data = encode_document(&with_id(row, 0)?)?;
        let insert = schema::insert(table);
        let stamp = schema::stamp_id(table);

        self.conn
            .call(move |conn| {
                conn.execute(&insert, [&data]).map_err(wrap_err)?;
                let id = conn.last_insert_rowid();
                conn.execute(&stamp, [id]).map_err(wrap_err)?;
                Ok(id)
            })
            .await
            .map_err(map_tokio_rusqlite_error)
    }

    async fn update(&mut self, table: &str, id: EntityId, row: Value) -> StorageResult<bool> {
        check_table(table)?;
        let data = encode_document(&with_id(row, id)?)?;
        execute(
            &self.conn,
            schema::update(table),
            vec![data.into(), id.into()],
        )
        .await
    }

    async fn soft_delete(
        &mut self,
        table: &str,
        id: EntityId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        check_table(table)?;
        let at = format_timestamp(&at)?;
        execute(
            &self.conn,
            schema::soft_delete(table),
            vec![at.into(), id.into()],
        )
        .await
    }

    async fn restore(&mut self, table: &str, id: EntityId) -> StorageResult<bool> {
        check_table(table)?;
        execute(&self.conn, schema::restore(table), vec![id.into()]).await
    }

    async fn hard_delete(&mut self, table: &str, id: EntityId) -> StorageResult<bool> {
        check_table(table)?;
        execute(&self.conn, schema::delete(table), vec![id.into()]).await
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.finish(schema::COMMIT).await
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.finish(schema::ROLLBACK).await
    }
}
