//! Persistence for state items: one trait, a PostgreSQL store and an in-memory store.

use crate::error::AppError;
use crate::sql::{qualified_table, quoted};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// A persisted item with an integral state and a free-form JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateItem {
    pub id: i64,
    pub state: i64,
    pub payload: Map<String, Value>,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
}

/// Read-modify-write step run under the store's lock; an error leaves the item untouched.
pub type MutateFn<'a> = Box<dyn FnOnce(&mut StateItem) -> Result<(), AppError> + Send + 'a>;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_one(&self, id: i64) -> Result<Option<StateItem>, AppError>;
    async fn get_all(&self, limit: u32, offset: u32) -> Result<Vec<StateItem>, AppError>;
    async fn get_all_in_state(&self, state: i64) -> Result<Vec<StateItem>, AppError>;
    async fn create(&self, state: i64, payload: Map<String, Value>) -> Result<StateItem, AppError>;
    /// Merges `payload` into the stored payload; None when the item does not exist.
    async fn update(&self, id: i64, payload: Map<String, Value>) -> Result<Option<StateItem>, AppError>;
    async fn delete_one(&self, id: i64) -> Result<Option<StateItem>, AppError>;
    async fn delete_all(&self) -> Result<u64, AppError>;
    async fn delete_all_in_state(&self, state: i64) -> Result<u64, AppError>;
    /// Loads `id` with a lock held until `mutate` finishes, then saves the result atomically.
    async fn transition<'a>(&self, id: i64, mutate: MutateFn<'a>) -> Result<StateItem, AppError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    items: BTreeMap<i64, StateItem>,
}

/// In-process store; the mutex is held across each whole read-modify-write.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_one(&self, id: i64) -> Result<Option<StateItem>, AppError> {
        Ok(self.inner.lock().await.items.get(&id).cloned())
    }

    async fn get_all(&self, limit: u32, offset: u32) -> Result<Vec<StateItem>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.items.values().skip(offset as usize).take(limit as usize).cloned().collect())
    }

    async fn get_all_in_state(&self, state: i64) -> Result<Vec<StateItem>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.items.values().filter(|i| i.state == state).cloned().collect())
    }

    async fn create(&self, state: i64, payload: Map<String, Value>) -> Result<StateItem, AppError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let now = Utc::now();
        let item = StateItem {
            id: inner.next_id,
            state,
            payload,
            created_time: now,
            updated_time: now,
        };
        inner.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update(&self, id: i64, payload: Map<String, Value>) -> Result<Option<StateItem>, AppError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.items.get_mut(&id).map(|item| {
            item.payload.extend(payload);
            item.updated_time = Utc::now();
            item.clone()
        }))
    }

    async fn delete_one(&self, id: i64) -> Result<Option<StateItem>, AppError> {
        Ok(self.inner.lock().await.items.remove(&id))
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().await;
        let n = inner.items.len() as u64;
        inner.items.clear();
        Ok(n)
    }

    async fn delete_all_in_state(&self, state: i64) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().await;
        let before = inner.items.len();
        inner.items.retain(|_, i| i.state != state);
        Ok((before - inner.items.len()) as u64)
    }

    async fn transition<'a>(&self, id: i64, mutate: MutateFn<'a>) -> Result<StateItem, AppError> {
        let mut inner = self.inner.lock().await;
        let mut item = inner
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("item {}", id)))?;
        mutate(&mut item)?;
        inner.items.insert(id, item.clone());
        Ok(item)
    }
}

/// PostgreSQL store over one table `(id, state, payload, created_time, updated_time)`.
#[derive(Clone, Debug)]
pub struct PgStateStore {
    pool: PgPool,
    table: String,
}

const COLUMNS: &str = "id, state, payload, created_time, updated_time";

fn item_from_row(row: &PgRow) -> Result<StateItem, AppError> {
    let state: i32 = row.try_get("state")?;
    let payload = match row.try_get::<Value, _>("payload")? {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    Ok(StateItem {
        id: row.try_get("id")?,
        state: state as i64,
        payload,
        created_time: row.try_get("created_time")?,
        updated_time: row.try_get("updated_time")?,
    })
}

fn state_param(state: i64) -> Result<i32, AppError> {
    i32::try_from(state).map_err(|_| AppError::BadRequest(format!("state {} out of range", state)))
}

impl PgStateStore {
    pub fn new(pool: PgPool, schema: &str, table: &str) -> Self {
        PgStateStore {
            pool,
            table: qualified_table(schema, table),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the table if missing.
    pub async fn ensure_table(&self) -> Result<(), AppError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {} BIGSERIAL PRIMARY KEY,\n    {} INTEGER NOT NULL,\n    {} JSONB NOT NULL DEFAULT '{{}}'::jsonb,\n    {} TIMESTAMPTZ NOT NULL DEFAULT NOW(),\n    {} TIMESTAMPTZ NOT NULL DEFAULT NOW()\n)",
            self.table,
            quoted("id"),
            quoted("state"),
            quoted("payload"),
            quoted("created_time"),
            quoted("updated_time"),
        );
        tracing::debug!(sql = %sql, "ensure state table");
        sqlx::query(&sql).execute(&self.pool).await?;
        tracing::info!(table = %self.table, "state table ready");
        Ok(())
    }

    async fn fetch_many(&self, sql: String, state: Option<i32>) -> Result<Vec<StateItem>, AppError> {
        tracing::debug!(sql = %sql, state = ?state, "query");
        let mut q = sqlx::query(&sql);
        if let Some(s) = state {
            q = q.bind(s);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get_one(&self, id: i64) -> Result<Option<StateItem>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, self.table);
        tracing::debug!(sql = %sql, id, "query");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_all(&self, limit: u32, offset: u32) -> Result<Vec<StateItem>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id LIMIT {} OFFSET {}",
            COLUMNS, self.table, limit, offset
        );
        self.fetch_many(sql, None).await
    }

    async fn get_all_in_state(&self, state: i64) -> Result<Vec<StateItem>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE state = $1 ORDER BY id", COLUMNS, self.table);
        self.fetch_many(sql, Some(state_param(state)?)).await
    }

    async fn create(&self, state: i64, payload: Map<String, Value>) -> Result<StateItem, AppError> {
        let sql = format!(
            "INSERT INTO {} (state, payload) VALUES ($1, $2) RETURNING {}",
            self.table, COLUMNS
        );
        tracing::debug!(sql = %sql, state, "query");
        let row = sqlx::query(&sql)
            .bind(state_param(state)?)
            .bind(Value::Object(payload))
            .fetch_one(&self.pool)
            .await?;
        item_from_row(&row)
    }

    async fn update(&self, id: i64, payload: Map<String, Value>) -> Result<Option<StateItem>, AppError> {
        let sql = format!(
            "UPDATE {} SET payload = payload || $1, updated_time = NOW() WHERE id = $2 RETURNING {}",
            self.table, COLUMNS
        );
        tracing::debug!(sql = %sql, id, "query");
        let row = sqlx::query(&sql)
            .bind(Value::Object(payload))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn delete_one(&self, id: i64) -> Result<Option<StateItem>, AppError> {
        let sql = format!("DELETE FROM {} WHERE id = $1 RETURNING {}", self.table, COLUMNS);
        tracing::debug!(sql = %sql, id, "query");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        let sql = format!("DELETE FROM {}", self.table);
        tracing::debug!(sql = %sql, "query");
        Ok(sqlx::query(&sql).execute(&self.pool).await?.rows_affected())
    }

    async fn delete_all_in_state(&self, state: i64) -> Result<u64, AppError> {
        let sql = format!("DELETE FROM {} WHERE state = $1", self.table);
        tracing::debug!(sql = %sql, state, "query");
        let done = sqlx::query(&sql).bind(state_param(state)?).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn transition<'a>(&self, id: i64, mutate: MutateFn<'a>) -> Result<StateItem, AppError> {
        let mut tx = self.pool.begin().await?;
        let select = format!("SELECT {} FROM {} WHERE id = $1 FOR UPDATE", COLUMNS, self.table);
        tracing::debug!(sql = %select, id, "query");
        let row = sqlx::query(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {}", id)))?;
        let mut item = item_from_row(&row)?;
        // Dropping `tx` on error rolls back and releases the row lock.
        mutate(&mut item)?;
        let update = format!(
            "UPDATE {} SET state = $1, payload = $2, updated_time = $3 WHERE id = $4",
            self.table
        );
        tracing::debug!(sql = %update, id, state = item.state, "query");
        sqlx::query(&update)
            .bind(state_param(item.state)?)
            .bind(Value::Object(item.payload.clone()))
            .bind(item.updated_time)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(item)
    }
}
