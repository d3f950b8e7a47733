//! Generic CRUD execution against PostgreSQL for resolved entities.

use crate::config::{EntitySpec, RelationshipEdge, ResolvedModel};
use crate::error::AppError;
use crate::sql::{self, PgBindValue, QueryBuf, RelationSelect};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

pub struct CrudService;

impl CrudService {
    /// List rows ordered by primary key. Limit defaults to 100, max 1000; offset defaults to 0.
    pub async fn list(
        pool: &PgPool,
        schema: &str,
        entity: &EntitySpec,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, AppError> {
        let (limit, offset) = page(limit, offset);
        let q = sql::select_list(entity, schema, limit, offset)?;
        Self::query_many(pool, &q).await
    }

    /// Fetch one row by primary key. Returns JSON object or None.
    pub async fn read(pool: &PgPool, schema: &str, entity: &EntitySpec, id: &Value) -> Result<Option<Value>, AppError> {
        let q = sql::select_by_id(entity, schema, id)?;
        Self::query_optional(pool, &q).await
    }

    /// Rows with the given relations embedded. `id` narrows to one row.
    #[allow(clippy::too_many_arguments)]
    pub async fn query_with_relations(
        pool: &PgPool,
        schema: &str,
        model: &ResolvedModel,
        entity: &EntitySpec,
        relations: &[RelationshipEdge],
        id: Option<&Value>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, AppError> {
        let mut selects = Vec::with_capacity(relations.len());
        for edge in relations {
            let target = model
                .entity(&edge.target)
                .ok_or_else(|| AppError::NotFound(edge.target.clone()))?;
            selects.push(RelationSelect { edge, target });
        }
        let (limit, offset) = page(limit, offset);
        let q = sql::select_with_relations(entity, schema, &selects, id, limit, offset)?;
        Self::query_many(pool, &q).await
    }

    /// Insert one row; omitted columns take their DB default. Returns created row.
    pub async fn create(
        pool: &PgPool,
        schema: &str,
        entity: &EntitySpec,
        body: &HashMap<String, Value>,
    ) -> Result<Value, AppError> {
        let q = sql::insert(entity, schema, body);
        Self::query_optional(pool, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    /// Update one row by id. Returns updated row.
    pub async fn update(
        pool: &PgPool,
        schema: &str,
        entity: &EntitySpec,
        id: &Value,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let q = sql::update(entity, schema, id, body)?;
        Self::query_optional(pool, &q).await
    }

    /// Delete one row by id. Returns deleted row or None.
    pub async fn delete(pool: &PgPool, schema: &str, entity: &EntitySpec, id: &Value) -> Result<Option<Value>, AppError> {
        let q = sql::delete_by_id(entity, schema, id)?;
        Self::query_optional(pool, &q).await
    }

    /// Delete every row. Returns the number of rows removed.
    pub async fn delete_all(pool: &PgPool, schema: &str, entity: &EntitySpec) -> Result<u64, AppError> {
        let q = sql::delete_all(entity, schema);
        Self::execute(pool, &q).await
    }

    /// Link or unlink two rows along a relationship. Returns rows affected.
    #[allow(clippy::too_many_arguments)]
    pub async fn link(
        pool: &PgPool,
        schema: &str,
        model: &ResolvedModel,
        entity: &EntitySpec,
        edge: &RelationshipEdge,
        id: &Value,
        target_id: &Value,
        unlink: bool,
    ) -> Result<u64, AppError> {
        let target = model
            .entity(&edge.target)
            .ok_or_else(|| AppError::NotFound(edge.target.clone()))?;
        let q = sql::link(entity, target, edge, schema, id, target_id, unlink)?;
        Self::execute(pool, &q).await
    }

    async fn query_optional(pool: &PgPool, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn query_many(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(pool: &PgPool, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        Ok(query.execute(pool).await?.rows_affected())
    }
}

pub(crate) fn page(limit: Option<u32>, offset: Option<u32>) -> (u32, u32) {
    (limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT), offset.unwrap_or(0))
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

/// Decode one cell by trying the column types declarations can produce.
fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_and_caps() {
        assert_eq!(page(None, None), (100, 0));
        assert_eq!(page(Some(5000), Some(20)), (1000, 20));
    }
}
