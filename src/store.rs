//! Runtime table bootstrap. Entity and link tables live in the schema named by `SCAFFOLD_SCHEMA`
//! (default `public`). Creation is idempotent; there is no schema evolution.

use crate::config::ResolvedModel;
use crate::error::AppError;
use crate::sql::{quoted, table_defs};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

/// Schema for entity tables. From env `SCAFFOLD_SCHEMA`, default `public`.
pub fn runtime_schema() -> String {
    std::env::var("SCAFFOLD_SCHEMA").unwrap_or_else(|_| "public".into())
}

/// Create the schema if missing, then every entity table (FK targets first) and link table.
pub async fn ensure_tables(pool: &PgPool, model: &ResolvedModel, schema: &str) -> Result<(), AppError> {
    let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema));
    tracing::debug!(sql = %create_schema, "execute");
    sqlx::query(&create_schema).execute(pool).await?;
    let defs = table_defs(model, schema)?;
    for def in &defs {
        let ddl = def.to_sql();
        tracing::debug!(sql = %ddl, "execute");
        sqlx::query(&ddl).execute(pool).await?;
    }
    tracing::info!(schema = %schema, tables = defs.len(), "ensured tables");
    Ok(())
}

/// Create the database named in `database_url` if it does not exist (connects to `postgres`).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_swaps_database() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/scaffold?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "scaffold");
        assert!(parse_db_name_from_url("nopath").is_err());
    }
}
