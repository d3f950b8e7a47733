//! Common routes: health, readiness, version and the mounted route table.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    match sqlx::query("SELECT 1").fetch_optional(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyBody {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyBody {
                    status: "degraded",
                    database: "unavailable",
                }),
            )
        }
    }
}

async fn version() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Every mounted entity route, grouped by entity.
pub fn route_table(state: &AppState) -> Value {
    let entities: Vec<Value> = state
        .routers
        .iter()
        .map(|meta| {
            let routes: Vec<Value> = meta
                .routes
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "method": r.method,
                        "path": format!("/{}{}", meta.snake_name, r.url),
                        "schema": r.schema_suffix,
                    })
                })
                .collect();
            json!({ "entity": meta.entity, "routes": routes })
        })
        .collect();
    Value::Array(entities)
}

async fn routes(State(state): State<AppState>) -> Json<Value> {
    Json(route_table(&state))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Common routes plus readiness (DB check) and GET /routes.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .route("/routes", get(routes))
        .with_state(state)
}
