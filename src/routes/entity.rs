//! Entity routes mounted from router metadata: one axum route per descriptor, nested under `/{snake_name}`.

use crate::error::AppError;
use crate::handlers::entity::{handle, EntityRoute};
use crate::metadata::{RouteMethod, RouterMetadata};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn method_router(ctx: Arc<EntityRoute>) -> MethodRouter<AppState> {
    let method = ctx.route.method;
    let handler = move |State(state): State<AppState>,
                        Query(params): Query<HashMap<String, String>>,
                        body: Option<Json<Value>>| {
        let ctx = Arc::clone(&ctx);
        async move { handle(state, &ctx, params, body.map(|Json(v)| v)).await }
    };
    match method {
        RouteMethod::Get => get(handler),
        RouteMethod::Post => post(handler),
        RouteMethod::Put => put(handler),
        RouteMethod::Delete => delete(handler),
    }
}

/// Router for one entity; paths are relative to the entity prefix.
pub fn entity_router(meta: &RouterMetadata) -> Router<AppState> {
    let mut router = Router::new();
    for route in &meta.routes {
        let ctx = Arc::new(EntityRoute {
            entity: meta.entity.clone(),
            route: route.clone(),
        });
        tracing::debug!(entity = %meta.entity, method = %route.method, url = %route.url, name = %route.name, "mount route");
        router = router.route(&route.url, method_router(ctx));
    }
    router
}

async fn not_found() -> AppError {
    AppError::NotFound("route".into())
}

/// All entity routes: `/{snake_name}/{route url}` for every registered entity.
pub fn entity_routes(state: AppState) -> Router {
    let mut router = Router::new();
    for meta in state.routers.iter() {
        router = router.nest(&format!("/{}", meta.snake_name), entity_router(meta));
    }
    tracing::info!(entities = state.routers.len(), "entity routes mounted");
    router.fallback(not_found).with_state(state)
}
