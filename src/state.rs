//! Shared application state for all routes. The model is resolved once before serving.

use crate::config::ResolvedModel;
use crate::metadata::RouterMetadata;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub model: Arc<ResolvedModel>,
    /// Route sets in entity registration order.
    pub routers: Arc<Vec<RouterMetadata>>,
    /// Schema holding entity and link tables.
    pub schema: Arc<str>,
}

impl AppState {
    /// Builds route metadata for every entity; fails on the first unsupported entity shape.
    pub fn new(pool: PgPool, model: ResolvedModel, schema: impl Into<String>) -> Result<Self, crate::error::ConfigError> {
        let routers = model.router_metadata()?;
        Ok(AppState {
            pool,
            model: Arc::new(model),
            routers: Arc::new(routers),
            schema: Arc::from(schema.into()),
        })
    }
}
