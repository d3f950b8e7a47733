//! Example server: loads model declarations from `SCAFFOLD_MODELS`, emits artifacts into
//! `SCAFFOLD_OUTPUT_DIR`, ensures entity tables, then serves common and entity routes.

use axum::Router;
use scaffold_sdk::{
    common_routes_with_ready, ensure_database_exists, ensure_tables, entity_routes, load_registry, resolve, AppState,
    CodeGenerator, GeneratorConfig,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scaffold_sdk=info".parse()?))
        .init();

    let models_path = std::env::var("SCAFFOLD_MODELS").unwrap_or_else(|_| "demos/models.json".into());
    let registry = load_registry(&models_path)?;

    let config = GeneratorConfig::from_env();
    let mut generator = CodeGenerator::new(config.clone());
    generator.parse(&registry)?;
    let report = generator.generate_all()?;
    tracing::info!(written = report.written.len(), unchanged = report.unchanged.len(), "artifacts emitted");

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/scaffold".into());
    ensure_database_exists(&database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let model = resolve(&registry)?;
    ensure_tables(&pool, &model, &config.schema).await?;
    let state = AppState::new(pool, model, config.schema)?;

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api/v1", entity_routes(state))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(1024 * 1024)));

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
