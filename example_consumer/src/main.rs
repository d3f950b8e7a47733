//! Example consumer: a product API whose items move through a registered state machine.
//!
//! Run from repo root: `cargo run -p example-consumer`

use scaffold_sdk::state_machine::{PgStateStore, StateItem, StateStore};
use scaffold_sdk::{
    common_routes, ensure_database_exists, AppError, BearerToken, Registrar, StateItemRouter, Transition,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

scaffold_sdk::state_enum! {
    /// Lifecycle of a product order.
    pub enum ProductState {
        Order = 1,
        Produce = 2,
        Shipped = 3,
        Received = 4,
        Missed = 5,
    }
}

#[derive(Deserialize)]
struct MakeParams {
    factory_id: i64,
}

#[derive(Deserialize)]
struct DeliverParams {
    destination: String,
    receiver: String,
}

fn record_time(item: &mut StateItem, key: &str) {
    item.payload.insert(key.into(), serde_json::json!(chrono::Utc::now()));
}

fn registrar() -> Result<Registrar<ProductState>, scaffold_sdk::ConfigError> {
    use ProductState::*;
    let mut r = Registrar::new()?;
    r.register(
        Transition::new(Order, Produce)
            .name("make")
            .apply(|item: &mut StateItem, p: MakeParams| -> Result<(), AppError> {
                item.payload.insert("factory_id".into(), p.factory_id.into());
                record_time(item, "produce_time");
                Ok(())
            }),
    )?;
    let mut deliver = Transition::new(Produce, Shipped)
        .name("deliver")
        .apply(|item: &mut StateItem, p: DeliverParams| -> Result<(), AppError> {
            item.payload.insert("destination".into(), p.destination.into());
            item.payload.insert("receiver".into(), p.receiver.into());
            record_time(item, "ship_time");
            Ok(())
        });
    if let Some(token) = BearerToken::from_env("COURIER_TOKEN") {
        deliver = deliver.dependency(token);
    }
    r.register(deliver)?;
    r.register(Transition::new(Shipped, Received).name("receive").apply(
        |item: &mut StateItem, _: serde::de::IgnoredAny| -> Result<(), AppError> {
            record_time(item, "receive_time");
            Ok(())
        },
    ))?;
    r.register(Transition::new(Shipped, Missed).name("miss"))?;
    r.register(Transition::new(Missed, Received).name("receive"))?;
    Ok(r)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scaffold_sdk=info")),
        )
        .init();

    let registrar = Arc::new(registrar()?);
    tracing::debug!(dot = %registrar.to_dot(), "product transitions");

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/scaffold".into());
    ensure_database_exists(&database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    let schema = std::env::var("SCAFFOLD_SCHEMA").unwrap_or_else(|_| "public".into());
    let store = PgStateStore::new(pool, &schema, "product");
    store.ensure_table().await?;
    let store: Arc<dyn StateStore> = Arc::new(store);

    let app = common_routes().merge(StateItemRouter::new(registrar, store).prefix("/product").router());
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
