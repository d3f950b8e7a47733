use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use scaffold_sdk::state_machine::{MemoryStateStore, RouteToggles, StateItem, StateStore};
use scaffold_sdk::{AppError, BearerToken, Registrar, RouteToggle, StateEnum, StateItemRouter, Transition};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

scaffold_sdk::state_enum! {
    pub enum ProductState { Order = 1, Produce = 2, Shipped = 3, Received = 4, Missed = 5 }
}

#[derive(Deserialize)]
struct MakeParams {
    factory_id: i64,
}

fn registrar() -> Registrar<ProductState> {
    use ProductState::*;
    let mut r = Registrar::new().unwrap();
    r.register(
        Transition::new(Order, Produce)
            .name("make")
            .apply(|item: &mut StateItem, p: MakeParams| -> Result<(), AppError> {
                item.payload.insert("factory_id".into(), json!(p.factory_id));
                Ok(())
            }),
    )
    .unwrap();
    r.register(Transition::new(Produce, Shipped).name("deliver").dependency(BearerToken::new("courier")))
        .unwrap();
    r.register(Transition::new(Shipped, Received).name("receive")).unwrap();
    r.register(Transition::new(Shipped, Missed).name("miss")).unwrap();
    r.register(Transition::new(Missed, Received).name("receive")).unwrap();
    r
}

fn app(store: Arc<MemoryStateStore>, toggles: RouteToggles) -> Router {
    StateItemRouter::new(Arc::new(registrar()), store)
        .prefix("/product")
        .toggles(toggles)
        .router()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_then_walk_transitions() {
    let store = Arc::new(MemoryStateStore::new());
    let app = app(Arc::clone(&store), RouteToggles::default());

    let (status, created) = send(&app, post("/product", json!({"name": "lamp"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["state"], ProductState::Order.value());
    let id = created["data"]["id"].as_i64().unwrap();
    let before = store.get_one(id).await.unwrap().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let (status, body) = send(&app, post("/product/transition/Order-to-Produce", json!({"id": id, "factory_id": 9}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);

    let item = store.get_one(id).await.unwrap().unwrap();
    assert_eq!(item.state, ProductState::Produce.value());
    assert_eq!(item.payload["factory_id"], 9);
    assert_eq!(item.payload["name"], "lamp");
    assert!(item.updated_time > before.updated_time);
    assert_eq!(item.created_time, before.created_time);

    let (status, body) = send(
        &app,
        Request::get("/product/state/Produce").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 1);
}

#[tokio::test]
async fn wrong_source_state_is_rejected_with_details() {
    let store = Arc::new(MemoryStateStore::new());
    let app = app(Arc::clone(&store), RouteToggles::default());
    let item = store.create(ProductState::Order.value(), Default::default()).await.unwrap();

    let (status, body) = send(&app, post("/product/transition/Shipped-to-Received", json!({"id": item.id}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_transition");
    assert_eq!(body["error"]["details"]["current"], "Order");
    assert_eq!(body["error"]["details"]["expected"], "Shipped");
    assert_eq!(body["error"]["details"]["transition"], "receive");
    let unchanged = store.get_one(item.id).await.unwrap().unwrap();
    assert_eq!(unchanged.state, ProductState::Order.value());
    assert_eq!(unchanged.updated_time, item.updated_time);

    let (status, _) = send(&app, post("/product/transition/Order-to-Produce", json!({"id": item.id}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let unchanged = store.get_one(item.id).await.unwrap().unwrap();
    assert_eq!(unchanged.state, ProductState::Order.value());
    assert_eq!(unchanged.updated_time, item.updated_time);
}

#[tokio::test]
async fn transition_dependencies_run_first() {
    let store = Arc::new(MemoryStateStore::new());
    let app = app(Arc::clone(&store), RouteToggles::default());
    let item = store.create(ProductState::Produce.value(), Default::default()).await.unwrap();

    let (status, body) = send(&app, post("/product/transition/Produce-to-Shipped", json!({"id": item.id}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let req = Request::post("/product/transition/Produce-to-Shipped")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer courier")
        .body(Body::from(json!({"id": item.id}).to_string()))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.get_one(item.id).await.unwrap().unwrap().state, ProductState::Shipped.value());
}

#[tokio::test]
async fn introspection_and_toggles() {
    let store = Arc::new(MemoryStateStore::new());
    let toggles = RouteToggles {
        delete_all: RouteToggle::Disabled,
        ..RouteToggles::default()
    };
    let app = app(store, toggles);

    let (status, body) = send(&app, Request::get("/product/states").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["data"].as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Order", "Produce", "Shipped", "Received", "Missed"]);

    let (_, body) = send(&app, Request::get("/product/transitions").body(Body::empty()).unwrap()).await;
    assert_eq!(body["meta"]["count"], 5);
    assert_eq!(body["data"][0]["path"], "/transition/Order-to-Produce");

    let (status, _) = send(&app, Request::delete("/product").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
