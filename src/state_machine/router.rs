//! CRUD router for state items plus one POST endpoint per registered transition.

use crate::auth::{check_all, Guard, RouteToggle};
use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok};
use crate::service::page;
use crate::state_machine::registrar::{Registrar, TransitionSummary};
use crate::state_machine::store::StateStore;
use crate::state_machine::StateEnum;
use axum::{
    extract::{Path, Query, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Which routes are mounted and which guards they run.
#[derive(Clone, Default)]
pub struct RouteToggles {
    pub get_all: RouteToggle,
    pub get_one: RouteToggle,
    pub create: RouteToggle,
    pub update: RouteToggle,
    pub delete_one: RouteToggle,
    pub delete_all: RouteToggle,
    pub get_all_in_state: RouteToggle,
    pub delete_all_in_state: RouteToggle,
    pub get_states: RouteToggle,
    pub get_transitions: RouteToggle,
    /// Applies to every transition route, before the transition's own dependencies.
    pub transitions: RouteToggle,
}

struct Shared<E: StateEnum> {
    registrar: Arc<Registrar<E>>,
    store: Arc<dyn StateStore>,
}

impl<E: StateEnum> Clone for Shared<E> {
    fn clone(&self) -> Self {
        Shared {
            registrar: Arc::clone(&self.registrar),
            store: Arc::clone(&self.store),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    limit: Option<u32>,
    offset: Option<u32>,
}

fn payload_from(body: Option<Json<Value>>) -> Result<Map<String, Value>, AppError> {
    let payload = match body.map(|Json(v)| v) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m,
        Some(_) => return Err(AppError::BadRequest("body must be a JSON object".into())),
    };
    if payload.contains_key("state") || payload.contains_key("id") {
        return Err(AppError::Validation(
            "id and state are managed by the store; use a transition route to change state".into(),
        ));
    }
    Ok(payload)
}

/// State from its value (`3`) or name (`Shipped`).
fn parse_state<E: StateEnum>(raw: &str) -> Result<E, AppError> {
    raw.parse::<i64>()
        .ok()
        .and_then(E::from_value)
        .or_else(|| E::from_name(raw))
        .ok_or_else(|| AppError::BadRequest(format!("unknown state {}", raw)))
}

async fn get_all<E: StateEnum>(State(s): State<Shared<E>>, Query(p): Query<Page>) -> Result<Response, AppError> {
    let (limit, offset) = page(p.limit, p.offset);
    Ok(success_many(s.store.get_all(limit, offset).await?).into_response())
}

async fn get_one<E: StateEnum>(State(s): State<Shared<E>>, Path(id): Path<i64>) -> Result<Response, AppError> {
    let item = s
        .store
        .get_one(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("item {}", id)))?;
    Ok(success_one_ok(item).into_response())
}

async fn create<E: StateEnum>(State(s): State<Shared<E>>, body: Option<Json<Value>>) -> Result<Response, AppError> {
    let item = s.store.create(E::initial().value(), payload_from(body)?).await?;
    tracing::info!(id = item.id, state = E::initial().name(), "item created");
    Ok(success_one(item).into_response())
}

async fn update<E: StateEnum>(
    State(s): State<Shared<E>>,
    Path(id): Path<i64>,
    body: Option<Json<Value>>,
) -> Result<Response, AppError> {
    let item = s
        .store
        .update(id, payload_from(body)?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("item {}", id)))?;
    Ok(success_one_ok(item).into_response())
}

async fn delete_one<E: StateEnum>(State(s): State<Shared<E>>, Path(id): Path<i64>) -> Result<Response, AppError> {
    let item = s
        .store
        .delete_one(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("item {}", id)))?;
    Ok(success_one_ok(item).into_response())
}

async fn delete_all<E: StateEnum>(State(s): State<Shared<E>>) -> Result<Response, AppError> {
    let removed = s.store.delete_all().await?;
    tracing::info!(removed, "deleted all items");
    let (limit, offset) = page(None, None);
    Ok(success_many(s.store.get_all(limit, offset).await?).into_response())
}

async fn get_all_in_state<E: StateEnum>(
    State(s): State<Shared<E>>,
    Path(state): Path<String>,
) -> Result<Response, AppError> {
    let state: E = parse_state(&state)?;
    Ok(success_many(s.store.get_all_in_state(state.value()).await?).into_response())
}

async fn delete_all_in_state<E: StateEnum>(
    State(s): State<Shared<E>>,
    Path(state): Path<String>,
) -> Result<Response, AppError> {
    let state: E = parse_state(&state)?;
    let removed = s.store.delete_all_in_state(state.value()).await?;
    tracing::info!(removed, state = state.name(), "deleted items in state");
    Ok(success_many(s.store.get_all_in_state(state.value()).await?).into_response())
}

async fn get_states<E: StateEnum>(State(s): State<Shared<E>>) -> Response {
    let states: Vec<Value> = s
        .registrar
        .get_states()
        .into_iter()
        .map(|st| json!({ "value": st.value(), "name": st.name() }))
        .collect();
    success_many(states).into_response()
}

async fn get_transitions<E: StateEnum>(State(s): State<Shared<E>>) -> Response {
    let list: Vec<TransitionSummary> = s.registrar.transitions().into_values().collect();
    success_many(list).into_response()
}

/// Runs `deps` before the wrapped route; no layer when there are none.
fn with_guards<S>(route: MethodRouter<S>, deps: Vec<Arc<dyn Guard>>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    if deps.is_empty() {
        return route;
    }
    let deps = Arc::new(deps);
    route.layer(middleware::from_fn(move |req: Request, next: Next| {
        let deps = Arc::clone(&deps);
        async move {
            check_all(&deps, req.headers()).await?;
            Ok::<Response, AppError>(next.run(req).await)
        }
    }))
}

/// Builds the state item router from a frozen registrar and a store.
pub struct StateItemRouter<E: StateEnum> {
    registrar: Arc<Registrar<E>>,
    store: Arc<dyn StateStore>,
    prefix: String,
    toggles: RouteToggles,
}

impl<E: StateEnum> StateItemRouter<E> {
    pub fn new(registrar: Arc<Registrar<E>>, store: Arc<dyn StateStore>) -> Self {
        StateItemRouter {
            registrar,
            store,
            prefix: String::new(),
            toggles: RouteToggles::default(),
        }
    }

    /// Mount point, e.g. `/product`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn toggles(mut self, toggles: RouteToggles) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn router(&self) -> Router {
        let t = &self.toggles;
        let mut r: Router<Shared<E>> = Router::new();
        let fixed: [(&str, &RouteToggle, MethodRouter<Shared<E>>); 10] = [
            ("/", &t.get_all, get(get_all::<E>)),
            ("/", &t.create, post(create::<E>)),
            ("/", &t.delete_all, delete(delete_all::<E>)),
            ("/states", &t.get_states, get(get_states::<E>)),
            ("/transitions", &t.get_transitions, get(get_transitions::<E>)),
            ("/:id", &t.get_one, get(get_one::<E>)),
            ("/:id", &t.update, put(update::<E>)),
            ("/:id", &t.delete_one, delete(delete_one::<E>)),
            ("/state/:state", &t.get_all_in_state, get(get_all_in_state::<E>)),
            ("/state/:state", &t.delete_all_in_state, delete(delete_all_in_state::<E>)),
        ];
        for (path, toggle, route) in fixed {
            if toggle.is_enabled() {
                r = r.route(path, with_guards(route, toggle.dependencies().to_vec()));
            }
        }

        if t.transitions.is_enabled() {
            for info in self.registrar.iter() {
                let (from, to) = (info.from, info.to);
                let handler = move |State(s): State<Shared<E>>, Json(body): Json<Value>| async move {
                    let mut params = match body {
                        Value::Object(m) => m,
                        _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
                    };
                    let id = params
                        .remove("id")
                        .and_then(|v| v.as_i64())
                        .ok_or_else(|| AppError::BadRequest("body requires an integer id".into()))?;
                    let outcome = s
                        .registrar
                        .execute(s.store.as_ref(), id, from, to, Value::Object(params))
                        .await?;
                    Ok(Json(outcome))
                };
                let mut deps = t.transitions.dependencies().to_vec();
                deps.extend(info.dependencies.iter().cloned());
                tracing::debug!(path = %info.path(), name = %info.display_name, "mount transition");
                r = r.route(&info.path(), with_guards(post(handler), deps));
            }
        }

        let shared = Shared {
            registrar: Arc::clone(&self.registrar),
            store: Arc::clone(&self.store),
        };
        let r = r.with_state(shared);
        match self.prefix.trim_end_matches('/') {
            "" => r,
            prefix => Router::new().nest(prefix, r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::state_enum! {
        enum Phase { Draft = 0, Live = 1 }
    }

    #[test]
    fn states_parse_by_value_or_name() {
        assert_eq!(parse_state::<Phase>("1").unwrap(), Phase::Live);
        assert_eq!(parse_state::<Phase>("Draft").unwrap(), Phase::Draft);
        assert!(parse_state::<Phase>("7").is_err());
    }

    #[test]
    fn managed_keys_are_rejected() {
        assert!(payload_from(None).unwrap().is_empty());
        assert!(payload_from(Some(Json(json!({"state": 1})))).is_err());
        assert!(payload_from(Some(Json(json!([1])))).is_err());
    }
}
