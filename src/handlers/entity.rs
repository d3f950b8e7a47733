//! Entity handlers: one generic handler per route descriptor kind.

use crate::config::{EntitySpec, PkType, RelationshipSide};
use crate::error::AppError;
use crate::metadata::{RouteDescriptor, RouteKind};
use crate::response::{success_many, success_one, success_one_ok};
use crate::service::{CrudService, RequestValidator};
use crate::state::AppState;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// A route descriptor bound to the entity it serves.
#[derive(Clone, Debug)]
pub struct EntityRoute {
    pub entity: String,
    pub route: RouteDescriptor,
}

/// Body of link/unlink routes.
#[derive(Debug, Deserialize)]
pub struct LinkBody {
    pub id: Value,
    pub target_id: Value,
}

pub(crate) fn parse_id(id_str: &str, pk_type: PkType) -> Result<Value, AppError> {
    Ok(match pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = id_str.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id_str.to_string()),
    })
}

/// Same as `parse_id` for ids carried in a JSON body.
fn id_from_json(v: &Value, pk_type: PkType) -> Result<Value, AppError> {
    match v {
        Value::String(s) => parse_id(s, pk_type),
        Value::Number(n) => parse_id(&n.to_string(), pk_type),
        _ => Err(AppError::BadRequest("id must be a string or number".into())),
    }
}

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn required_id(entity: &EntitySpec, params: &HashMap<String, String>) -> Result<Value, AppError> {
    let raw = params
        .get("id")
        .ok_or_else(|| AppError::BadRequest("missing query parameter id".into()))?;
    parse_id(raw, entity.pk_type()?)
}

fn page_params(params: &HashMap<String, String>) -> (Option<u32>, Option<u32>) {
    (
        params.get("limit").and_then(|v| v.parse().ok()),
        params.get("offset").and_then(|v| v.parse().ok()),
    )
}

/// Dispatch one request for `ctx.route` of `ctx.entity`.
pub async fn handle(
    state: AppState,
    ctx: &EntityRoute,
    params: HashMap<String, String>,
    body: Option<Value>,
) -> Result<Response, AppError> {
    let entity = state
        .model
        .entity(&ctx.entity)
        .ok_or_else(|| AppError::NotFound(ctx.entity.clone()))?;
    let schema: &str = &state.schema;
    let pool = &state.pool;

    match &ctx.route.kind {
        RouteKind::Create => {
            let body = body_to_map(body.ok_or_else(|| AppError::BadRequest("missing JSON body".into()))?)?;
            RequestValidator::validate(entity, &body)?;
            let row = CrudService::create(pool, schema, entity, &body).await?;
            Ok(success_one(row).into_response())
        }
        RouteKind::Update => {
            let id = required_id(entity, &params)?;
            let body = body_to_map(body.ok_or_else(|| AppError::BadRequest("missing JSON body".into()))?)?;
            RequestValidator::validate_partial(entity, &body)?;
            let row = CrudService::update(pool, schema, entity, &id, &body)
                .await?
                .ok_or_else(|| AppError::NotFound(id.to_string()))?;
            Ok(success_one_ok(row).into_response())
        }
        RouteKind::Query { is_all, relations } => {
            let (limit, offset) = page_params(&params);
            if *is_all {
                let rows = if relations.is_empty() {
                    CrudService::list(pool, schema, entity, limit, offset).await?
                } else {
                    CrudService::query_with_relations(pool, schema, &state.model, entity, relations, None, limit, offset)
                        .await?
                };
                return Ok(success_many(rows).into_response());
            }
            let id = required_id(entity, &params)?;
            let row = if relations.is_empty() {
                CrudService::read(pool, schema, entity, &id).await?
            } else {
                CrudService::query_with_relations(pool, schema, &state.model, entity, relations, Some(&id), None, None)
                    .await?
                    .into_iter()
                    .next()
            };
            let row = row.ok_or_else(|| AppError::NotFound(id.to_string()))?;
            Ok(success_one_ok(row).into_response())
        }
        RouteKind::Delete { is_all: true } => {
            let removed = CrudService::delete_all(pool, schema, entity).await?;
            tracing::info!(entity = %entity.name, removed, "deleted all rows");
            let remaining = CrudService::list(pool, schema, entity, None, None).await?;
            Ok(success_many(remaining).into_response())
        }
        RouteKind::Delete { is_all: false } => {
            let id = required_id(entity, &params)?;
            let row = CrudService::delete(pool, schema, entity, &id)
                .await?
                .ok_or_else(|| AppError::NotFound(id.to_string()))?;
            Ok(success_one_ok(row).into_response())
        }
        RouteKind::Relation { relation, is_unlink } => {
            let body = body.ok_or_else(|| AppError::BadRequest("missing JSON body".into()))?;
            let LinkBody { id, target_id } =
                serde_json::from_value(body).map_err(|e| AppError::BadRequest(e.to_string()))?;
            let target = state
                .model
                .entity(&relation.target)
                .ok_or_else(|| AppError::NotFound(relation.target.clone()))?;
            let id = id_from_json(&id, entity.pk_type()?)?;
            let target_id = id_from_json(&target_id, target.pk_type()?)?;
            let affected =
                CrudService::link(pool, schema, &state.model, entity, relation, &id, &target_id, *is_unlink).await?;
            // A link-table insert affects nothing when the pair already exists.
            if affected == 0 && (*is_unlink || relation.side != RelationshipSide::Both) {
                return Err(AppError::NotFound(format!("no row matched {} and {}", id, target_id)));
            }
            Ok(success_one_ok(serde_json::json!({
                "id": id,
                "target_id": target_id,
                "affected": affected,
            }))
            .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_by_key_type() {
        assert!(parse_id("not-a-uuid", PkType::Uuid).is_err());
        assert_eq!(parse_id("42", PkType::BigInt).unwrap(), serde_json::json!(42));
        assert_eq!(id_from_json(&serde_json::json!(7), PkType::Int).unwrap(), serde_json::json!(7));
        assert_eq!(id_from_json(&serde_json::json!("a"), PkType::Text).unwrap(), serde_json::json!("a"));
        assert!(id_from_json(&serde_json::json!(null), PkType::Text).is_err());
    }
}
