//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Static configuration defects. Raised while declaring, resolving or building routes; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("link {link} references unknown entity '{missing}'")]
    UnknownEntity { link: String, missing: String },
    #[error("has circular links: {}", chain.join(" -> "))]
    CircularLink { chain: Vec<String> },
    #[error("entity {entity} has {count} primary keys, exactly one is required")]
    MultiplePrimaryKeys { entity: String, count: usize },
    #[error("entity {entity} has {count} primary key fields; only single-column keys are supported")]
    UnsupportedKeyShape { entity: String, count: usize },
    #[error("entity {entity} has {count} relationships (max {max})")]
    TooManyRelationships { entity: String, count: usize, max: usize },
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("link {link} declared by {second} repeats a link between the same entities declared by {first}")]
    DuplicateLink { link: String, first: String, second: String },
    #[error("entity {entity} already has foreign key {fk}")]
    DuplicateForeignKey { entity: String, fk: String },
    #[error("entity {entity}: route {route} is produced by both {first} and {second}")]
    DuplicateRoute { entity: String, route: String, first: String, second: String },
    #[error("duplicate transition: {from} -> {to}")]
    DuplicateTransition { from: String, to: String },
    #[error("duplicate state value {value} ({first} and {second})")]
    DuplicateState { value: i64, first: String, second: String },
    #[error("invalid field {entity}.{field}: {reason}")]
    InvalidField { entity: String, field: String, reason: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("Current state is \"{current}\", not \"{expected}\", cannot use \"{transition}\" to transit to \"{target}\"")]
    InvalidTransition {
        transition: String,
        current: String,
        expected: String,
        target: String,
    },
}

/// Errors raised while rendering or writing generated artifacts.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("template: {0}")]
    Template(#[from] tinytemplate::error::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidTransition { .. } => (StatusCode::BAD_REQUEST, "invalid_transition"),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status_and_code().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let details = match &self {
            AppError::InvalidTransition {
                transition,
                current,
                expected,
                target,
            } => Some(serde_json::json!({
                "transition": transition,
                "current": current,
                "expected": expected,
                "target": target,
            })),
            _ => None,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_link_message_lists_chain() {
        let err = ConfigError::CircularLink {
            chain: vec!["A".into(), "B".into(), "C".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "has circular links: A -> B -> C -> A");
    }

    #[test]
    fn invalid_transition_is_client_error() {
        let err = AppError::InvalidTransition {
            transition: "deliver".into(),
            current: "Order".into(),
            expected: "Produce".into(),
            target: "Shipped".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("\"Order\""));
    }
}
