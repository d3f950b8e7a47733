//! Per-route authorization dependencies. A route runs every guard attached to it before its handler.

use crate::error::AppError;
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;

#[async_trait]
pub trait Guard: Send + Sync {
    /// Reject the request with `AppError::Unauthorized` (or any other error) to stop it.
    async fn check(&self, headers: &HeaderMap) -> Result<(), AppError>;
}

#[async_trait]
impl<F> Guard for F
where
    F: Fn(&HeaderMap) -> Result<(), AppError> + Send + Sync,
{
    async fn check(&self, headers: &HeaderMap) -> Result<(), AppError> {
        self(headers)
    }
}

pub type Dependencies = Vec<Arc<dyn Guard>>;

/// Run guards in order; the first rejection wins.
pub async fn check_all(deps: &[Arc<dyn Guard>], headers: &HeaderMap) -> Result<(), AppError> {
    for g in deps {
        g.check(headers).await?;
    }
    Ok(())
}

/// Requires `Authorization: Bearer <token>` with a fixed token.
#[derive(Clone, Debug)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        BearerToken { token: token.into() }
    }

    /// Token from env `var`; None when unset or empty.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().filter(|t| !t.is_empty()).map(BearerToken::new)
    }
}

#[async_trait]
impl Guard for BearerToken {
    async fn check(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        match presented {
            Some(t) if t == self.token => Ok(()),
            Some(_) => Err(AppError::Unauthorized("invalid bearer token".into())),
            None => Err(AppError::Unauthorized("missing bearer token".into())),
        }
    }
}

/// Whether a route is mounted, and with which dependencies.
#[derive(Clone, Default)]
pub enum RouteToggle {
    Disabled,
    #[default]
    Enabled,
    Guarded(Dependencies),
}

impl RouteToggle {
    pub fn guarded(guard: impl Guard + 'static) -> Self {
        RouteToggle::Guarded(vec![Arc::new(guard)])
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, RouteToggle::Disabled)
    }

    pub fn dependencies(&self) -> &[Arc<dyn Guard>] {
        match self {
            RouteToggle::Guarded(deps) => deps,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn bearer_token_checks_header() {
        let guard = BearerToken::new("s3cret");
        let mut headers = HeaderMap::new();
        assert!(matches!(guard.check(&headers).await, Err(AppError::Unauthorized(_))));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(guard.check(&headers).await.is_err());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(guard.check(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn closures_are_guards() {
        let allow: Arc<dyn Guard> = Arc::new(|_: &HeaderMap| -> Result<(), AppError> { Ok(()) });
        let deny: Arc<dyn Guard> =
            Arc::new(|_: &HeaderMap| -> Result<(), AppError> { Err(AppError::Unauthorized("no".into())) });
        let deps: Dependencies = vec![allow, deny];
        assert!(check_all(&deps, &HeaderMap::new()).await.is_err());
        assert!(check_all(&deps[..1], &HeaderMap::new()).await.is_ok());
        assert!(!RouteToggle::Disabled.is_enabled());
        assert_eq!(RouteToggle::guarded(BearerToken::new("t")).dependencies().len(), 1);
    }
}
