//! JWT 认证中间件

use crate::{
    auth::jwt::{TokenCodec, ACCESS_TOKEN_TYPE},
    error::AppError,
    models::user::Authority,
    repository::CredentialStore,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Request-scoped security context (attached to request extensions)
///
/// Absent from the extensions when the request is unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    pub username: String,
    pub authorities: BTreeSet<Authority>,
}

impl SecurityContext {
    pub fn new(username: impl Into<String>, authority: Authority) -> Self {
        Self {
            username: username.into(),
            authorities: BTreeSet::from([authority]),
        }
    }

    /// True if any held authority is in `allowed`
    pub fn has_any(&self, allowed: &BTreeSet<Authority>) -> bool {
        !self.authorities.is_disjoint(allowed)
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 SecurityContext
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取 Bearer 令牌
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Result of running the authentication stage
#[derive(Debug)]
pub enum AuthOutcome {
    /// Public path; no token inspected
    Public,
    /// No bearer token, or the identity cross-check failed
    Anonymous,
    /// A context already existed on the request
    AlreadyAuthenticated,
    Authenticated(SecurityContext),
}

/// Resolves the caller's identity from a bearer token
pub struct Authenticator {
    codec: Arc<dyn TokenCodec>,
    credentials: Arc<dyn CredentialStore>,
    public_prefixes: Vec<String>,
}

impl Authenticator {
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        credentials: Arc<dyn CredentialStore>,
        public_prefixes: Vec<String>,
    ) -> Self {
        Self {
            codec,
            credentials,
            public_prefixes,
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Run the authentication stage for one request.
    ///
    /// `Err` means the request must be answered with 401 immediately.
    pub async fn authenticate(
        &self,
        path: &str,
        headers: &HeaderMap,
        existing: Option<&SecurityContext>,
    ) -> Result<AuthOutcome, AppError> {
        if self.is_public(path) {
            tracing::debug!(path = %path, "Skipping token validation for public path");
            return Ok(AuthOutcome::Public);
        }

        let Some(token) = extract_bearer(headers) else {
            tracing::debug!(path = %path, "Authorization header missing or not a bearer token");
            return Ok(AuthOutcome::Anonymous);
        };

        let token_type = self.codec.decode_token_type(token).map_err(|e| {
            tracing::warn!(path = %path, error = %e, "JWT decoding failed");
            AppError::authentication("Invalid JWT token")
        })?;

        if token_type != ACCESS_TOKEN_TYPE {
            tracing::warn!(path = %path, token_type = %token_type, "Token is not an access token");
            return Err(AppError::authentication("Invalid token type"));
        }

        let username = self.codec.decode_subject(token).map_err(|e| {
            tracing::warn!(path = %path, error = %e, "JWT subject extraction failed");
            AppError::authentication("Invalid JWT token")
        })?;

        if existing.is_some() {
            tracing::debug!(path = %path, "Security context already populated");
            return Ok(AuthOutcome::AlreadyAuthenticated);
        }

        let identity = self
            .credentials
            .find_by_username(&username)
            .await?
            .ok_or_else(|| {
                tracing::warn!(username = %username, "Token subject has no account");
                AppError::authentication("User authentication failed")
            })?;

        let authority = identity.authority().ok_or_else(|| {
            tracing::error!(username = %username, "Account has no role assigned");
            AppError::authentication("User authentication failed")
        })?;

        match self.codec.is_valid(token, &identity) {
            Ok(true) => {
                tracing::debug!(username = %username, authority = %authority, "Authentication set");
                Ok(AuthOutcome::Authenticated(SecurityContext::new(
                    identity.username,
                    authority,
                )))
            }
            Ok(false) => {
                // 放行为匿名请求，由授权阶段拒绝
                tracing::warn!(username = %username, path = %path, "Token failed identity cross-check");
                Ok(AuthOutcome::Anonymous)
            }
            Err(e) => {
                tracing::warn!(username = %username, error = %e, "Token validation failed");
                Err(AppError::authentication("User authentication failed"))
            }
        }
    }
}

/// JWT 认证中间件
///
/// 公共路径直接放行；无令牌的请求以匿名身份继续，由授权中间件决定是否拒绝。
pub async fn authenticate_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 请求体不是 Sync，跨 await 前先复制所需字段
    let path = req.uri().path().to_owned();
    let headers = req.headers().clone();
    let existing = req.extensions().get::<SecurityContext>().cloned();

    let outcome = authenticator
        .authenticate(&path, &headers, existing.as_ref())
        .await
        .map_err(|e| {
            metrics::counter!("authn_outcomes_total", "outcome" => "rejected").increment(1);
            e
        })?;

    let label = match &outcome {
        AuthOutcome::Public => "public",
        AuthOutcome::Anonymous => "anonymous",
        AuthOutcome::AlreadyAuthenticated => "existing",
        AuthOutcome::Authenticated(_) => "authenticated",
    };
    metrics::counter!("authn_outcomes_total", "outcome" => label).increment(1);

    if let AuthOutcome::Authenticated(ctx) = outcome {
        req.extensions_mut().insert(ctx);
    }

    Ok(next.run(req).await)
}
