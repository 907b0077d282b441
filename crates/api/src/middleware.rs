use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use astrocat_auth::{Caller, JwtValidator, PrincipalDirectory};

use crate::app::errors::json_error;
use crate::context::CallerContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub directory: Arc<dyn PrincipalDirectory>,
}

/// Resolve the caller from the bearer token.
///
/// No `Authorization` header means an anonymous caller; a header that is
/// present but does not check out is rejected with 401.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let context = match resolve(&state, req.headers()) {
        Ok(context) => context,
        Err(response) => return response,
    };

    req.extensions_mut().insert(context);
    next.run(req).await
}

fn resolve(state: &AuthState, headers: &HeaderMap) -> Result<CallerContext, Response> {
    let Some(token) = extract_bearer(headers)? else {
        return Ok(CallerContext::anonymous());
    };

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        unauthorized("invalid or expired token")
    })?;

    let principal = match state.directory.find(claims.sub) {
        Ok(Some(principal)) => principal,
        Ok(None) => {
            tracing::info!(principal_id = %claims.sub, "token for unknown principal");
            return Err(unauthorized("unknown principal"));
        }
        Err(e) => {
            tracing::warn!(error = %e, "principal lookup failed");
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "directory_error",
                "principal lookup failed",
            ));
        }
    };

    Ok(CallerContext::authenticated(Caller::new(principal, claims.sid)))
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, Response> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header
        .to_str()
        .map_err(|_| unauthorized("malformed authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("expected a bearer token"))?
        .trim();
    if token.is_empty() {
        return Err(unauthorized("empty bearer token"));
    }

    Ok(Some(token))
}

fn unauthorized(message: &'static str) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message)
}
