//! Authorization checks and audit endpoints.
//!
//! Lets collaborators ask "may this caller do X?" before mutating anything,
//! and answers "why was this request denied?".

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use astrocat_auth::AuthzError;

use crate::app::{AppServices, dto::AuthzCheckRequest, errors};
use crate::context::CallerContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/check", post(check))
        .route("/explain", post(explain))
        .route("/rules", get(rules))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /authz/check - allow, or the denial with its HTTP status
pub async fn check(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Json(req): Json<AuthzCheckRequest>,
) -> axum::response::Response {
    let decision = services
        .gate
        .authorize_named(ctx.caller(), &req.action, &req.resource, &req.context());

    match decision {
        Ok(()) => Json(json!({ "decision": "allow" })).into_response(),
        Err(e) => errors::authz_error_to_response(&e),
    }
}

/// POST /authz/explain - full evaluation trace for a request
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Json(req): Json<AuthzCheckRequest>,
) -> impl IntoResponse {
    Json(
        services
            .gate
            .explain_named(ctx.caller(), &req.action, &req.resource, &req.context()),
    )
}

/// GET /authz/rules - the requirement table
pub async fn rules(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    if !ctx.is_authenticated() {
        return errors::authz_error_to_response(&AuthzError::Unauthenticated);
    }

    let rules = services.gate.requirements().rules();
    (
        StatusCode::OK,
        Json(json!({
            "count": rules.len(),
            "rules": rules,
        })),
    )
        .into_response()
}
