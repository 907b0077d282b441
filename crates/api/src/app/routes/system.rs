use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::app::{AppServices, dto::MeResponse, errors};
use crate::context::CallerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me - profile of the current caller (anonymous callers included)
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> impl IntoResponse {
    let status = services.step_up.status(ctx.caller());
    Json(MeResponse::new(ctx.caller(), status))
}

/// POST /logout - drop the second-factor window of this session
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    match services.step_up.logout(ctx.caller()) {
        Ok(()) => Json(json!({ "status": "logged_out" })).into_response(),
        Err(e) => errors::step_up_error_to_response(&e),
    }
}
