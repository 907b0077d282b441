use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use astrocat_auth::{AuthzError, DenialKind, StepUpError};

pub fn authz_error_to_response(err: &AuthzError) -> axum::response::Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::FORBIDDEN);
    let code = match err.kind() {
        DenialKind::Unauthenticated => "unauthenticated",
        DenialKind::UnmappedAction => "unmapped_action",
        DenialKind::MissingPredicate => "forbidden",
        DenialKind::SecondFactorRequired => "second_factor_required",
        DenialKind::SecondFactorExpired => "second_factor_expired",
    };
    json_error(status, code, err.to_string())
}

pub fn step_up_error_to_response(err: &StepUpError) -> axum::response::Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        StepUpError::Unauthenticated => json_error(status, "unauthenticated", err.to_string()),
        StepUpError::ProfileNotFound => json_error(status, "not_found", err.to_string()),
        StepUpError::InvalidCode => (
            status,
            axum::Json(json!({
                "status": "error",
                "message": "invalid code",
            })),
        )
            .into_response(),
        StepUpError::Totp(_) | StepUpError::Directory(_) | StepUpError::Sessions(_) => {
            tracing::warn!(error = %err, "step-up failed");
            json_error(status, "internal_error", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
