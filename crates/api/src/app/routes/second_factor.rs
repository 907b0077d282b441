//! TOTP enrollment and second-factor verification.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, post},
};

use astrocat_auth::StepUpError;

use crate::app::{
    AppServices,
    dto::{EnrollResponse, VerifyCodeRequest, VerifyResponse},
    errors,
};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/enroll", post(enroll))
        .route("/verify", post(verify))
        .route("/status", get(status))
}

/// POST /second-factor/enroll - issue a new TOTP secret, replacing any old one
pub async fn enroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    match services.step_up.issue_totp(ctx.caller()) {
        Ok(descriptor) => Json(EnrollResponse::from(descriptor)).into_response(),
        Err(e) => errors::step_up_error_to_response(&e),
    }
}

/// POST /second-factor/verify - check a TOTP code for this session
///
/// Unreadable bodies are answered like a wrong code.
pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    body: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> axum::response::Response {
    let code = match body {
        Ok(Json(req)) => req.code,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable verify request");
            if !ctx.is_authenticated() {
                return errors::step_up_error_to_response(&StepUpError::Unauthenticated);
            }
            return errors::step_up_error_to_response(&StepUpError::InvalidCode);
        }
    };

    match services.step_up.verify_totp(ctx.caller(), &code) {
        Ok(verified) => Json(VerifyResponse::from(verified)).into_response(),
        Err(e) => errors::step_up_error_to_response(&e),
    }
}

/// GET /second-factor/status
pub async fn status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> impl IntoResponse {
    Json(services.step_up.status(ctx.caller()))
}
