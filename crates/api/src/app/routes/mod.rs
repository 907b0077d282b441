use axum::{
    Router,
    routing::{get, post},
};

pub mod authz;
pub mod second_factor;
pub mod system;

/// Router for every endpoint that runs behind the auth middleware.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .route("/logout", post(system::logout))
        .nest("/second-factor", second_factor::router())
        .nest("/authz", authz::router())
}
