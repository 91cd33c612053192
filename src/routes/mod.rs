pub mod documents;
pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::auth::JwtSecret;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let jwt_secret = JwtSecret(state.jwt_secret.as_ref().clone());

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/users/{user_id}/document",
            get(documents::get_document).put(documents::put_document),
        )
        .route("/users/{user_id}/document/meta", get(documents::get_meta))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
