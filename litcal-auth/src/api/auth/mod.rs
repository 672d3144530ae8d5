pub(crate) mod handlers;
pub(crate) mod models;

use crate::headers::no_store;
use crate::state::AppState;
use axum::middleware::map_response;
use axum::routing::{get, post};
use axum::Router;

/// Login, callback, refresh, me and logout routes, all marked uncacheable
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(handlers::login))
        .route("/auth/callback", get(handlers::callback))
        .route(
            "/auth/refresh",
            post(handlers::refresh).fallback(handlers::refresh_method_not_allowed),
        )
        .route("/auth/me", get(handlers::me))
        .route("/auth/logout", get(handlers::logout))
        .layer(map_response(no_store))
}

