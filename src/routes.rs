// routes.rs
use axum::{
    routing::{get, post},
    Router,
};
use http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::VOTER_SESSION_HEADER;
use crate::handlers;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/polls", get(handlers::list_polls).post(handlers::create_poll))
        .route(
            "/polls/{id}",
            get(handlers::get_poll)
                .put(handlers::update_poll)
                .delete(handlers::delete_poll),
        )
        .route(
            "/polls/{id}/vote",
            post(handlers::cast_vote).get(handlers::vote_status),
        )
        .route("/polls/{id}/results", get(handlers::poll_results))
        .route("/profile", get(handlers::current_profile));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Restricts to `origin` when given, otherwise allows any origin.
pub fn cors_layer(origin: Option<&HeaderValue>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(VOTER_SESSION_HEADER),
        ]);

    match origin {
        Some(origin) => layer.allow_origin(origin.clone()),
        None => layer.allow_origin(Any),
    }
}
