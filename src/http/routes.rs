use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route(
            "/rooms/:room/recording",
            post(handlers::start_recording).delete(handlers::stop_recording),
        )
        // Room queries
        .route("/rooms/:room", get(handlers::get_room_status))
        .route("/rooms/:room/recordings", get(handlers::list_recordings))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
