use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{
    collab_status, diagnostics, health_check, notify_course, ready_check, release_grader_lock,
    request_grader_lock,
};
use crate::routes::auth_middleware::auth_middleware;
use crate::ws::handler::{collaboration_ws, notifications_ws};
use crate::ws::hub::CollabHub;

/// Create API routes
pub fn create_api_routes(hub: Arc<CollabHub>) -> Router {
    Router::new()
        .route("/v1/collaboration/:assignment_id/status", get(collab_status))
        .route("/v1/collaboration/:assignment_id/lock", post(request_grader_lock))
        .route("/v1/collaboration/:assignment_id/unlock", post(release_grader_lock))
        .route("/v1/courses/:course_id/notify", post(notify_course))
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn(auth_middleware)) // Applies to all routes added above
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(hub)
}

/// Create WebSocket routes. The upgrade handlers authenticate themselves
/// because browsers pass the token as a query parameter.
pub fn create_ws_routes(hub: Arc<CollabHub>) -> Router {
    Router::new()
        .route("/ws/collaboration/:assignment_id", get(collaboration_ws))
        .route("/ws/notifications", get(notifications_ws))
        .with_state(hub)
}
