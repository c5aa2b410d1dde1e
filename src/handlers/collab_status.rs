use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::models::{CollabStatusResponse, ErrorResponse};
use crate::services::auth_service::AuthUser;
use crate::ws::hub::CollabHub;
use crate::ws::session::CollaborationSession;

/// Point-in-time status of an assignment's collaboration session.
/// An assignment nobody is grading reports `inactive`, not an error.
pub async fn collab_status(
    State(hub): State<Arc<CollabHub>>,
    Extension(user): Extension<AuthUser>,
    Path(assignment_id): Path<String>,
) -> Result<(StatusCode, Json<CollabStatusResponse>), (StatusCode, Json<ErrorResponse>)> {
    debug!(
        "Collaboration status for assignment {} requested by {}",
        assignment_id, user.user_id
    );
    let session_id = CollaborationSession::session_id_for(&assignment_id);

    let response = match hub.session_info(&session_id).await {
        Some(snapshot) => CollabStatusResponse {
            session_id: snapshot.session_id,
            assignment_id: snapshot.assignment_id,
            status: "active".to_string(),
            active_users: snapshot.active_users,
            current_grader: snapshot.current_grader,
            last_activity: Some(snapshot.last_activity),
        },
        None => CollabStatusResponse {
            session_id,
            assignment_id,
            status: "inactive".to_string(),
            active_users: Vec::new(),
            current_grader: None,
            last_activity: None,
        },
    };

    Ok((StatusCode::OK, Json(response)))
}
