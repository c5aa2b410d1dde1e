use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::auth;
use crate::models::{ErrorResponse, GraderLockResponse};
use crate::services::auth_service::AuthUser;
use crate::ws::hub::CollabHub;
use crate::ws::session::CollaborationSession;

/// Claim the advisory grader lock for an assignment's session. Last claim
/// wins; participants see `current_grader_changed`.
pub async fn request_grader_lock(
    State(hub): State<Arc<CollabHub>>,
    Extension(user): Extension<AuthUser>,
    Path(assignment_id): Path<String>,
) -> Result<(StatusCode, Json<GraderLockResponse>), (StatusCode, Json<ErrorResponse>)> {
    auth::ensure_grader(&user.role)?;

    let session_id = CollaborationSession::session_id_for(&assignment_id);
    hub.set_current_grader(&session_id, Some(&user.user_id)).await;

    Ok((
        StatusCode::OK,
        Json(GraderLockResponse {
            success: true,
            message: "Grader lock acquired".to_string(),
            grader_id: Some(user.user_id),
            session_id,
        }),
    ))
}

/// Release the grader lock. Not ownership-checked: any participant may clear
/// the claim.
pub async fn release_grader_lock(
    State(hub): State<Arc<CollabHub>>,
    Extension(_user): Extension<AuthUser>,
    Path(assignment_id): Path<String>,
) -> Result<(StatusCode, Json<GraderLockResponse>), (StatusCode, Json<ErrorResponse>)> {
    let session_id = CollaborationSession::session_id_for(&assignment_id);
    hub.set_current_grader(&session_id, None).await;

    Ok((
        StatusCode::OK,
        Json(GraderLockResponse {
            success: true,
            message: "Grader lock released".to_string(),
            grader_id: None,
            session_id,
        }),
    ))
}
