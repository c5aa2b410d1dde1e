use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::auth::auth;
use crate::models::{CollabEvent, ErrorResponse, NotifyRequest, NotifyResponse};
use crate::services::auth_service::AuthUser;
use crate::ws::hub::CollabHub;

/// Push a status update to every connection subscribed to a course.
/// Used by the CRUD layer for things like "grades published".
pub async fn notify_course(
    State(hub): State<Arc<CollabHub>>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
    Json(body): Json<NotifyRequest>,
) -> Result<(StatusCode, Json<NotifyResponse>), (StatusCode, Json<ErrorResponse>)> {
    auth::ensure_grader(&user.role)?;

    info!(
        "Course notification '{}' for {} sent by {}",
        body.status, course_id, user.user_id
    );
    let event = CollabEvent::session_status_update(
        &format!("course_{}", course_id),
        &body.status,
        body.details,
    );
    hub.broadcast_to_course(&course_id, &event).await;

    Ok((
        StatusCode::OK,
        Json(NotifyResponse {
            success: true,
            course_id,
        }),
    ))
}
