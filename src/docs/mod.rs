use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Collaboration session status
#[utoipa::path(
    get,
    path = "/api/v1/collaboration/{assignment_id}/status",
    params(
        ("assignment_id" = String, Path, description = "Assignment identifier")
    ),
    responses(
        (status = 200, description = "Session status, active or inactive", body = CollabStatusResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn collab_status_doc() {}

/// Claim the grader lock
#[utoipa::path(
    post,
    path = "/api/v1/collaboration/{assignment_id}/lock",
    params(
        ("assignment_id" = String, Path, description = "Assignment identifier")
    ),
    responses(
        (status = 200, description = "Lock claimed", body = GraderLockResponse),
        (status = 403, description = "Caller is not a grader", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn request_grader_lock_doc() {}

/// Release the grader lock
#[utoipa::path(
    post,
    path = "/api/v1/collaboration/{assignment_id}/unlock",
    params(
        ("assignment_id" = String, Path, description = "Assignment identifier")
    ),
    responses(
        (status = 200, description = "Lock released", body = GraderLockResponse)
    )
)]
#[allow(dead_code)]
pub async fn release_grader_lock_doc() {}

/// Notify course subscribers
#[utoipa::path(
    post,
    path = "/api/v1/courses/{course_id}/notify",
    params(
        ("course_id" = String, Path, description = "Course identifier")
    ),
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Notification sent", body = NotifyResponse),
        (status = 403, description = "Caller is not a grader", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn notify_course_doc() {}

/// Service diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics information", body = DiagnosticsResponse),
        (status = 403, description = "Admin access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        collab_status_doc,
        request_grader_lock_doc,
        release_grader_lock_doc,
        notify_course_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            CollabStatusResponse,
            GraderLockResponse,
            NotifyRequest,
            NotifyResponse,
            DiagnosticsResponse,
            ErrorResponse,
            ActiveUser,
        )
    ),
    tags(
        (name = "api", description = "Collaboration API endpoints")
    )
)]
pub struct ApiDoc;
