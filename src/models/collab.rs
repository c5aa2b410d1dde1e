use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// One participant of a collaboration session, as exposed to clients.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ActiveUser {
    pub user_id: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// Point-in-time view of a collaboration session.
/// Returned to joiners and to the REST status endpoint; never a live handle.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub assignment_id: String,
    pub active_users: Vec<ActiveUser>,
    pub current_grader: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// Response for the collaboration status endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CollabStatusResponse {
    pub session_id: String,
    pub assignment_id: String,
    pub status: String,
    pub active_users: Vec<ActiveUser>,
    pub current_grader: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Response for the grader lock/unlock endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct GraderLockResponse {
    pub success: bool,
    pub message: String,
    pub grader_id: Option<String>,
    pub session_id: String,
}

/// Request body for a course-wide notification
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NotifyRequest {
    pub status: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: Value,
}

/// Response for a course-wide notification
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NotifyResponse {
    pub success: bool,
    pub course_id: String,
}
