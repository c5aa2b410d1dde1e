use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::error;

use crate::models::SessionSnapshot;

/// Outbound collaboration events, tagged by `type` on the wire.
///
/// Field names are part of the published client contract and stay snake_case.
/// Every event carries the timestamp of its construction.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollabEvent {
    UserJoined {
        user_id: String,
        role: String,
        timestamp: DateTime<Utc>,
    },
    UserLeft {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    GradeUpdate {
        assignment_id: String,
        user_id: String,
        criteria_scores: HashMap<String, i64>,
        total_score: f64,
        feedback: String,
        timestamp: DateTime<Utc>,
    },
    CriteriaCommentUpdate {
        assignment_id: String,
        user_id: String,
        criteria_id: String,
        comment: String,
        timestamp: DateTime<Utc>,
    },
    FileAnnotationUpdate {
        assignment_id: String,
        user_id: String,
        file_id: String,
        annotation: Value,
        timestamp: DateTime<Utc>,
    },
    CurrentGraderChanged {
        current_grader: Option<String>,
        timestamp: DateTime<Utc>,
    },
    CurrentGraderInfo {
        current_grader: Option<String>,
        active_users: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    SessionStatusUpdate {
        session_id: String,
        status: String,
        details: Value,
        timestamp: DateTime<Utc>,
    },
    ConnectionEstablished {
        user_id: String,
        role: String,
        timestamp: DateTime<Utc>,
    },
    CourseSubscribed {
        course_id: String,
        timestamp: DateTime<Utc>,
    },
    AssignmentSubscribed {
        assignment_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl CollabEvent {
    pub fn user_joined(user_id: &str, role: &str) -> Self {
        CollabEvent::UserJoined {
            user_id: user_id.to_string(),
            role: role.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_left(user_id: &str) -> Self {
        CollabEvent::UserLeft {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn grade_update(
        assignment_id: &str,
        user_id: &str,
        criteria_scores: HashMap<String, i64>,
        total_score: f64,
        feedback: String,
    ) -> Self {
        CollabEvent::GradeUpdate {
            assignment_id: assignment_id.to_string(),
            user_id: user_id.to_string(),
            criteria_scores,
            total_score,
            feedback,
            timestamp: Utc::now(),
        }
    }

    pub fn criteria_comment_update(
        assignment_id: &str,
        user_id: &str,
        criteria_id: String,
        comment: String,
    ) -> Self {
        CollabEvent::CriteriaCommentUpdate {
            assignment_id: assignment_id.to_string(),
            user_id: user_id.to_string(),
            criteria_id,
            comment,
            timestamp: Utc::now(),
        }
    }

    pub fn file_annotation_update(
        assignment_id: &str,
        user_id: &str,
        file_id: String,
        annotation: Value,
    ) -> Self {
        CollabEvent::FileAnnotationUpdate {
            assignment_id: assignment_id.to_string(),
            user_id: user_id.to_string(),
            file_id,
            annotation,
            timestamp: Utc::now(),
        }
    }

    pub fn current_grader_changed(current_grader: Option<&str>) -> Self {
        CollabEvent::CurrentGraderChanged {
            current_grader: current_grader.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn current_grader_info(current_grader: Option<&str>, active_users: Vec<String>) -> Self {
        CollabEvent::CurrentGraderInfo {
            current_grader: current_grader.map(str::to_string),
            active_users,
            timestamp: Utc::now(),
        }
    }

    pub fn session_status_update(session_id: &str, status: &str, details: Value) -> Self {
        CollabEvent::SessionStatusUpdate {
            session_id: session_id.to_string(),
            status: status.to_string(),
            details,
            timestamp: Utc::now(),
        }
    }

    /// Snapshot reply sent directly to a joiner, not broadcast.
    pub fn session_joined(snapshot: &SessionSnapshot) -> Self {
        Self::session_status_update(
            &snapshot.session_id,
            "session_joined",
            json!({
                "assignment_id": &snapshot.assignment_id,
                "active_users": &snapshot.active_users,
                "current_grader": &snapshot.current_grader,
            }),
        )
    }

    /// Protocol-error report, unicast to the originating connection only.
    pub fn session_error(session_id: &str, message: &str) -> Self {
        Self::session_status_update(session_id, "error", json!({ "error": message }))
    }

    pub fn connection_established(user_id: &str, role: &str) -> Self {
        CollabEvent::ConnectionEstablished {
            user_id: user_id.to_string(),
            role: role.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn course_subscribed(course_id: &str) -> Self {
        CollabEvent::CourseSubscribed {
            course_id: course_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn assignment_subscribed(assignment_id: &str) -> Self {
        CollabEvent::AssignmentSubscribed {
            assignment_id: assignment_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize for the wire. These types always serialize; a failure is a
    /// bug and is logged rather than propagated to the send path.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            error!("Failed to encode collaboration event: {}", e);
            "{}".to_string()
        })
    }
}

/// Inbound client messages, tagged by `type` on the wire.
///
/// Payload fields default to empty values when absent, matching the lenient
/// reads the clients rely on. Texts with an unrecognized type are not parsed
/// here at all; the dispatcher relays them verbatim to the session.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    GradeUpdate {
        #[serde(default)]
        criteria_scores: HashMap<String, i64>,
        #[serde(default)]
        total_score: f64,
        #[serde(default)]
        feedback: String,
    },
    CriteriaCommentUpdate {
        #[serde(default)]
        criteria_id: String,
        #[serde(default)]
        comment: String,
    },
    FileAnnotationUpdate {
        #[serde(default)]
        file_id: String,
        #[serde(default)]
        annotation: Value,
    },
    RequestCurrentGrader,
    RequestGraderLock,
    ReleaseGraderLock,
    SubscribeCourse {
        course_id: String,
    },
    SubscribeAssignment {
        assignment_id: String,
    },
}

impl ClientMessage {
    /// Whether `msg_type` belongs to the fixed inbound vocabulary.
    pub fn is_known_type(msg_type: &str) -> bool {
        matches!(
            msg_type,
            "grade_update"
                | "criteria_comment_update"
                | "file_annotation_update"
                | "request_current_grader"
                | "request_grader_lock"
                | "release_grader_lock"
                | "subscribe_course"
                | "subscribe_assignment"
        )
    }
}
