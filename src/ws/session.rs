use chrono::{DateTime, Duration, Utc};

/// One collaborative grading session, scoped to a single assignment.
///
/// A session exists exactly as long as its roster is non-empty; the hub
/// removes it on last leave or when the idle sweep reclaims it.
#[derive(Debug, Clone)]
pub struct CollaborationSession {
    pub session_id: String,
    pub assignment_id: String,
    /// Roster in join order. Membership is per user identity, not per socket.
    pub active_users: Vec<String>,
    /// Advisory claim: the one grader currently editing the score.
    pub current_grader: Option<String>,
    pub last_activity: DateTime<Utc>,
}

impl CollaborationSession {
    pub fn new(assignment_id: &str) -> Self {
        Self {
            session_id: Self::session_id_for(assignment_id),
            assignment_id: assignment_id.to_string(),
            active_users: Vec::new(),
            current_grader: None,
            last_activity: Utc::now(),
        }
    }

    /// Session ids are derived deterministically from the assignment id so
    /// that every joiner of the same assignment lands in the same session.
    pub fn session_id_for(assignment_id: &str) -> String {
        format!("collab_{}", assignment_id)
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.active_users.iter().any(|u| u == user_id)
    }

    pub fn is_idle(&self, max_idle: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > max_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_derived_from_assignment() {
        assert_eq!(CollaborationSession::session_id_for("42"), "collab_42");
        let session = CollaborationSession::new("42");
        assert_eq!(session.session_id, "collab_42");
        assert_eq!(session.assignment_id, "42");
        assert!(session.active_users.is_empty());
        assert!(session.current_grader.is_none());
    }

    #[test]
    fn idle_test_compares_against_last_activity() {
        let mut session = CollaborationSession::new("42");
        session.last_activity = Utc::now() - Duration::seconds(7200);
        assert!(session.is_idle(Duration::seconds(3600), Utc::now()));
        session.touch();
        assert!(!session.is_idle(Duration::seconds(3600), Utc::now()));
    }
}
