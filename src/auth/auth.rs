use axum::{http::StatusCode, Json};

use crate::models::ErrorResponse;

/// Roles allowed to participate in collaborative grading.
const GRADER_ROLES: &[&str] = &["professor", "ta"];

const ADMIN_ROLE: &str = "admin";

pub fn is_grader(role: &str) -> bool {
    GRADER_ROLES.contains(&role)
}

pub fn is_admin(role: &str) -> bool {
    role == ADMIN_ROLE
}

pub fn ensure_grader(role: &str) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_grader(role) {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error: "Grader access required".to_string(),
    })))
}

pub fn ensure_admin(role: &str) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(role) {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error: "Admin access required".to_string(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_professors_and_tas_are_graders() {
        assert!(is_grader("professor"));
        assert!(is_grader("ta"));
        assert!(!is_grader("student"));
        assert!(!is_grader("admin"));
        assert!(ensure_grader("ta").is_ok());
        assert!(ensure_grader("student").is_err());
    }

    #[test]
    fn only_admins_pass_the_admin_check() {
        assert!(ensure_admin("admin").is_ok());
        assert!(ensure_admin("professor").is_err());
    }
}
