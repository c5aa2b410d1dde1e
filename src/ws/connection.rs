use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender half of a connection's outbound queue. The hub enqueues encoded
/// JSON text here; a per-socket writer task drains it onto the wire.
pub type OutboundTx = mpsc::Sender<String>;

/// One live connection for an authenticated user.
///
/// At most one exists per user identity; a re-attach replaces (and thereby
/// closes) the previous one. The `conn_id` lets a replaced socket's teardown
/// recognize that it no longer owns the registry entry.
#[derive(Debug)]
pub struct UserConnection {
    pub conn_id: Uuid,
    pub user_id: String,
    pub role: String,
    pub course_id: Option<String>,
    pub assignment_id: Option<String>,
    pub joined_at: DateTime<Utc>,
    tx: OutboundTx,
}

impl UserConnection {
    pub fn new(user_id: &str, role: &str, tx: OutboundTx) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            role: role.to_string(),
            course_id: None,
            assignment_id: None,
            joined_at: Utc::now(),
            tx,
        }
    }

    /// Best-effort enqueue. Returns false when the socket is gone or its
    /// queue is full; either way the connection is treated as dead by the
    /// caller. Never blocks, so it is safe under the hub lock.
    pub fn send(&self, text: String) -> bool {
        self.tx.try_send(text).is_ok()
    }
}
