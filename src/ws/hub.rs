use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ActiveUser, CollabEvent, SessionSnapshot};

use super::connection::{OutboundTx, UserConnection};
use super::session::CollaborationSession;

/// Counters exposed by the diagnostics endpoint.
pub struct HubStats {
    pub n_conn: u32,
    pub n_sessions: u32,
    pub n_session_members: u32,
    pub n_locked_sessions: u32,
}

/// The shared collaboration state: connection registry, session store and
/// membership index. All transitions run under the hub's single lock; the
/// low write volume (human-paced grading) makes one coarse lock the right
/// trade against fine-grained parallelism.
#[derive(Default)]
struct HubState {
    /// user_id -> live connection (at most one per identity)
    connections: HashMap<String, UserConnection>,
    /// session_id -> session
    sessions: HashMap<String, CollaborationSession>,
    /// user_id -> ids of sessions the user belongs to. Derived index, always
    /// the inverse of the per-session rosters; used only to fan out cleanup
    /// on disconnect.
    user_sessions: HashMap<String, HashSet<String>>,
}

impl HubState {
    /// Enqueue `text` for one user. A closed or overflowing queue marks the
    /// connection dead and runs the full disconnect cascade.
    fn send_text(&mut self, user_id: &str, text: String) -> bool {
        let sent = match self.connections.get(user_id) {
            Some(conn) => conn.send(text),
            None => return false,
        };
        if !sent {
            warn!("Send to user {} failed, pruning connection", user_id);
            self.disconnect(user_id);
        }
        sent
    }

    /// Fan `text` out to the session roster. Members whose send fails (or who
    /// have no live connection) are disconnected in the same pass, which
    /// removes them from this and every other roster.
    fn broadcast(&mut self, session_id: &str, text: &str) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        let recipients = session.active_users.clone();
        let mut dead: Vec<String> = Vec::new();
        for user_id in recipients {
            // a cascade triggered below may already have shrunk the roster
            let still_member = self
                .sessions
                .get(session_id)
                .map_or(false, |s| s.is_member(&user_id));
            if !still_member {
                continue;
            }
            match self.connections.get(&user_id) {
                Some(conn) if conn.send(text.to_string()) => {}
                _ => dead.push(user_id),
            }
        }
        for user_id in dead {
            warn!("Broadcast to user {} failed, pruning connection", user_id);
            self.disconnect(&user_id);
        }
    }

    /// Remove the user's connection and leave every session the membership
    /// index names. Safe to call for users that are already gone.
    fn disconnect(&mut self, user_id: &str) {
        if self.connections.remove(user_id).is_some() {
            info!("User {} disconnected", user_id);
        }
        if let Some(session_ids) = self.user_sessions.remove(user_id) {
            for session_id in session_ids {
                self.leave(user_id, &session_id);
            }
        }
    }

    fn join(&mut self, user_id: &str, assignment_id: &str) -> SessionSnapshot {
        let session_id = CollaborationSession::session_id_for(assignment_id);
        let role = self
            .connections
            .get(user_id)
            .map(|c| c.role.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let session = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                info!("Created collaboration session {}", session_id);
                CollaborationSession::new(assignment_id)
            });
        if !session.is_member(user_id) {
            session.active_users.push(user_id.to_string());
        }
        session.touch();

        self.user_sessions
            .entry(user_id.to_string())
            .or_default()
            .insert(session_id.clone());

        info!("User {} joined collaboration session {}", user_id, session_id);
        self.broadcast(&session_id, &CollabEvent::user_joined(user_id, &role).encode());

        // The broadcast can prune the joiner itself when its queue is already
        // dead, taking the session with it. Hand back an empty snapshot then.
        self.snapshot(&session_id).unwrap_or_else(|| SessionSnapshot {
            session_id,
            assignment_id: assignment_id.to_string(),
            active_users: Vec::new(),
            current_grader: None,
            last_activity: Utc::now(),
        })
    }

    /// Leaving a session one is not in, or a session that does not exist, is
    /// a no-op; every cleanup path may call this redundantly.
    fn leave(&mut self, user_id: &str, session_id: &str) {
        if let Some(session_ids) = self.user_sessions.get_mut(user_id) {
            session_ids.remove(session_id);
        }

        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        if !session.is_member(user_id) {
            return;
        }
        session.active_users.retain(|u| u != user_id);
        session.touch();

        let grader_released = session.current_grader.as_deref() == Some(user_id);
        if grader_released {
            session.current_grader = None;
        }

        info!("User {} left collaboration session {}", user_id, session_id);
        if session.active_users.is_empty() {
            self.remove_session(session_id);
        } else {
            self.broadcast(session_id, &CollabEvent::user_left(user_id).encode());
            if grader_released {
                self.broadcast(
                    session_id,
                    &CollabEvent::current_grader_changed(None).encode(),
                );
            }
        }
    }

    /// Drop a session and scrub the membership index for any remaining
    /// members (the idle-sweep path deletes sessions with a live roster).
    fn remove_session(&mut self, session_id: &str) {
        if let Some(session) = self.sessions.remove(session_id) {
            for user_id in &session.active_users {
                if let Some(session_ids) = self.user_sessions.get_mut(user_id) {
                    session_ids.remove(session_id);
                }
            }
            debug!("Removed collaboration session {}", session_id);
        }
    }

    /// Set or clear the advisory grader claim. Last claim wins; releasing is
    /// not ownership-checked. No-op for sessions that do not exist.
    fn set_grader(&mut self, session_id: &str, grader: Option<&str>) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        session.current_grader = grader.map(str::to_string);
        session.touch();
        info!(
            "Current grader for session {} changed to {:?}",
            session_id, grader
        );
        self.broadcast(session_id, &CollabEvent::current_grader_changed(grader).encode());
    }

    fn active_users(&self, session_id: &str) -> Vec<ActiveUser> {
        let Some(session) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        session
            .active_users
            .iter()
            .filter_map(|user_id| {
                self.connections.get(user_id).map(|conn| ActiveUser {
                    user_id: user_id.clone(),
                    role: conn.role.clone(),
                    joined_at: conn.joined_at,
                })
            })
            .collect()
    }

    fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let session = self.sessions.get(session_id)?;
        Some(SessionSnapshot {
            session_id: session.session_id.clone(),
            assignment_id: session.assignment_id.clone(),
            active_users: self.active_users(session_id),
            current_grader: session.current_grader.clone(),
            last_activity: session.last_activity,
        })
    }
}

/// Long-lived shared-state object injected into every transport handler.
/// Constructed once in `main` and `Arc`-shared; there are no global
/// singletons behind it.
pub struct CollabHub {
    state: Mutex<HubState>,
}

impl Default for CollabHub {
    fn default() -> Self {
        Self::new()
    }
}

impl CollabHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState::default()),
        }
    }

    /// Register a connection for `user_id`, replacing (and closing) any
    /// previous one. Returns the connection id the owning socket task uses
    /// to detach later.
    pub async fn attach(&self, user_id: &str, role: &str, tx: OutboundTx) -> Uuid {
        let conn = UserConnection::new(user_id, role, tx);
        let conn_id = conn.conn_id;
        let mut state = self.state.lock().await;
        if state.connections.insert(user_id.to_string(), conn).is_some() {
            info!("Replacing existing connection for user {}", user_id);
        } else {
            info!("User {} ({}) connected", user_id, role);
        }
        conn_id
    }

    /// Tear down the connection identified by `conn_id` and cascade a leave
    /// through every session the user belongs to. A stale id (the socket was
    /// already replaced or pruned) is a no-op.
    pub async fn detach(&self, user_id: &str, conn_id: Uuid) {
        let mut state = self.state.lock().await;
        let owns_entry = state
            .connections
            .get(user_id)
            .map_or(false, |c| c.conn_id == conn_id);
        if owns_entry {
            state.disconnect(user_id);
        } else {
            debug!("Stale detach for user {} ignored", user_id);
        }
    }

    /// Join (idempotently) the session for `assignment_id`, creating it on
    /// first join, and broadcast `user_joined` to the roster. The returned
    /// snapshot is the joiner's direct reply.
    pub async fn join_session(&self, user_id: &str, assignment_id: &str) -> SessionSnapshot {
        self.state.lock().await.join(user_id, assignment_id)
    }

    pub async fn leave_session(&self, user_id: &str, session_id: &str) {
        self.state.lock().await.leave(user_id, session_id);
    }

    pub async fn set_current_grader(&self, session_id: &str, grader: Option<&str>) {
        self.state.lock().await.set_grader(session_id, grader);
    }

    pub async fn current_grader(&self, session_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(session_id)
            .and_then(|s| s.current_grader.clone())
    }

    pub async fn session_info(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.state.lock().await.snapshot(session_id)
    }

    pub async fn active_users(&self, session_id: &str) -> Vec<ActiveUser> {
        self.state.lock().await.active_users(session_id)
    }

    pub async fn broadcast_to_session(&self, session_id: &str, event: &CollabEvent) {
        self.state.lock().await.broadcast(session_id, &event.encode());
    }

    /// Relay an already-encoded payload to the session roster. Used for
    /// inbound messages outside the fixed vocabulary, which are forwarded
    /// verbatim rather than rejected.
    pub async fn broadcast_raw(&self, session_id: &str, text: &str) {
        self.state.lock().await.broadcast(session_id, text);
    }

    /// Best-effort unicast. Returns false when the connection is gone, after
    /// running the same cleanup as a detach.
    pub async fn send_personal(&self, user_id: &str, event: &CollabEvent) -> bool {
        self.state.lock().await.send_text(user_id, event.encode())
    }

    /// Fan an event out to every connection subscribed to `course_id` via
    /// its informational tags.
    pub async fn broadcast_to_course(&self, course_id: &str, event: &CollabEvent) {
        let text = event.encode();
        let mut state = self.state.lock().await;
        let subscribed: Vec<String> = state
            .connections
            .values()
            .filter(|c| c.course_id.as_deref() == Some(course_id))
            .map(|c| c.user_id.clone())
            .collect();
        for user_id in subscribed {
            state.send_text(&user_id, text.clone());
        }
    }

    /// Update a connection's subscription tags. Purely informational and
    /// independent of session membership.
    pub async fn update_tags(
        &self,
        user_id: &str,
        course_id: Option<String>,
        assignment_id: Option<String>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(conn) = state.connections.get_mut(user_id) {
            if course_id.is_some() {
                conn.course_id = course_id;
            }
            if assignment_id.is_some() {
                conn.assignment_id = assignment_id;
            }
        }
    }

    /// Delete sessions idle for longer than `max_idle_secs`. The idle
    /// condition is re-checked under the lock immediately before each
    /// deletion, so a session touched after the scan survives. Returns the
    /// number of sessions removed.
    pub async fn sweep_idle_sessions(&self, max_idle_secs: u64) -> usize {
        let max_idle = Duration::seconds(max_idle_secs as i64);
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let candidates: Vec<String> = state
            .sessions
            .values()
            .filter(|s| s.is_idle(max_idle, now))
            .map(|s| s.session_id.clone())
            .collect();
        let mut removed = 0;
        for session_id in candidates {
            let still_idle = state
                .sessions
                .get(&session_id)
                .map_or(false, |s| s.is_idle(max_idle, Utc::now()));
            if still_idle {
                state.remove_session(&session_id);
                info!("Swept idle collaboration session {}", session_id);
                removed += 1;
            }
        }
        removed
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        HubStats {
            n_conn: state.connections.len() as u32,
            n_sessions: state.sessions.len() as u32,
            n_session_members: state
                .sessions
                .values()
                .map(|s| s.active_users.len() as u32)
                .sum(),
            n_locked_sessions: state
                .sessions
                .values()
                .filter(|s| s.current_grader.is_some())
                .count() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc;

    async fn attach_user(
        hub: &CollabHub,
        user_id: &str,
        role: &str,
    ) -> (Uuid, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let conn_id = hub.attach(user_id, role, tx).await;
        (conn_id, rx)
    }

    fn next_event(rx: &mut mpsc::Receiver<String>) -> Value {
        let text = rx.try_recv().expect("expected a queued event");
        serde_json::from_str(&text).expect("event is valid JSON")
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(text) = rx.try_recv() {
            events.push(serde_json::from_str(&text).expect("event is valid JSON"));
        }
        events
    }

    #[tokio::test]
    async fn session_exists_iff_roster_is_nonempty() {
        let hub = CollabHub::new();
        let (_a, _rx_a) = attach_user(&hub, "alice", "professor").await;

        assert!(hub.session_info("collab_42").await.is_none());

        let snapshot = hub.join_session("alice", "42").await;
        assert_eq!(snapshot.session_id, "collab_42");
        assert_eq!(snapshot.active_users.len(), 1);
        assert!(hub.session_info("collab_42").await.is_some());

        hub.leave_session("alice", "collab_42").await;
        assert!(hub.session_info("collab_42").await.is_none());

        // redundant cleanup is silently successful
        hub.leave_session("alice", "collab_42").await;
        hub.leave_session("nobody", "collab_missing").await;
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let hub = CollabHub::new();
        let (_a, _rx_a) = attach_user(&hub, "alice", "ta").await;

        hub.join_session("alice", "42").await;
        let snapshot = hub.join_session("alice", "42").await;
        assert_eq!(snapshot.active_users.len(), 1);
        assert_eq!(snapshot.active_users[0].user_id, "alice");
    }

    #[tokio::test]
    async fn roster_tracks_join_and_leave_history() {
        let hub = CollabHub::new();
        let (_a, _rx_a) = attach_user(&hub, "alice", "professor").await;
        let (_b, _rx_b) = attach_user(&hub, "bob", "ta").await;

        hub.join_session("alice", "42").await;
        hub.join_session("bob", "42").await;
        let users = hub.active_users("collab_42").await;
        let ids: Vec<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);

        hub.leave_session("bob", "collab_42").await;
        let users = hub.active_users("collab_42").await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "alice");
    }

    #[tokio::test]
    async fn grader_claim_is_released_when_the_holder_leaves() {
        let hub = CollabHub::new();
        let (_a, mut rx_a) = attach_user(&hub, "alice", "professor").await;
        let (_b, mut rx_b) = attach_user(&hub, "bob", "ta").await;

        hub.join_session("alice", "42").await;
        hub.join_session("bob", "42").await;
        hub.set_current_grader("collab_42", Some("alice")).await;
        assert_eq!(hub.current_grader("collab_42").await.as_deref(), Some("alice"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.leave_session("alice", "collab_42").await;
        assert_eq!(hub.current_grader("collab_42").await, None);

        // bob sees the departure, then the implicit release, in that order
        let left = next_event(&mut rx_b);
        assert_eq!(left["type"], "user_left");
        assert_eq!(left["user_id"], "alice");
        let changed = next_event(&mut rx_b);
        assert_eq!(changed["type"], "current_grader_changed");
        assert!(changed["current_grader"].is_null());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn grader_claim_is_last_claim_wins() {
        let hub = CollabHub::new();
        let (_a, _rx_a) = attach_user(&hub, "alice", "professor").await;
        let (_b, _rx_b) = attach_user(&hub, "bob", "ta").await;
        hub.join_session("alice", "42").await;
        hub.join_session("bob", "42").await;

        hub.set_current_grader("collab_42", Some("alice")).await;
        hub.set_current_grader("collab_42", Some("bob")).await;
        assert_eq!(hub.current_grader("collab_42").await.as_deref(), Some("bob"));

        // release is not ownership-checked
        hub.set_current_grader("collab_42", None).await;
        assert_eq!(hub.current_grader("collab_42").await, None);

        // claiming on a nonexistent session is a no-op
        hub.set_current_grader("collab_99", Some("alice")).await;
        assert!(hub.session_info("collab_99").await.is_none());
    }

    #[tokio::test]
    async fn failed_send_prunes_the_member_during_the_broadcast_pass() {
        let hub = CollabHub::new();
        let (_a, mut rx_a) = attach_user(&hub, "alice", "professor").await;
        let (_b, rx_b) = attach_user(&hub, "bob", "ta").await;

        hub.join_session("alice", "42").await;
        hub.join_session("bob", "42").await;
        drain(&mut rx_a);
        drop(rx_b);

        hub.broadcast_to_session("collab_42", &CollabEvent::user_joined("probe", "ta"))
            .await;

        // alice got the probe; bob was pruned and alice saw him leave
        let events = drain(&mut rx_a);
        let types: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
        assert!(types.contains(&"user_joined"));
        assert!(types.contains(&"user_left"));

        let users = hub.active_users("collab_42").await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "alice");

        // a second broadcast no longer attempts delivery to bob
        hub.broadcast_to_session("collab_42", &CollabEvent::user_joined("probe2", "ta"))
            .await;
        let users = hub.active_users("collab_42").await;
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn detach_cascades_through_every_session() {
        let hub = CollabHub::new();
        let (conn_a, _rx_a) = attach_user(&hub, "alice", "professor").await;
        let (_b, mut rx_b) = attach_user(&hub, "bob", "ta").await;

        hub.join_session("alice", "42").await;
        hub.join_session("alice", "43").await;
        hub.join_session("bob", "42").await;
        hub.join_session("bob", "43").await;
        drain(&mut rx_b);

        hub.detach("alice", conn_a).await;

        for session_id in ["collab_42", "collab_43"] {
            let users = hub.active_users(session_id).await;
            assert_eq!(users.len(), 1, "alice must be gone from {}", session_id);
            assert_eq!(users[0].user_id, "bob");
        }
        // exactly one user_left per shared session
        let events = drain(&mut rx_b);
        let left: Vec<&Value> = events
            .iter()
            .filter(|e| e["type"] == "user_left" && e["user_id"] == "alice")
            .collect();
        assert_eq!(left.len(), 2);

        let stats = hub.stats().await;
        assert_eq!(stats.n_conn, 1);
    }

    #[tokio::test]
    async fn last_attach_wins_and_stale_detach_is_ignored() {
        let hub = CollabHub::new();
        let (old_conn, mut old_rx) = attach_user(&hub, "alice", "professor").await;
        let (new_conn, mut new_rx) = attach_user(&hub, "alice", "professor").await;
        assert_ne!(old_conn, new_conn);

        // the replaced sender was dropped, so the old queue reports closed
        assert!(old_rx.recv().await.is_none());

        // the replaced socket tearing down must not touch the fresh entry
        hub.detach("alice", old_conn).await;
        assert!(
            hub.send_personal("alice", &CollabEvent::user_joined("probe", "ta"))
                .await
        );
        assert_eq!(drain(&mut new_rx).len(), 1);

        hub.detach("alice", new_conn).await;
        assert!(
            !hub.send_personal("alice", &CollabEvent::user_joined("probe", "ta"))
                .await
        );
    }

    #[tokio::test]
    async fn idle_sweep_spares_recently_active_sessions() {
        let hub = CollabHub::new();
        let (_a, _rx_a) = attach_user(&hub, "alice", "professor").await;
        let (_b, _rx_b) = attach_user(&hub, "bob", "ta").await;
        hub.join_session("alice", "stale").await;
        hub.join_session("bob", "fresh").await;

        {
            let mut state = hub.state.lock().await;
            let session = state.sessions.get_mut("collab_stale").unwrap();
            session.last_activity = Utc::now() - Duration::seconds(7200);
        }

        let removed = hub.sweep_idle_sessions(3600).await;
        assert_eq!(removed, 1);
        assert!(hub.session_info("collab_stale").await.is_none());
        assert!(hub.session_info("collab_fresh").await.is_some());

        // membership index scrubbed: a later detach finds nothing to clean
        let state = hub.state.lock().await;
        assert!(state
            .user_sessions
            .get("alice")
            .map_or(true, |s| s.is_empty()));
    }

    #[tokio::test]
    async fn collaborative_grading_scenario() {
        let hub = CollabHub::new();

        // A joins: session created, roster [A]
        let (conn_a, mut rx_a) = attach_user(&hub, "A", "professor").await;
        let snapshot = hub.join_session("A", "42").await;
        assert_eq!(snapshot.session_id, "collab_42");
        assert_eq!(snapshot.active_users.len(), 1);

        // B joins: roster [A, B], A receives user_joined{B}
        let (_conn_b, mut rx_b) = attach_user(&hub, "B", "ta").await;
        hub.join_session("B", "42").await;
        drain(&mut rx_a)
            .iter()
            .find(|e| e["type"] == "user_joined" && e["user_id"] == "B")
            .expect("A must see B join");
        drain(&mut rx_b);

        // A claims: both receive current_grader_changed{A}
        hub.set_current_grader("collab_42", Some("A")).await;
        for rx in [&mut rx_a, &mut rx_b] {
            let event = next_event(rx);
            assert_eq!(event["type"], "current_grader_changed");
            assert_eq!(event["current_grader"], "A");
        }

        // A disconnects: B receives user_left{A} then current_grader_changed{null}
        hub.detach("A", conn_a).await;
        let events = drain(&mut rx_b);
        assert_eq!(events[0]["type"], "user_left");
        assert_eq!(events[0]["user_id"], "A");
        assert_eq!(events[1]["type"], "current_grader_changed");
        assert!(events[1]["current_grader"].is_null());
        assert_eq!(hub.active_users("collab_42").await.len(), 1);

        // B leaves: session gone
        hub.leave_session("B", "collab_42").await;
        assert!(hub.session_info("collab_42").await.is_none());
    }

    #[tokio::test]
    async fn course_broadcast_reaches_only_subscribed_connections() {
        let hub = CollabHub::new();
        let (_a, mut rx_a) = attach_user(&hub, "alice", "professor").await;
        let (_b, mut rx_b) = attach_user(&hub, "bob", "student").await;

        hub.update_tags("alice", Some("cs101".to_string()), None).await;
        hub.update_tags("bob", Some("cs202".to_string()), None).await;

        hub.broadcast_to_course("cs101", &CollabEvent::course_subscribed("cs101"))
            .await;
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_b).is_empty());
    }
}
