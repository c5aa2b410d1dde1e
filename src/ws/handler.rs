use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::auth;
use crate::config;
use crate::models::{ClientMessage, CollabEvent};
use crate::services::auth_service::{self, AuthUser};
use crate::ws::hub::CollabHub;

/// Browsers cannot set headers on a WebSocket upgrade, so the token may also
/// arrive as a query parameter.
#[derive(Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Collaborative grading WebSocket endpoint. Graders only.
pub async fn collaboration_ws(
    Path(assignment_id): Path<String>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    State(hub): State<Arc<CollabHub>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match auth_service::authenticate(&headers, query.token) {
        Ok(user) => user,
        Err(e) => {
            warn!("Rejected collaboration connection: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    if !auth::is_grader(&user.role) {
        warn!(
            "User {} ({}) is not allowed to join collaborative grading",
            user.user_id, user.role
        );
        return StatusCode::FORBIDDEN.into_response();
    }
    info!(
        "New collaboration connection for assignment {} from user {}",
        assignment_id, user.user_id
    );
    ws.on_upgrade(move |socket| handle_collaboration_socket(socket, assignment_id, user, hub))
}

/// Handle one collaboration connection for its whole lifetime.
async fn handle_collaboration_socket(
    socket: WebSocket,
    assignment_id: String,
    user: AuthUser,
    hub: Arc<CollabHub>,
) {
    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // The hub enqueues into this channel; the writer task below is the only
    // place that touches the network, so the hub lock never waits on a slow
    // client.
    let queue_size = config::get_config().send_queue_size;
    let (tx, mut rx) = mpsc::channel::<String>(queue_size);

    let conn_id = hub.attach(&user.user_id, &user.role, tx).await;
    let snapshot = hub.join_session(&user.user_id, &assignment_id).await;
    let session_id = snapshot.session_id.clone();

    // Roster snapshot goes straight to the joiner, not via broadcast
    hub.send_personal(&user.user_id, &CollabEvent::session_joined(&snapshot))
        .await;

    // Writer task: drain queued events onto the wire
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Reader task: decode inbound messages and route them
    let recv_hub = hub.clone();
    let recv_user = user.clone();
    let recv_assignment_id = assignment_id.clone();
    let recv_session_id = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                dispatch_inbound(
                    &recv_hub,
                    &recv_user,
                    &recv_assignment_id,
                    &recv_session_id,
                    &text,
                )
                .await;
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    hub.detach(&user.user_id, conn_id).await;
    info!(
        "Collaboration connection closed for user {} on session {}",
        user.user_id, session_id
    );
}

/// Decode an inbound text frame and route it.
///
/// Malformed JSON and known types with a bad payload are answered with an
/// error status to the originator only; types outside the vocabulary are
/// relayed verbatim to the session.
pub(crate) async fn dispatch_inbound(
    hub: &CollabHub,
    user: &AuthUser,
    assignment_id: &str,
    session_id: &str,
    raw: &str,
) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!("Malformed message from user {}: {}", user.user_id, e);
            hub.send_personal(
                &user.user_id,
                &CollabEvent::session_error(session_id, &format!("Malformed message: {}", e)),
            )
            .await;
            return;
        }
    };

    match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(msg) => handle_client_message(hub, user, assignment_id, session_id, msg).await,
        Err(e) => match value.get("type").and_then(Value::as_str) {
            Some(msg_type) if !ClientMessage::is_known_type(msg_type) => {
                debug!(
                    "Relaying unrecognized message type '{}' to session {}",
                    msg_type, session_id
                );
                hub.broadcast_raw(session_id, raw).await;
            }
            _ => {
                hub.send_personal(
                    &user.user_id,
                    &CollabEvent::session_error(session_id, &format!("Invalid payload: {}", e)),
                )
                .await;
            }
        },
    }
}

async fn handle_client_message(
    hub: &CollabHub,
    user: &AuthUser,
    assignment_id: &str,
    session_id: &str,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::GradeUpdate {
            criteria_scores,
            total_score,
            feedback,
        } => {
            hub.broadcast_to_session(
                session_id,
                &CollabEvent::grade_update(
                    assignment_id,
                    &user.user_id,
                    criteria_scores,
                    total_score,
                    feedback,
                ),
            )
            .await;
        }
        ClientMessage::CriteriaCommentUpdate {
            criteria_id,
            comment,
        } => {
            hub.broadcast_to_session(
                session_id,
                &CollabEvent::criteria_comment_update(
                    assignment_id,
                    &user.user_id,
                    criteria_id,
                    comment,
                ),
            )
            .await;
        }
        ClientMessage::FileAnnotationUpdate {
            file_id,
            annotation,
        } => {
            hub.broadcast_to_session(
                session_id,
                &CollabEvent::file_annotation_update(
                    assignment_id,
                    &user.user_id,
                    file_id,
                    annotation,
                ),
            )
            .await;
        }
        ClientMessage::RequestCurrentGrader => {
            let current_grader = hub.current_grader(session_id).await;
            let active_users = hub
                .active_users(session_id)
                .await
                .into_iter()
                .map(|u| u.user_id)
                .collect();
            hub.send_personal(
                &user.user_id,
                &CollabEvent::current_grader_info(current_grader.as_deref(), active_users),
            )
            .await;
        }
        ClientMessage::RequestGraderLock => {
            hub.set_current_grader(session_id, Some(&user.user_id)).await;
        }
        ClientMessage::ReleaseGraderLock => {
            hub.set_current_grader(session_id, None).await;
        }
        ClientMessage::SubscribeCourse { course_id } => {
            hub.update_tags(&user.user_id, Some(course_id.clone()), None)
                .await;
            hub.send_personal(&user.user_id, &CollabEvent::course_subscribed(&course_id))
                .await;
        }
        ClientMessage::SubscribeAssignment { assignment_id } => {
            hub.update_tags(&user.user_id, None, Some(assignment_id.clone()))
                .await;
            hub.send_personal(
                &user.user_id,
                &CollabEvent::assignment_subscribed(&assignment_id),
            )
            .await;
        }
    }
}

/// Notification WebSocket endpoint. Presence only; any authenticated user.
pub async fn notifications_ws(
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    State(hub): State<Arc<CollabHub>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match auth_service::authenticate(&headers, query.token) {
        Ok(user) => user,
        Err(e) => {
            warn!("Rejected notification connection: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    info!("New notification connection from user {}", user.user_id);
    ws.on_upgrade(move |socket| handle_notifications_socket(socket, user, hub))
}

async fn handle_notifications_socket(socket: WebSocket, user: AuthUser, hub: Arc<CollabHub>) {
    let (mut sender, mut receiver) = socket.split();
    let queue_size = config::get_config().send_queue_size;
    let (tx, mut rx) = mpsc::channel::<String>(queue_size);

    let conn_id = hub.attach(&user.user_id, &user.role, tx).await;
    hub.send_personal(
        &user.user_id,
        &CollabEvent::connection_established(&user.user_id, &user.role),
    )
    .await;

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_hub = hub.clone();
    let recv_user = user.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                handle_notification_message(&recv_hub, &recv_user, &text).await;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    hub.detach(&user.user_id, conn_id).await;
    info!("Notification connection closed for user {}", user.user_id);
}

/// Subscription updates are the only inbound traffic notification clients
/// send; anything else is ignored.
async fn handle_notification_message(hub: &CollabHub, user: &AuthUser, raw: &str) {
    match serde_json::from_str::<ClientMessage>(raw) {
        Ok(ClientMessage::SubscribeCourse { course_id }) => {
            hub.update_tags(&user.user_id, Some(course_id.clone()), None)
                .await;
            hub.send_personal(&user.user_id, &CollabEvent::course_subscribed(&course_id))
                .await;
        }
        Ok(ClientMessage::SubscribeAssignment { assignment_id }) => {
            hub.update_tags(&user.user_id, None, Some(assignment_id.clone()))
                .await;
            hub.send_personal(
                &user.user_id,
                &CollabEvent::assignment_subscribed(&assignment_id),
            )
            .await;
        }
        Ok(_) | Err(_) => {
            debug!(
                "Ignoring non-subscription message on notification connection of user {}",
                user.user_id
            );
        }
    }
}
