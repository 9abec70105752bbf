//! Per-session WebSocket
//!
//! GET /ws/process/:session_id. The server pushes `{type, data, timestamp}`
//! frames for the job bound to the session; client text is logged and
//! ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use contentflow_common::{MessageKind, NotificationMessage};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::db::jobs;
use crate::models::JobStatus;
use crate::services::pipeline::status_snapshot;
use crate::services::ConnectionId;
use crate::AppState;

/// A registered session connection and the state it starts from
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub outbound: mpsc::UnboundedReceiver<NotificationMessage>,
    pub snapshot: Option<NotificationMessage>,
}

/// Register the connection, then read the job's persisted state
///
/// Registering first means every push from here on is queued, and the
/// snapshot is at least as new as anything pushed before registration.
pub async fn subscribe(state: &AppState, session_id: &str) -> Subscription {
    let (connection_id, outbound) = state.registry.open(session_id).await;

    let snapshot = match jobs::load_job_by_session(&state.db, session_id).await {
        Ok(job) => job.map(|job| status_snapshot(&job)),
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to load session snapshot");
            None
        }
    };

    Subscription {
        connection_id,
        outbound,
        snapshot,
    }
}

/// Drops queued messages older than what the client has already seen
///
/// Messages pushed between registration and the snapshot read can trail the
/// snapshot; they are skipped so progress never goes backwards, and nothing
/// follows a final state.
#[derive(Debug, Default)]
pub struct ProgressFilter {
    floor: i64,
    finished: bool,
}

impl ProgressFilter {
    pub fn starting_at(snapshot: Option<&NotificationMessage>) -> Self {
        let mut filter = Self::default();
        if let Some(snapshot) = snapshot {
            filter.observe(snapshot);
        }
        filter
    }

    /// Whether `message` should reach the client; updates the filter if so
    pub fn admit(&mut self, message: &NotificationMessage) -> bool {
        if self.finished {
            return false;
        }
        let progress = progress_of(message).unwrap_or(self.floor);
        if progress < self.floor {
            return false;
        }
        self.observe(message);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn observe(&mut self, message: &NotificationMessage) {
        if let Some(progress) = progress_of(message) {
            self.floor = self.floor.max(progress);
        }
        self.finished |= is_final(message);
    }
}

fn progress_of(message: &NotificationMessage) -> Option<i64> {
    message.data["progress_percent"].as_i64()
}

fn is_final(message: &NotificationMessage) -> bool {
    if matches!(message.kind, MessageKind::Complete | MessageKind::Error) {
        return true;
    }
    message.data["status"]
        .as_str()
        .and_then(|status| status.parse::<JobStatus>().ok())
        .is_some_and(|status| status.is_terminal())
}

/// GET /ws/process/:session_id
pub async fn process_socket(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let Subscription {
        connection_id,
        mut outbound,
        snapshot,
    } = subscribe(&state, &session_id).await;
    tracing::info!(session_id = %session_id, connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut filter = ProgressFilter::starting_at(snapshot.as_ref());

    if let Some(snapshot) = snapshot {
        if !send(&mut sender, &snapshot).await {
            state.registry.close(&session_id, connection_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    if !filter.admit(&message) {
                        tracing::debug!(
                            session_id = %session_id,
                            kind = message.kind.as_str(),
                            "Superseded message skipped"
                        );
                        continue;
                    }
                    if !send(&mut sender, &message).await {
                        break;
                    }
                }
                // Replaced by a newer connection for the same session
                None => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(session_id = %session_id, message = %text, "Client message ignored");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    state.registry.close(&session_id, connection_id).await;
    tracing::info!(session_id = %session_id, connection_id, "WebSocket disconnected");
}

async fn send<S>(sender: &mut S, message: &NotificationMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize notification");
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/process/:session_id", get(process_socket))
}
