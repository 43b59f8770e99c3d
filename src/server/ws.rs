use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use super::api::SharedState;
use crate::jobs::{JobEvent, JobId, JobStatus, JobStore};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Progress stream for one job.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, id, state))
}

async fn handle_socket(socket: WebSocket, id: String, state: SharedState) {
    let (mut sender, receiver) = socket.split();
    // Subscribe before reading the current status so no change is missed.
    let rx = state.store().subscribe();

    let current = id.parse::<JobId>().ok().and_then(|id| state.store().status(&id).map(|s| (id, s)));
    let Some((id, status)) = current else {
        let _ = sender.send(Message::Text(not_found_frame().into())).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    if sender.send(Message::Text(status_frame(&status).into())).await.is_err() {
        return;
    }
    if status.is_terminal() {
        let _ = sender.send(Message::Close(None)).await;
        return;
    }
    run_socket_loop(sender, receiver, rx, state.store().clone(), id).await;
}

fn status_frame(status: &JobStatus) -> String {
    serde_json::to_string(status).unwrap_or_else(|_| format!("{{\"status\":\"{}\"}}", status.as_str()))
}

fn not_found_frame() -> String {
    serde_json::json!({"status": "not_found"}).to_string()
}

/// Forward this job's status changes with ping/pong keepalive.
///
/// Exits after a terminal status is sent, when the client goes away, or if
/// no Pong arrives within [`PONG_TIMEOUT`] of a Ping.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<JobEvent>,
    store: JobStore,
    id: JobId,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!(job_id = %id, "websocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(event) if event.job_id == id => {
                        if sender.send(Message::Text(status_frame(&event.status).into())).await.is_err() {
                            break;
                        }
                        if event.status.is_terminal() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(job_id = %id, skipped, "websocket subscriber lagged");
                        // The terminal event may have been dropped.
                        if let Some(status) = store.status(&id).filter(JobStatus::is_terminal) {
                            let _ = sender.send(Message::Text(status_frame(&status).into())).await;
                            break;
                        }
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}
