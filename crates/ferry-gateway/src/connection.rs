use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ferry_agent::{Agent, Session, SharedConversation};
use ferry_core::error::FerryError;
use ferry_core::output::{OutputEvent, OutputSink};

use crate::lane::LaneQueue;
use crate::protocol::{parse_frame, ClientRequest};
use crate::sink::WebSocketSink;
use crate::state::AppState;

/// Handle a single WebSocket connection for its whole lifetime.
pub async fn handle_connection(ws: WebSocket, state: Arc<AppState>) {
    let session = state.sessions.new_session();
    let cancel = state.shutdown.child_token();
    info!(session = %session.id, "Session opened");

    let (ws_tx, mut ws_rx) = ws.split();
    let ws_tx = Arc::new(Mutex::new(ws_tx));
    let sink: Arc<dyn OutputSink> = Arc::new(WebSocketSink::new(ws_tx.clone()));

    let (lane, mut lane_rx) = LaneQueue::new(32);
    let lane_task = tokio::spawn({
        let agent = state.agent.clone();
        let session = session.clone();
        let sink = sink.clone();
        let cancel = cancel.clone();
        let incomplete_prompt = state.incomplete_prompt.clone();
        async move {
            while let Some(request) = lane_rx.recv().await {
                if cancel.is_cancelled() {
                    break;
                }
                process_request(request, &agent, &session, &sink, &cancel, &incomplete_prompt).await;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match parse_frame(&text) {
                Ok(request) => {
                    debug!(session = %session.id, kind = request.kind(), "Frame queued");
                    if !lane.push(request).await {
                        break;
                    }
                }
                Err(reason) => {
                    warn!(session = %session.id, reason = %reason, "Rejected frame");
                    sink.emit(OutputEvent::Error(reason)).await;
                }
            },
            Message::Binary(_) => {
                sink.emit(OutputEvent::Error("binary frames are not supported".into()))
                    .await;
            }
            Message::Close(_) => break,
            Message::Ping(data) => {
                let mut tx = ws_tx.lock().await;
                if let Err(e) = tx.send(Message::Pong(data)).await {
                    debug!(session = %session.id, error = %e, "Pong failed, closing");
                    break;
                }
            }
            Message::Pong(_) => {}
        }
    }

    cancel.cancel();
    lane_task.abort();
    state.sessions.delete_session(&session.id);
    info!(session = %session.id, "Session closed");
}

async fn process_request(
    request: ClientRequest,
    agent: &Agent,
    session: &Session,
    sink: &Arc<dyn OutputSink>,
    cancel: &CancellationToken,
    incomplete_prompt: &str,
) {
    match request {
        ClientRequest::Message(text) => {
            let conversation = session.new_conversation(text, sink.clone(), incomplete_prompt);
            run_turn(agent, conversation, sink, cancel).await;
        }
        ClientRequest::Acknowledge(content) => {
            if content.is_empty() || content == "cancel" {
                debug!(session = %session.id, "Acknowledgement declined");
                return;
            }
            let Some(conversation) = session.latest_conversation() else {
                sink.emit(OutputEvent::Error("conversation not found".into())).await;
                return;
            };
            conversation.lock().await.acknowledge();
            run_turn(agent, conversation, sink, cancel).await;
        }
    }
}

async fn run_turn(
    agent: &Agent,
    conversation: SharedConversation,
    sink: &Arc<dyn OutputSink>,
    cancel: &CancellationToken,
) {
    let mut conversation = conversation.lock().await;
    match agent.run(&mut conversation, cancel).await {
        Ok(report) => debug!(
            conversation = %conversation.id,
            steps = report.steps.len(),
            paused = report.paused(),
            elapsed_ms = report.elapsed_ms,
            "Turn finished"
        ),
        Err(FerryError::Cancelled) => {
            info!(conversation = %conversation.id, "Turn cancelled");
        }
        Err(e) => {
            error!(conversation = %conversation.id, error = %e, "Turn aborted");
            sink.emit(OutputEvent::Error(e.to_string())).await;
        }
    }
}
