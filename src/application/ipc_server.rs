//! Unix-domain-socket IPC transport (spec §4.7, §6).
//!
//! Frames are UTF-8 JSON objects terminated by a configurable multi-byte
//! sentinel rather than framed by length, matching the wire format named in
//! the external interfaces section. Every non-`log` bus event is broadcast
//! to every connected client as an unsolicited `event` frame.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, instrument, warn};

use crate::domain::error::OrchestratorError;
use crate::domain::models::IpcMessage;

use super::event_bus::EventBus;

/// Control request types that reply with `ack` rather than `response`.
const CONTROL_TYPES: &[&str] = &["pause_queue", "resume_queue", "cancel_worker", "kill_supervisor"];

/// Handles one decoded IPC request and returns its reply payload.
///
/// Implemented by the top-level `Orchestrator`, which owns routing to
/// `WorkerManager` / `StrategyEngine` / `MergeCoordinator`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle `message_type` with the given `payload`, returning either the
    /// reply payload or a human-readable error message.
    async fn handle_request(&self, message_type: &str, payload: Value) -> Result<Value, String>;
}

/// Serves the Unix-socket IPC transport: one task per connection for
/// request/response, plus one subtask per connection rebroadcasting bus
/// events.
pub struct IpcServer {
    socket_path: String,
    terminator: String,
    events: Arc<EventBus>,
    handler: Arc<dyn RequestHandler>,
    budget_warnings: broadcast::Sender<Value>,
}

impl IpcServer {
    /// Build a server bound to `socket_path`, framing with `terminator`.
    #[must_use]
    pub fn new(
        socket_path: impl Into<String>,
        terminator: impl Into<String>,
        events: Arc<EventBus>,
        handler: Arc<dyn RequestHandler>,
    ) -> Self {
        let (budget_warnings, _) = broadcast::channel(16);
        Self {
            socket_path: socket_path.into(),
            terminator: terminator.into(),
            events,
            handler,
            budget_warnings,
        }
    }

    /// Broadcast a `budget_warning` event frame directly to every connected
    /// client, bypassing the generic event-bus relay (spec §4.7: "sent over
    /// IPC only, not through the generic subscriber queues").
    pub fn notify_budget_warning(&self, snapshot: Value) {
        let _ = self.budget_warnings.send(snapshot);
    }

    /// Bind the socket (removing any stale file first) and serve
    /// connections until `shutdown` resolves. Removes the socket file on
    /// return (spec §5: "the IPC socket path ... must be cleaned up on
    /// start and stop").
    #[instrument(skip(self, shutdown))]
    pub async fn serve(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<(), OrchestratorError> {
        let _ = tokio::fs::remove_file(&self.socket_path).await;
        let listener = UnixListener::bind(&self.socket_path).map_err(|source| {
            OrchestratorError::IpcBindFailed {
                path: self.socket_path.clone(),
                source,
            }
        })?;
        info!(path = %self.socket_path, "ipc server listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let terminator = self.terminator.clone();
                            let events = self.events.clone();
                            let handler = self.handler.clone();
                            let budget_warnings = self.budget_warnings.subscribe();
                            tokio::spawn(async move {
                                handle_connection(stream, terminator, events, handler, budget_warnings).await;
                            });
                        }
                        Err(e) => warn!(error = %e, "failed to accept ipc connection"),
                    }
                }
                () = &mut shutdown => break,
            }
        }

        let _ = tokio::fs::remove_file(&self.socket_path).await;
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    terminator: String,
    events: Arc<EventBus>,
    handler: Arc<dyn RequestHandler>,
    mut budget_warnings: broadcast::Receiver<Value>,
) {
    let (mut read_half, write_half) = stream.into_split();
    let write_half = Arc::new(Mutex::new(write_half));

    let broadcast_write = write_half.clone();
    let mut rx = events.subscribe();
    let broadcast_terminator = terminator.clone();
    let broadcaster = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(_) => break,
                    };
                    if !event.payload.is_ipc_broadcastable() {
                        continue;
                    }
                    let frame = IpcMessage::event(
                        event.event_type(),
                        serde_json::to_value(&event.payload).unwrap_or(Value::Null),
                    );
                    if write_frame(&broadcast_write, &frame, &broadcast_terminator).await.is_err() {
                        break;
                    }
                }
                warning = budget_warnings.recv() => {
                    let snapshot = match warning {
                        Ok(snapshot) => snapshot,
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    };
                    let frame = IpcMessage::event("budget_warning", snapshot);
                    if write_frame(&broadcast_write, &frame, &broadcast_terminator).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = match read_half.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);
        while let Some(pos) = find_terminator(&buffer, terminator.as_bytes()) {
            let frame_bytes: Vec<u8> = buffer.drain(..pos + terminator.len()).collect();
            let frame_text = String::from_utf8_lossy(&frame_bytes[..frame_bytes.len() - terminator.len()]);
            let reply = process_frame(&frame_text, handler.as_ref()).await;
            if write_frame(&write_half, &reply, &terminator).await.is_err() {
                broadcaster.abort();
                return;
            }
        }
    }
    broadcaster.abort();
}

fn find_terminator(buffer: &[u8], terminator: &[u8]) -> Option<usize> {
    buffer
        .windows(terminator.len())
        .position(|window| window == terminator)
}

async fn process_frame(frame_text: &str, handler: &dyn RequestHandler) -> IpcMessage {
    let request: IpcMessage = match serde_json::from_str(frame_text) {
        Ok(msg) => msg,
        Err(e) => return IpcMessage::error(format!("malformed frame: {e}"), None),
    };

    match handler.handle_request(&request.message_type, request.payload.clone()).await {
        Ok(payload) => {
            if CONTROL_TYPES.contains(&request.message_type.as_str()) {
                IpcMessage::ack(&request.id, payload)
            } else {
                IpcMessage::response(&request.id, payload)
            }
        }
        Err(message) => IpcMessage::error(message, Some(request.id)),
    }
}

async fn write_frame(
    write_half: &Arc<Mutex<tokio::net::unix::OwnedWriteHalf>>,
    frame: &IpcMessage,
    terminator: &str,
) -> std::io::Result<()> {
    let mut serialized = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    serialized.push_str(terminator);
    let mut guard = write_half.lock().await;
    guard.write_all(serialized.as_bytes()).await
}

/// In-memory fake used by unit tests and by components that want to
/// exercise request routing without a real socket.
#[derive(Default)]
pub struct FakeRequestHandler {
    responses: HashMap<String, Value>,
}

impl FakeRequestHandler {
    /// Register a canned response for `message_type`.
    #[must_use]
    pub fn with_response(mut self, message_type: impl Into<String>, response: Value) -> Self {
        self.responses.insert(message_type.into(), response);
        self
    }
}

#[async_trait]
impl RequestHandler for FakeRequestHandler {
    async fn handle_request(&self, message_type: &str, _payload: Value) -> Result<Value, String> {
        self.responses
            .get(message_type)
            .cloned()
            .ok_or_else(|| format!("no handler registered for {message_type}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_terminator_locates_sentinel_across_chunks() {
        let buffer = b"{\"type\":\"x\"}\n---MSG_END---\nleftover";
        let pos = find_terminator(buffer, b"\n---MSG_END---\n");
        assert_eq!(pos, Some(12));
    }

    #[tokio::test]
    async fn process_frame_routes_dispatch_style_request_to_response() {
        let handler = FakeRequestHandler::default()
            .with_response("check_workers", serde_json::json!({"workers": []}));
        let frame = r#"{"type":"check_workers","id":"abc","payload":{}}"#;
        let reply = process_frame(frame, &handler).await;
        assert_eq!(reply.message_type, "response");
        assert_eq!(reply.reply_to.as_deref(), Some("abc"));
        assert_eq!(reply.payload["workers"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn process_frame_routes_control_request_to_ack() {
        let handler = FakeRequestHandler::default()
            .with_response("pause_queue", serde_json::json!({}));
        let frame = r#"{"type":"pause_queue","id":"xyz"}"#;
        let reply = process_frame(frame, &handler).await;
        assert_eq!(reply.message_type, "ack");
    }

    #[tokio::test]
    async fn process_frame_on_malformed_json_yields_error_not_panic() {
        let handler = FakeRequestHandler::default();
        let reply = process_frame("not json", &handler).await;
        assert_eq!(reply.message_type, "error");
    }

    #[tokio::test]
    async fn process_frame_on_unhandled_type_yields_error_with_reply_to() {
        let handler = FakeRequestHandler::default();
        let frame = r#"{"type":"check_workers","id":"abc"}"#;
        let reply = process_frame(frame, &handler).await;
        assert_eq!(reply.message_type, "error");
        assert_eq!(reply.reply_to.as_deref(), Some("abc"));
    }
}
