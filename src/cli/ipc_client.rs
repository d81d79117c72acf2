//! Thin client for the Unix-socket IPC transport (spec §4.7, §6), used by
//! the control subcommands (`workers`, `merge`, `pause`, `resume`, `cancel`,
//! `kill-supervisor`) to talk to a running `codex-swarm run` process.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::domain::models::IpcMessage;

/// Send one request frame to `socket_path` and return the decoded reply.
///
/// Connects, writes a single terminated frame, and reads until the same
/// terminator appears in the response — mirroring `IpcServer`'s framing
/// exactly so a client built against this module interoperates with any
/// spec-conformant server, not just this crate's.
pub async fn request(
    socket_path: &str,
    terminator: &str,
    message_type: &str,
    payload: Value,
) -> Result<IpcMessage> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("failed to connect to ipc socket at {socket_path}"))?;

    let request = IpcMessage {
        message_type: message_type.to_string(),
        payload,
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now(),
        reply_to: None,
    };

    let mut frame = serde_json::to_string(&request)?;
    frame.push_str(terminator);
    stream.write_all(frame.as_bytes()).await?;

    // The server shares this connection's write half with a task that
    // rebroadcasts every bus event (`ipc_server.rs`'s `handle_connection`),
    // so an unsolicited `event` frame can land ahead of our own
    // `response`/`ack`. Skip anything that isn't the reply to this specific
    // request id.
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        while let Some(pos) = find_terminator(&buffer, terminator.as_bytes()) {
            let frame_bytes: Vec<u8> = buffer.drain(..pos + terminator.len()).collect();
            let frame_text = String::from_utf8_lossy(&frame_bytes[..frame_bytes.len() - terminator.len()])
                .into_owned();
            let reply: IpcMessage =
                serde_json::from_str(&frame_text).context("failed to parse ipc reply frame")?;
            if reply.message_type == "event" {
                continue;
            }
            if reply.reply_to.as_deref() != Some(request.id.as_str()) {
                continue;
            }
            return Ok(reply);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            bail!("ipc connection closed before a matching reply was received");
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn find_terminator(buffer: &[u8], terminator: &[u8]) -> Option<usize> {
    buffer.windows(terminator.len()).position(|window| window == terminator)
}
