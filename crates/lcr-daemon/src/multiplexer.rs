// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-transport connection service: one reader loop, one writer task
//! draining the bounded send queue, one heartbeat timer. The reader loop
//! owns the connection's fate; everything else follows it down.

use crate::connection::TransportState;
use crate::dispatch;
use crate::runtime::Runtime;
use crate::transport::DuplexTransport;
use lcr_core::{format_elapsed_ms, Clock, IdGen};
use lcr_wire::{error_payload, ErrorKind, Message, ProtocolError, SYSTEM_COMPONENT_ID};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Why the reader loop ended; decides whether orphaned components get the
/// reconnect grace period.
enum CloseCause {
    /// The transport dropped (EOF or I/O error). Reconnect tolerance is
    /// for exactly this, so grace applies.
    TransportDropped,
    /// Server-terminated: the client was idle past the window or spent its
    /// bad-frame budget. It is not coming right back; clean up now.
    ServerTerminated,
}

/// Serves one accepted transport until it closes, then hands every mounted
/// component to cleanup.
pub async fn serve<C, G, T>(runtime: Arc<Runtime<C, G>>, transport: T)
where
    C: Clock,
    G: IdGen + 'static,
    T: DuplexTransport,
{
    let connection = match runtime.register_connection() {
        Ok(connection) => connection,
        Err(e) => {
            warn!(error = %e, "rejecting connection");
            let (_reader, mut writer) = transport.into_split();
            let mut refusal = runtime.frame("error", SYSTEM_COMPONENT_ID);
            refusal.error = Some(ErrorKind::QueueOverflow.to_string());
            refusal.payload = error_payload(ErrorKind::QueueOverflow, e.to_string(), None);
            let _ = lcr_wire::write_message(&mut writer, &refusal, Duration::from_secs(1)).await;
            return;
        }
    };
    let (mut reader, mut writer) = transport.into_split();
    connection.set_state(TransportState::Open);
    info!(client_id = %connection.client_id, "connection open");

    let mut welcome = runtime.frame("welcome", SYSTEM_COMPONENT_ID);
    welcome.payload = json!({
        "client_id": connection.client_id.as_str(),
        "server_time": runtime.clock().now_ms(),
    });
    connection.enqueue(welcome, true);

    let writer_task = {
        let connection = Arc::clone(&connection);
        let write_timeout = Duration::from_millis(runtime.config().connection.drain_grace_ms.max(1_000));
        tokio::spawn(async move {
            loop {
                match connection.send_queue.pop() {
                    Some(frame) => {
                        if let Err(e) = lcr_wire::write_message(&mut writer, &frame.message, write_timeout).await {
                            debug!(client_id = %connection.client_id, error = %e, "write failed");
                            break;
                        }
                    }
                    None if connection.send_queue.is_closed() => break,
                    None => connection.send_queue.notified().await,
                }
            }
        })
    };

    let heartbeat_task = {
        let connection = Arc::clone(&connection);
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move {
            let period = Duration::from_millis(runtime.config().connection.heartbeat_interval_ms.max(1));
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        let heartbeat = runtime.frame("heartbeat", SYSTEM_COMPONENT_ID);
                        connection.enqueue(heartbeat, false);
                    }
                    _ = connection.closed_notified() => break,
                }
            }
        })
    };

    let cause = read_loop(&runtime, &connection, &mut reader).await;

    // drain outstanding replies, bounded, then let the writer finish
    connection.set_state(TransportState::Closing);
    let drain_deadline =
        tokio::time::Instant::now() + Duration::from_millis(runtime.config().connection.drain_grace_ms);
    while !connection.send_queue.is_empty() && tokio::time::Instant::now() < drain_deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    connection.send_queue.close();
    let _ = writer_task.await;
    heartbeat_task.abort();

    let with_grace = matches!(cause, CloseCause::TransportDropped);
    runtime.connection_closed(&connection, with_grace).await;
    info!(client_id = %connection.client_id, with_grace, "connection closed");
}

async fn read_loop<C, G, R>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<crate::connection::Connection>,
    reader: &mut R,
) -> CloseCause
where
    C: Clock,
    G: IdGen + 'static,
    R: tokio::io::AsyncRead + Unpin,
{
    let config = runtime.config().connection.clone();
    let idle = Duration::from_millis(config.idle_timeout_ms);

    loop {
        let bytes = match tokio::time::timeout(idle, lcr_wire::read_frame(reader)).await {
            Err(_) => {
                let window = format_elapsed_ms(config.idle_timeout_ms);
                let mut notice = runtime.frame("error", SYSTEM_COMPONENT_ID);
                notice.error = Some(ErrorKind::IdleTimeout.to_string());
                notice.payload =
                    error_payload(ErrorKind::IdleTimeout, format!("no inbound frames in {window}"), None);
                connection.enqueue(notice, true);
                warn!(client_id = %connection.client_id, %window, "idle timeout");
                return CloseCause::ServerTerminated;
            }
            Ok(Err(ProtocolError::ConnectionClosed)) => {
                debug!(client_id = %connection.client_id, "peer closed");
                return CloseCause::TransportDropped;
            }
            Ok(Err(ProtocolError::FrameTooLarge { size, max })) => {
                // the stream is no longer in sync with the framing; there
                // is nothing to resynchronize against
                let mut notice = runtime.frame("error", SYSTEM_COMPONENT_ID);
                notice.error = Some(ErrorKind::BadFrame.to_string());
                notice.payload = error_payload(
                    ErrorKind::BadFrame,
                    format!("frame of {size} bytes exceeds the {max} byte limit"),
                    None,
                );
                connection.enqueue(notice, true);
                return CloseCause::ServerTerminated;
            }
            Ok(Err(e)) => {
                debug!(client_id = %connection.client_id, error = %e, "read failed");
                return CloseCause::TransportDropped;
            }
            Ok(Ok(bytes)) => bytes,
        };

        let now = runtime.clock().now_ms();
        match lcr_wire::decode::<Message>(&bytes) {
            Ok(frame) => {
                connection.record_inbound(now);
                dispatch::handle_frame(runtime, connection, frame).await;
            }
            Err(e) => {
                let mut notice = runtime.frame("error", SYSTEM_COMPONENT_ID);
                notice.error = Some(ErrorKind::BadFrame.to_string());
                notice.payload = error_payload(ErrorKind::BadFrame, e.to_string(), None);
                connection.enqueue(notice, true);
                if connection.record_parse_error(now, config.max_parse_errors, config.parse_error_window_ms) {
                    warn!(client_id = %connection.client_id, "bad-frame budget spent, terminating");
                    return CloseCause::ServerTerminated;
                }
            }
        }
    }
}

/// Accept loop for a TCP listener; one spawned [`serve`] per connection.
pub async fn run_tcp<C: Clock, G: IdGen + 'static>(
    runtime: Arc<Runtime<C, G>>,
    listener: tokio::net::TcpListener,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted");
                tokio::spawn(serve(Arc::clone(&runtime), stream));
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
}

/// Accept loop for a Unix socket listener.
pub async fn run_unix<C: Clock, G: IdGen + 'static>(
    runtime: Arc<Runtime<C, G>>,
    listener: tokio::net::UnixListener,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(serve(Arc::clone(&runtime), stream));
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
}

#[cfg(test)]
#[path = "multiplexer_tests.rs"]
mod tests;
