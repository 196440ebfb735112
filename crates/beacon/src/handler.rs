//! Per-connection handler: gate, register, then pump events.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   0. WebSocket upgrade, bounded by the handshake window
//!   1. Session gate → verify the upgrade credential, or `auth-error` + close
//!   2. Queue `connected`, join the user room
//!   3. Spawn the writer task that drains the connection's outbound queue
//!   4. Loop: receive client events → join/leave/relay/pong
//!
//! Everything sent to the client (notifications, relays, replies) goes
//! through the outbound queue, so the writer task is the connection's only
//! sender after admission.

use std::sync::Arc;

use beacon_protocol::{ClientEvent, Codec, JsonCodec, ProtocolError, ServerEvent};
use beacon_registry::{ConnectionHandle, ConnectionRegistry, Outbound, OutboundReceiver};
use beacon_session::{IdentityVerifier, Session};
use beacon_transport::{
    CLOSE_AUTH_FAILED, Connection, ConnectionId, PendingConnection, PendingWebSocket, TransportError,
    WebSocketConnection,
};
use chrono::Utc;

use crate::BeaconError;
use crate::server::ServerState;

/// Drop guard that removes the connection from the registry when the
/// handler exits.
///
/// Runs even if the handler panics. `Drop` is synchronous, so the async
/// cleanup is spawned.
struct LeaveGuard {
    connection_id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        let connection_id = self.connection_id;
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            registry.leave(connection_id).await;
        });
    }
}

/// Upgrades an accepted socket, then hands it to [`handle_connection`].
///
/// A peer that doesn't finish the upgrade within `handshake_timeout` is
/// dropped.
pub(crate) async fn handle_pending<V: IdentityVerifier>(
    pending: PendingWebSocket,
    state: Arc<ServerState<V>>,
) -> Result<(), BeaconError> {
    let addr = pending.peer_addr();
    let window = state.gate.config().handshake_timeout;
    let conn = tokio::time::timeout(window, pending.upgrade())
        .await
        .map_err(|_| TransportError::UpgradeTimedOut { addr, after: window })??;
    handle_connection(conn, state).await
}

/// Handles a single connection from upgrade to close.
async fn handle_connection<V: IdentityVerifier>(
    conn: WebSocketConnection,
    state: Arc<ServerState<V>>,
) -> Result<(), BeaconError> {
    let conn = Arc::new(conn);
    let connection_id = conn.id();
    tracing::debug!(%connection_id, "handling new connection");

    // --- Step 1: Session gate ---
    let session = match state.gate.admit(connection_id, conn.handshake()).await {
        Ok(session) => session,
        Err(e) => {
            reject(&conn, &state.codec, &e.to_string()).await;
            return Err(e.into());
        }
    };
    let user_id = session.user_id.clone();

    // --- Step 2: Register ---
    let (handle, outbound) = ConnectionHandle::channel(session.clone());
    handle.send_event(Arc::new(ServerEvent::Connected {
        user_id: user_id.clone(),
        display_name: session.display_name.clone(),
        connection_id: connection_id.into_inner(),
    }));

    let _guard = LeaveGuard {
        connection_id,
        registry: Arc::clone(&state.registry),
    };
    let report = state.registry.join(&user_id, handle.clone()).await;
    if !report.reconciliation.is_clean() {
        tracing::info!(
            %user_id,
            %connection_id,
            evicted = ?report.reconciliation.evicted_ids(),
            "join reconciled user room"
        );
    }

    // --- Step 3: Writer ---
    let mut writer = tokio::spawn(write_loop(Arc::clone(&conn), outbound, state.codec));

    // --- Step 4: Read loop ---
    loop {
        let received = tokio::select! {
            _ = &mut writer => {
                tracing::debug!(%connection_id, "writer finished");
                break;
            }
            received = tokio::time::timeout(state.idle_timeout, conn.recv()) => received,
        };

        let data = match received {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%user_id, %connection_id, "connection closed");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%connection_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%user_id, %connection_id, "idle timeout");
                handle.close(1000, "idle timeout");
                continue;
            }
        };

        handle_client_event(&state, &session, &handle, &data).await;
    }

    writer.abort();
    // _guard drops here → registry leave fires.
    Ok(())
}

/// Tells a refused client why, then closes with [`CLOSE_AUTH_FAILED`].
/// Best effort: the client may already be gone.
async fn reject(conn: &WebSocketConnection, codec: &JsonCodec, message: &str) {
    let event = ServerEvent::AuthError {
        message: message.to_string(),
    };
    if let Ok(bytes) = codec.encode(&event) {
        let _ = conn.send(&bytes).await;
    }
    let _ = conn
        .close_with(CLOSE_AUTH_FAILED, "authentication failed")
        .await;
}

/// Drains the outbound queue onto the socket until it closes or a `Close`
/// instruction arrives.
async fn write_loop(conn: Arc<WebSocketConnection>, mut outbound: OutboundReceiver, codec: JsonCodec) {
    let connection_id = conn.id();
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Event(event) => {
                let bytes = match codec.encode(&*event) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(%connection_id, error = %e, "failed to encode event");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%connection_id, error = %e, "send failed, stopping writer");
                    return;
                }
            }
            Outbound::Close { code, reason } => {
                tracing::debug!(%connection_id, code, %reason, "closing connection");
                let _ = conn.close_with(code, &reason).await;
                return;
            }
        }
    }
}

/// Decodes and handles one client frame. Failures are reported to the
/// client as `error` events; none of them end the connection.
async fn handle_client_event<V: IdentityVerifier>(
    state: &ServerState<V>,
    session: &Session,
    handle: &ConnectionHandle,
    data: &[u8],
) {
    let connection_id = session.connection_id;
    let event = match decode_client_event(&state.codec, data) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(%connection_id, error = %e, "malformed client event");
            reply_error(handle, 400, e.to_string());
            return;
        }
    };

    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            if let Err(e) = state
                .registry
                .join_conversation(connection_id, conversation_id)
                .await
            {
                reply_error(handle, 404, e.to_string());
            }
        }

        ClientEvent::LeaveConversation { conversation_id } => {
            state
                .registry
                .leave_conversation(connection_id, &conversation_id)
                .await;
        }

        ClientEvent::SendMessage {
            conversation_id,
            message,
        } => match state
            .registry
            .relay(&conversation_id, connection_id, message)
            .await
        {
            Ok(reached) => {
                tracing::debug!(%connection_id, %conversation_id, reached, "message relayed");
            }
            Err(e) => reply_error(handle, 403, e.to_string()),
        },

        ClientEvent::Ping { client_time } => {
            let server_time = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
            handle.send_event(Arc::new(ServerEvent::Pong {
                client_time,
                server_time,
            }));
        }
    }
}

fn decode_client_event(codec: &JsonCodec, data: &[u8]) -> Result<ClientEvent, ProtocolError> {
    let event: ClientEvent = codec.decode(data)?;
    event.validate()?;
    Ok(event)
}

fn reply_error(handle: &ConnectionHandle, code: u16, message: String) {
    handle.send_event(Arc::new(ServerEvent::Error { code, message }));
}
