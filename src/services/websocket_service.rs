use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        common::QueueStateSnapshot,
        ws::{
            AckOutcome, IdentAck, MutationAck, MutationRequest, RequesterInboundMessage,
            RequesterOutboundMessage,
        },
    },
    services::queue_service,
    state::{SharedState, queue::RequesterCtx, room::Room},
};

/// Marker returned when the socket's writer channel has closed.
struct SocketClosed;

/// Handle the full lifecycle for an individual requester WebSocket
/// connection: identification, room join, state forwarding, and mutation
/// dispatch.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let ident_timeout = state.config().identification_timeout();
    let initial_message = match tokio::time::timeout(ident_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match RequesterInboundMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse or validate requester message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let RequesterInboundMessage::Identification(ident) = inbound else {
        warn!("first message was not identification");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let requester_id = ident.requester_id.unwrap_or_else(Uuid::new_v4);
    let ctx = RequesterCtx {
        requester_id,
        role: ident.role.into(),
    };

    let room = match state.room(&ident.room_id).await {
        Ok(room) => room,
        Err(err) => {
            warn!(room_id = %ident.room_id, error = %err, "failed to join room");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // Subscribe before snapshotting so no broadcast can slip between the
    // initial snapshot and the live stream.
    let updates = room.subscribe();
    let snapshot = room.snapshot().await;

    let ident_ack = RequesterOutboundMessage::Identified(IdentAck {
        requester_id,
        room_id: ident.room_id.clone(),
        role: ident.role,
        ack_timeout_ms: state.config().ack_timeout().as_millis() as u64,
    });
    if send_message_to_websocket(&outbound_tx, &ident_ack, "identification ack").is_err()
        || send_message_to_websocket(
            &outbound_tx,
            &RequesterOutboundMessage::QueueState(snapshot),
            "initial snapshot",
        )
        .is_err()
    {
        finalize(writer_task, outbound_tx).await;
        return;
    }

    info!(room_id = %ident.room_id, requester = %requester_id, "requester connected");

    let forward_task = spawn_state_forwarder(Arc::clone(&room), updates, outbound_tx.clone());

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match RequesterInboundMessage::from_json_str(&text) {
                Ok(RequesterInboundMessage::Mutation(request)) => {
                    handle_mutation(&state, &room, &ctx, request, &outbound_tx).await;
                }
                Ok(RequesterInboundMessage::Identification(_)) => {
                    warn!(requester = %requester_id, "ignoring duplicate identification message");
                }
                Ok(RequesterInboundMessage::Unknown) => {
                    warn!(requester = %requester_id, "ignoring unknown message type");
                }
                Err(err) => {
                    warn!(requester = %requester_id, error = %err, "failed to parse or validate requester message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(requester = %requester_id, "requester closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(requester = %requester_id, error = %err, "websocket error");
                break;
            }
        }
    }

    info!(room_id = %ident.room_id, requester = %requester_id, "requester disconnected");

    forward_task.abort();
    finalize(writer_task, outbound_tx).await;
}

/// Apply one proposed mutation and acknowledge the originating socket.
///
/// The state broadcast triggered by a successful mutation reaches this
/// requester through the forwarder like everyone else; the acknowledgement
/// only resolves the client's transaction.
async fn handle_mutation(
    state: &SharedState,
    room: &Arc<Room>,
    ctx: &RequesterCtx,
    request: MutationRequest,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    let transaction_id = request.transaction_id;
    let ack = match queue_service::apply_mutation(state, room, ctx, request).await {
        Ok(_) => MutationAck {
            transaction_id,
            outcome: AckOutcome::Success,
            reason: None,
        },
        Err(err) => {
            info!(requester = %ctx.requester_id, error = %err, "queue mutation rejected");
            MutationAck {
                transaction_id,
                outcome: AckOutcome::Failure,
                reason: Some(err.to_string()),
            }
        }
    };

    let _ = send_message_to_websocket(
        outbound_tx,
        &RequesterOutboundMessage::Ack(ack),
        "mutation ack",
    );
}

/// Forward every state broadcast of `room` onto the socket writer.
///
/// A lagging consumer is repaired by re-sending the current full snapshot:
/// broadcasts replace state rather than patch it, so skipping intermediate
/// versions is safe as long as a newer one follows.
fn spawn_state_forwarder(
    room: Arc<Room>,
    mut updates: broadcast::Receiver<QueueStateSnapshot>,
    outbound_tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(snapshot) => {
                    if send_message_to_websocket(
                        &outbound_tx,
                        &RequesterOutboundMessage::QueueState(snapshot),
                        "state broadcast",
                    )
                    .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(room_id = %room.room_id(), skipped, "socket lagged; resending full snapshot");
                    let snapshot = room.snapshot().await;
                    if send_message_to_websocket(
                        &outbound_tx,
                        &RequesterOutboundMessage::QueueState(snapshot),
                        "state resync",
                    )
                    .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Serialize a payload and push it onto the socket's writer channel.
///
/// Serialization failure is a permanent error (a bug in our own types) and
/// is logged and swallowed; a closed writer is reported to the caller so it
/// can wind the connection down.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
    context: &str,
) -> Result<(), SocketClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(context, error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SocketClosed)
}

/// Ensure the writer task winds down before we return from the socket
/// handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
