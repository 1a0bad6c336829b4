use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::{
    dto::{common::QueueStateSnapshot, sse::{Handshake, ServerEvent}},
    state::room::Room,
};

/// Event name carried by every queue state payload.
const EVENT_QUEUE_STATE: &str = "queue_state";
/// Event name of the initial subscription confirmation.
const EVENT_HANDSHAKE: &str = "handshake";

/// Convert a room's broadcast stream into a read-only SSE response.
///
/// The observer first receives a handshake and the current full snapshot,
/// then every subsequent state broadcast. A lagging observer is repaired
/// with a fresh full snapshot, mirroring the WebSocket forwarder.
pub fn room_event_stream(room: Arc<Room>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = room.subscribe();

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        let handshake = Handshake {
            room_id: room.room_id().to_string(),
            message: "observer stream connected".to_string(),
        };
        if forward_event(&tx, EVENT_HANDSHAKE, &handshake).await.is_err() {
            return;
        }
        let snapshot = room.snapshot().await;
        if forward_snapshot(&tx, &snapshot).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(snapshot) => {
                            if forward_snapshot(&tx, &snapshot).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(room_id = %room.room_id(), skipped, "observer lagged; resending full snapshot");
                            let snapshot = room.snapshot().await;
                            if forward_snapshot(&tx, &snapshot).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(room_id = %room.room_id(), "observer stream disconnected");
    });

    // response stream reads from mpsc; when the client disconnects axum
    // drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn forward_snapshot(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    snapshot: &QueueStateSnapshot,
) -> Result<(), ()> {
    forward_event(tx, EVENT_QUEUE_STATE, snapshot).await
}

/// Serialize `payload` and push it into the response channel.
async fn forward_event<T>(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    name: &str,
    payload: &T,
) -> Result<(), ()>
where
    T: serde::Serialize,
{
    let event = match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(server_event) => {
            let mut event = Event::default().data(server_event.data);
            if let Some(name) = server_event.event {
                event = event.event(name);
            }
            event
        }
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialize observer payload");
            return Ok(());
        }
    };

    tx.send(Ok(event)).await.map_err(|_| ())
}
