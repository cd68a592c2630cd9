use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{dao::models::DuelRecord, dto::duel::DuelView, state::SharedState};

/// Subscribe to the shared duel snapshot hub.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<DuelRecord> {
    state.duel_hub().subscribe()
}

/// Convert a hub subscription into an SSE response carrying only the
/// snapshots of one duel, and clean up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<DuelRecord>,
    duel_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Small bounded channel between forwarder and response.
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(snapshot) => {
                            if snapshot.id != duel_id {
                                continue;
                            }
                            let view = DuelView::from(snapshot);
                            let payload = match serde_json::to_string(&view) {
                                Ok(payload) => payload,
                                Err(err) => {
                                    warn!(duel = %duel_id, error = %err, "failed to encode duel snapshot");
                                    continue;
                                }
                            };
                            let event = Event::default().event("duel").data(payload);
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged snapshots but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        info!(duel = %duel_id, "duel SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
