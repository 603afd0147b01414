//! Server-sent events stream of execution events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

/// `GET /api/events` -- every bus event, verbatim, as `data:` frames.
///
/// The first frame greets the client with `{type:"connected",clientId}`;
/// a comment heartbeat keeps the connection alive every 30 seconds.
/// When the client disconnects the stream drops and the bus listener is
/// detached with it.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = Uuid::now_v7();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = state.bus.on_any(move |event| {
        let _ = tx.send(event.clone());
    });
    tracing::debug!(%client_id, "event stream client connected");

    let stream = async_stream::stream! {
        // Held for the life of the stream; dropping it unsubscribes.
        let _subscription = subscription;

        match Event::default().json_data(json!({ "type": "connected", "clientId": client_id })) {
            Ok(frame) => yield Ok(frame),
            Err(err) => tracing::warn!(error = %err, "failed to build connected frame"),
        }

        while let Some(event) = rx.recv().await {
            match Event::default().json_data(&event) {
                Ok(frame) => yield Ok(frame),
                Err(err) => tracing::warn!(error = %err, "failed to serialize event frame"),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("heartbeat"),
    )
}
