use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use kindred_types::events::{CircleEvent, circle_channel};

use crate::dispatcher::Dispatcher;

/// Heartbeat comment interval, short enough to keep idle proxies from
/// closing the connection.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// One named server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: &'static str,
    pub data: String,
}

/// Live frames for one viewer of a circle: a `ready` frame, then every event
/// published on the circle's channel. The stream ends once the viewer's own
/// membership ends. The channel subscription lives inside the stream and is
/// released when the stream finishes or is dropped.
pub fn circle_frames(dispatcher: Dispatcher, circle_id: Uuid, viewer_id: Uuid) -> impl Stream<Item = Frame> {
    let channel = circle_channel(circle_id);
    let (tx, mut rx) = mpsc::unbounded_channel::<CircleEvent>();

    // Queue per connection; a closed receiver just drops the event.
    let subscription = dispatcher.subscribe(&channel, move |event| {
        let _ = tx.send(event.clone());
    });

    async_stream::stream! {
        let subscription = subscription;
        debug!("Viewer {} attached to {}", viewer_id, subscription.channel());

        yield Frame {
            event: "ready",
            data: serde_json::json!({ "channel": subscription.channel() }).to_string(),
        };

        while let Some(event) = rx.recv().await {
            if let CircleEvent::MemberLeft { device_id, .. } = &event {
                if *device_id == viewer_id {
                    debug!("Viewer {} left {}, closing stream", viewer_id, subscription.channel());
                    break;
                }
                continue;
            }

            match event.payload() {
                Ok(payload) => yield Frame { event: event.name(), data: payload.to_string() },
                Err(e) => warn!("Dropping unserializable {} event: {}", event.name(), e),
            }
        }
    }
}

/// SSE response for [`circle_frames`] with periodic `heartbeat` comments.
pub fn circle_stream(
    dispatcher: Dispatcher,
    circle_id: Uuid,
    viewer_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = circle_frames(dispatcher, circle_id, viewer_id)
        .map(|frame| Ok(Event::default().event(frame.event).data(frame.data)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
