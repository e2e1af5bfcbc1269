//! Broadcast fan-out of row changes to Server-Sent Events subscribers.

use std::convert::Infallible;

use axum::response::sse::Event as SseEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::events::ChangeEvent;

/// Change feed shared by the event loop (publisher) and SSE connections (subscribers)
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a change, returning how many subscribers received it
    pub fn publish(&self, change: ChangeEvent) -> usize {
        self.tx.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// SSE stream of changes, optionally limited to one table.
    ///
    /// A subscriber that falls behind receives a `lagged` event carrying the number of skipped
    /// changes and keeps streaming.
    pub fn sse_stream(
        &self,
        table: Option<String>,
    ) -> impl Stream<Item = Result<SseEvent, Infallible>> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(move |msg| match msg {
            Ok(change) => {
                if let Some(table) = &table {
                    if !change.table.eq_ignore_ascii_case(table) {
                        return None;
                    }
                }
                match SseEvent::default().event("change").json_data(&change) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        warn!(error = %e, "Failed to encode change event");
                        None
                    }
                }
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Realtime subscriber lagged behind");
                Some(Ok(SseEvent::default()
                    .event("lagged")
                    .data(skipped.to_string())))
            }
        })
    }
}
