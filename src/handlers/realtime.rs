use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::info;
use utoipa::IntoParams;

use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SubscribeQuery {
    /// Only forward changes to this table
    pub table: Option<String>,
}

/// Server-sent change feed; each event names the table, action and row id
#[utoipa::path(
    get,
    path = "/api/v1/realtime",
    params(SubscribeQuery),
    responses((status = 200, description = "Event stream", content_type = "text/event-stream")),
    security(("Bearer" = [])),
    tag = "realtime"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(table = ?query.table, "Realtime subscriber connected");
    Sse::new(state.change_feed.sse_stream(query.table)).keep_alive(KeepAlive::default())
}
