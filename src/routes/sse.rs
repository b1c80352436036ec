use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    services::{sse_events, sse_service},
    state::SharedState,
};

/// Stream realtime notifications for one room to a connected client.
#[utoipa::path(
    get,
    path = "/rooms/{code}/live",
    tag = "sse",
    params(("code" = String, Path, description = "Room code")),
    responses((status = 200, description = "Per-room SSE stream", content_type = "text/event-stream", body = String))
)]
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_room(&state, &code);
    info!(room = %code, "new room SSE connection");
    sse_events::broadcast_handshake(&state, &code).await;
    sse_service::to_sse_stream(receiver, state, code)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{code}/live", get(room_stream))
}
