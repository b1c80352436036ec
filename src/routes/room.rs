use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};

use crate::{
    dto::room::{HistorySnapshot, RoomSnapshot},
    error::AppError,
    routes::{CREATOR_TOKEN_HEADER, creator_token},
    services::{phase_service, room_service},
    state::SharedState,
};

/// Routes exposing the room read model and the event clock control.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{code}", get(get_room))
        .route("/rooms/{code}/history", get(get_history))
        .route("/rooms/{code}/events/resume", post(resume_after_event))
}

/// Fetch the full room snapshot (players, missions, offers, events).
#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "room",
    params(
        ("code" = String, Path, description = "Room code"),
        ("x-creator-token" = Option<String>, Header, description = "Opaque session token; governs private-text visibility")
    ),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshot),
        (status = 404, description = "Unknown room"),
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomSnapshot>, AppError> {
    let token = headers
        .get(CREATOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let snapshot = room_service::get_room_snapshot(&state, &code, token).await?;
    Ok(Json(snapshot))
}

/// Fetch the immutable snapshot of a finalized game.
#[utoipa::path(
    get,
    path = "/rooms/{code}/history",
    tag = "room",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "History snapshot", body = HistorySnapshot),
        (status = 404, description = "Room not finalized yet"),
    )
)]
pub async fn get_history(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<HistorySnapshot>, AppError> {
    let snapshot = room_service::get_history(&state, &code).await?;
    Ok(Json(snapshot))
}

/// Release the clock hold of the currently open event.
#[utoipa::path(
    post,
    path = "/rooms/{code}/events/resume",
    tag = "room",
    params(
        ("code" = String, Path, description = "Room code"),
        ("x-creator-token" = String, Header, description = "Creator session token")
    ),
    responses(
        (status = 204, description = "Clock resumed"),
        (status = 409, description = "No event holds the clock"),
    )
)]
pub async fn resume_after_event(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<axum::http::StatusCode, AppError> {
    let token = creator_token(&headers)?;
    phase_service::resume_after_event(&state, &code, &token).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
