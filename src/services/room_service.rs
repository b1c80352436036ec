use std::time::SystemTime;

use crate::{
    dao::models::RoomEntity,
    dto::{
        room::{HistorySnapshot, RoomSnapshot},
        validation::validate_room_code,
    },
    error::ServiceError,
    state::SharedState,
};

/// Whether `token` is the creator credential of `room`.
pub fn is_creator(token: &str, room: &RoomEntity) -> bool {
    room.creator_token == token
}

/// Reject requests whose credential is not the room creator's.
pub fn ensure_creator(token: &str, room: &RoomEntity) -> Result<(), ServiceError> {
    if is_creator(token, room) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "only the room creator may drive this operation".into(),
        ))
    }
}

/// Reject malformed room codes before they reach the store.
pub fn ensure_room_code(code: &str) -> Result<(), ServiceError> {
    validate_room_code(code)
        .map_err(|err| ServiceError::InvalidInput(format!("invalid room code `{code}`: {err}")))
}

/// Load a room or fail with a not-found error.
pub async fn load_room(state: &SharedState, code: &str) -> Result<RoomEntity, ServiceError> {
    ensure_room_code(code)?;
    let store = state.require_room_store().await?;
    store
        .find_room(code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))
}

/// Assemble the full room read model (`GetRoomWithAssignments`).
///
/// `requester_token` is the caller's opaque session token, used only to
/// decide which private mission texts stay visible.
pub async fn get_room_snapshot(
    state: &SharedState,
    code: &str,
    requester_token: Option<&str>,
) -> Result<RoomSnapshot, ServiceError> {
    let room = load_room(state, code).await?;
    let store = state.require_room_store().await?;

    let assignments = store.player_missions(code).await?;
    let choices = store.pending_choices(code).await?;
    let events = store.room_events(code).await?;

    Ok(RoomSnapshot::build(
        room,
        assignments,
        choices,
        events,
        requester_token,
        SystemTime::now(),
    ))
}

/// Fetch the history snapshot of a finalized room.
pub async fn get_history(state: &SharedState, code: &str) -> Result<HistorySnapshot, ServiceError> {
    ensure_room_code(code)?;
    let store = state.require_room_store().await?;
    let history = store
        .find_history(code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` has no history yet")))?;
    Ok(history.into())
}
