//! Notification constructors for the per-room SSE streams.
//!
//! Every payload is a coarse "state changed, refetch" signal for client UX;
//! nothing here carries authority. Kinds are stable strings the frontends
//! switch on.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{MissionKind, TeamSide},
    dto::sse::{
        BonusSelectedEvent, EventAppearedEvent, EventClosedEvent, EventDecidedEvent,
        GameFinalizedEvent, Handshake, MissionDecidedEvent, PhaseAssignedEvent, ServerEvent,
        ValidationAdvancedEvent,
    },
    state::SharedState,
};

const EVENT_MID_MISSIONS: &str = "mid-missions-assigned";
const EVENT_LATE_MISSIONS: &str = "late-missions-assigned";
const EVENT_APPEARED: &str = "event-appeared";
const EVENT_CLOSED: &str = "event-closed";
const EVENT_VALIDATION_ADVANCED: &str = "validation-advanced";
const EVENT_MISSION_DECIDED: &str = "mission-decided";
const EVENT_DECIDED: &str = "event-decided";
const EVENT_BONUS_SELECTED: &str = "bonus-selected";
const EVENT_GAME_FINALIZED: &str = "game-finalized";
const EVENT_INFO: &str = "info";

/// Broadcast that a phase landed its content (direct rows or choice offers).
pub fn broadcast_phase_assigned(
    state: &SharedState,
    room_code: &str,
    kind: MissionKind,
    choice_mode: bool,
) {
    let name = match kind {
        MissionKind::Late => EVENT_LATE_MISSIONS,
        _ => EVENT_MID_MISSIONS,
    };
    send_room_event(state, room_code, name, &PhaseAssignedEvent { kind, choice_mode });
}

/// Broadcast that a scheduled event surfaced and holds the clock.
pub fn broadcast_event_appeared(state: &SharedState, room_code: &str, event_id: Uuid, name: &str) {
    send_room_event(
        state,
        room_code,
        EVENT_APPEARED,
        &EventAppearedEvent {
            event_id,
            name: name.to_owned(),
        },
    );
}

/// Broadcast that the creator released the event hold.
pub fn broadcast_event_closed(state: &SharedState, room_code: &str) {
    send_room_event(
        state,
        room_code,
        EVENT_CLOSED,
        &EventClosedEvent {
            room_code: room_code.to_owned(),
        },
    );
}

/// Broadcast that the validation status value moved.
pub fn broadcast_validation_advanced(state: &SharedState, room_code: &str, status: Option<&str>) {
    send_room_event(
        state,
        room_code,
        EVENT_VALIDATION_ADVANCED,
        &ValidationAdvancedEvent {
            status: status.map(ToOwned::to_owned),
        },
    );
}

/// Broadcast that a mission decision was recorded.
pub fn broadcast_mission_decided(
    state: &SharedState,
    room_code: &str,
    player_id: Uuid,
    kind: MissionKind,
    validated: bool,
) {
    send_room_event(
        state,
        room_code,
        EVENT_MISSION_DECIDED,
        &MissionDecidedEvent {
            player_id,
            kind,
            validated,
        },
    );
}

/// Broadcast that an event decision was recorded.
pub fn broadcast_event_decided(
    state: &SharedState,
    room_code: &str,
    event_id: Uuid,
    winner: Option<TeamSide>,
) {
    send_room_event(
        state,
        room_code,
        EVENT_DECIDED,
        &EventDecidedEvent { event_id, winner },
    );
}

/// Broadcast that the bonus winner was selected.
pub fn broadcast_bonus_selected(state: &SharedState, room_code: &str, team: TeamSide) {
    send_room_event(state, room_code, EVENT_BONUS_SELECTED, &BonusSelectedEvent { team });
}

/// Broadcast the single finalization notification.
pub fn broadcast_game_finalized(
    state: &SharedState,
    room_code: &str,
    red_score: i32,
    blue_score: i32,
    winner_team: Option<TeamSide>,
) {
    send_room_event(
        state,
        room_code,
        EVENT_GAME_FINALIZED,
        &GameFinalizedEvent {
            red_score,
            blue_score,
            winner_team,
        },
    );
}

/// Send the connection handshake onto a room stream.
pub async fn broadcast_handshake(state: &SharedState, room_code: &str) {
    let payload = Handshake {
        room_code: room_code.to_owned(),
        message: "room stream connected".into(),
        degraded: state.is_degraded().await,
    };
    send_room_event(state, room_code, EVENT_INFO, &payload);
}

fn send_room_event(state: &SharedState, room_code: &str, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.hub().publish(room_code, event),
        Err(err) => warn!(event, room = room_code, error = %err, "failed to serialize SSE payload"),
    }
}
