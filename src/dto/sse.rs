use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{MissionKind, TeamSide};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the per-room SSE channels.
pub struct ServerEvent {
    /// SSE event name (the coarse notification kind).
    pub event: Option<String>,
    /// Serialized JSON data field.
    pub data: String,
}

impl ServerEvent {
    /// Build an event from pre-serialized data.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Room the stream is scoped to.
    pub room_code: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a phase assigned its content (missions or offers).
pub struct PhaseAssignedEvent {
    /// Phase that unlocked.
    pub kind: MissionKind,
    /// Whether offers (choice mode) rather than direct assignments landed.
    pub choice_mode: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a scheduled event surfaces and holds the room clock.
pub struct EventAppearedEvent {
    /// Occurrence identifier.
    pub event_id: Uuid,
    /// Display name.
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the creator releases an event hold on the room clock.
pub struct EventClosedEvent {
    /// Room the clock belongs to.
    pub room_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the validation status value moves.
pub struct ValidationAdvancedEvent {
    /// New encoded status, as persisted on the room row.
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a mission decision is recorded.
pub struct MissionDecidedEvent {
    /// Player whose mission was decided.
    pub player_id: Uuid,
    /// Phase of the decided mission.
    pub kind: MissionKind,
    /// Whether the mission was validated.
    pub validated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when an event decision is recorded.
pub struct EventDecidedEvent {
    /// Occurrence identifier.
    pub event_id: Uuid,
    /// Team credited, if any.
    pub winner: Option<TeamSide>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the bonus winner is selected.
pub struct BonusSelectedEvent {
    /// Selected team.
    pub team: TeamSide,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once when the room is finalized.
pub struct GameFinalizedEvent {
    /// Final red team score.
    pub red_score: i32,
    /// Final blue team score.
    pub blue_score: i32,
    /// Winning team, if one was selected.
    pub winner_team: Option<TeamSide>,
}
