use serde::Serialize;
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{
    GameHistoryEntity, MissionKind, PendingChoiceEntity, PlayerMissionEntity, RoomEntity,
    RoomEventEntity, TeamSide,
};
use crate::dto::format_system_time;
use crate::state::ValidationState;

/// One assignment as exposed by the read model.
///
/// Private mission texts are redacted for everyone but the holder and the
/// room creator; the flag stays visible so clients can render a lock icon.
#[derive(Debug, Serialize, ToSchema)]
pub struct AssignedMissionSnapshot {
    /// Catalog mission assigned.
    pub mission_id: Uuid,
    /// Phase of the assignment.
    pub kind: MissionKind,
    /// Frozen resolved text; `None` when redacted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_text: Option<String>,
    /// Whether the text is hidden from other players.
    pub private: bool,
    /// Whether a decision has been recorded.
    pub decided: bool,
    /// Whether the decision validated the mission.
    pub validated: bool,
    /// Points credited by the decision.
    pub points_earned: i32,
}

/// One offered mission inside a pending choice snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfferSnapshot {
    /// Offered catalog mission.
    pub mission_id: Uuid,
    /// Frozen resolved text.
    pub resolved_text: String,
}

/// Pending multi-choice offer as exposed by the read model.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingChoiceSnapshot {
    /// Phase of the offer.
    pub kind: MissionKind,
    /// Candidate missions.
    pub offers: Vec<OfferSnapshot>,
}

/// One room player with their content.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerSnapshot {
    /// Player identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Team side.
    pub team: TeamSide,
    /// Durable assignments.
    pub missions: Vec<AssignedMissionSnapshot>,
    /// Outstanding choice offers.
    pub pending_choices: Vec<PendingChoiceSnapshot>,
}

/// Scheduled event as exposed by the read model. Events that have not
/// surfaced yet hide their schedule and content.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomEventSnapshot {
    /// Occurrence identifier.
    pub id: Uuid,
    /// Display name; `None` until the event surfaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Instructions; `None` until the event surfaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Points at stake.
    pub points: i32,
    /// Whether the event has surfaced.
    pub appeared: bool,
    /// Surfacing instant, RFC3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appeared_at: Option<String>,
    /// Whether a decision has been recorded.
    pub decided: bool,
    /// Team credited, if any.
    pub winner: Option<TeamSide>,
}

/// Full room snapshot returned by `GET /rooms/{code}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSnapshot {
    /// Room code.
    pub code: String,
    /// Whether the game clock started.
    pub game_started: bool,
    /// Whether the room was finalized.
    pub game_stopped: bool,
    /// Clock start instant, RFC3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_start_time: Option<String>,
    /// Effective elapsed play time in seconds, excluding pauses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_elapsed_secs: Option<u64>,
    /// Whether an appeared event currently holds the clock.
    pub event_paused: bool,
    /// MID unlock threshold in seconds.
    pub mid_mission_delay_secs: u64,
    /// LATE unlock threshold in seconds.
    pub late_mission_delay_secs: u64,
    /// Offers per player (1 = direct assignment).
    pub mission_choice_count: u32,
    /// Whether finalization draws a victory bonus.
    pub victory_bonus_enabled: bool,
    /// Map the room plays on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_name: Option<String>,
    /// Encoded validation status.
    pub validation_status: Option<String>,
    /// Roster index under decision, when validation steps through players.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_validation_player: Option<usize>,
    /// Winning team, once selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_team: Option<TeamSide>,
    /// Ordered roster with per-player content.
    pub players: Vec<PlayerSnapshot>,
    /// Scheduled events.
    pub events: Vec<RoomEventSnapshot>,
}

impl RoomSnapshot {
    /// Assemble the read model from store-confirmed rows.
    ///
    /// `requester_token` governs private-text redaction; the creator sees
    /// everything.
    pub fn build(
        room: RoomEntity,
        assignments: Vec<PlayerMissionEntity>,
        choices: Vec<PendingChoiceEntity>,
        events: Vec<RoomEventEntity>,
        requester_token: Option<&str>,
        now: SystemTime,
    ) -> Self {
        let requester_is_creator = requester_token == Some(room.creator_token.as_str());
        let current_validation_player = ValidationState::parse(room.validation_status.as_deref())
            .ok()
            .and_then(|state| state.current_player());

        let players = room
            .players
            .iter()
            .map(|player| {
                let requester_is_holder =
                    requester_token.is_some_and(|token| token == player.token);
                let missions = assignments
                    .iter()
                    .filter(|assignment| assignment.player_id == player.id)
                    .map(|assignment| {
                        let private = assignment.is_private;
                        let visible = !private || requester_is_holder || requester_is_creator;
                        AssignedMissionSnapshot {
                            mission_id: assignment.mission_id,
                            kind: assignment.kind,
                            resolved_text: visible.then(|| assignment.resolved_text.clone()),
                            private,
                            decided: assignment.decided,
                            validated: assignment.validated,
                            points_earned: assignment.points_earned,
                        }
                    })
                    .collect();

                let pending_choices = choices
                    .iter()
                    .filter(|choice| choice.player_id == player.id)
                    .map(|choice| PendingChoiceSnapshot {
                        kind: choice.kind,
                        offers: choice
                            .offers
                            .iter()
                            .map(|offer| OfferSnapshot {
                                mission_id: offer.mission_id,
                                resolved_text: offer.resolved_text.clone(),
                            })
                            .collect(),
                    })
                    .collect();

                PlayerSnapshot {
                    id: player.id,
                    name: player.name.clone(),
                    team: player.team,
                    missions,
                    pending_choices,
                }
            })
            .collect();

        let events = events
            .into_iter()
            .map(|event| {
                let appeared = event.appeared_at.is_some();
                RoomEventSnapshot {
                    id: event.id,
                    name: appeared.then_some(event.name),
                    text: appeared.then_some(event.text),
                    points: event.points,
                    appeared,
                    appeared_at: event.appeared_at.map(format_system_time),
                    decided: event.decided,
                    winner: event.winner,
                }
            })
            .collect();

        Self {
            effective_elapsed_secs: room.effective_elapsed(now).map(|elapsed| elapsed.as_secs()),
            code: room.code,
            game_started: room.game_started,
            game_stopped: room.game_stopped,
            game_start_time: room.game_start_time.map(format_system_time),
            event_paused: room.event_paused_at.is_some(),
            mid_mission_delay_secs: room.mid_mission_delay_secs,
            late_mission_delay_secs: room.late_mission_delay_secs,
            mission_choice_count: room.mission_choice_count,
            victory_bonus_enabled: room.victory_bonus_enabled,
            map_name: room.map_name,
            validation_status: room.validation_status,
            current_validation_player,
            winner_team: room.winner_team,
            players,
            events,
        }
    }
}

/// History snapshot as exposed by `GET /rooms/{code}/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistorySnapshot {
    /// Room code.
    pub room_code: String,
    /// Finalization instant, RFC3339.
    pub finished_at: String,
    /// Final red team score.
    pub red_score: i32,
    /// Final blue team score.
    pub blue_score: i32,
    /// Winning team, if one was selected.
    pub winner_team: Option<TeamSide>,
    /// Victory bonus credited to the winner.
    pub bonus_points: i32,
}

impl From<GameHistoryEntity> for HistorySnapshot {
    fn from(value: GameHistoryEntity) -> Self {
        Self {
            room_code: value.room_code,
            finished_at: format_system_time(value.finished_at),
            red_score: value.red_score,
            blue_score: value.blue_score,
            winner_team: value.winner_team,
            bonus_points: value.bonus_points,
        }
    }
}
