//! BSON document models and their entity conversions.
//!
//! Identifiers are stored as hyphenated UUID strings so `doc!` filters stay
//! trivial; instants use [`bson::DateTime`]; durations are millisecond
//! counters.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{
    EventEntity, GameHistoryEntity, HistoryEvent, HistoryPlayer, MissionEntity, MissionKind,
    MissionOffer, PendingChoiceEntity, PlayerEntity, PlayerMissionEntity, PlayerPlaceholder,
    RoomEntity, RoomEventEntity, TeamSide,
};

fn parse_uuid(value: &str, collection: &'static str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(value).map_err(|_| MongoDaoError::CorruptDocument {
        collection,
        detail: format!("`{value}` is not a UUID"),
    })
}

/// Room document stored in the `rooms` collection, keyed by its code.
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    /// Room code, doubling as the document key.
    #[serde(rename = "_id")]
    pub code: String,
    /// Creator session token.
    pub creator_token: String,
    /// Whether the game clock started.
    pub game_started: bool,
    /// Whether the room was finalized.
    pub game_stopped: bool,
    /// Clock start instant.
    pub game_start_time: Option<DateTime>,
    /// Accumulated paused time in milliseconds.
    pub total_paused_ms: u64,
    /// Open event hold, if any.
    pub event_paused_at: Option<DateTime>,
    /// MID unlock threshold in seconds.
    pub mid_mission_delay_secs: u64,
    /// LATE unlock threshold in seconds.
    pub late_mission_delay_secs: u64,
    /// Offers per player (1 = direct assignment).
    pub mission_choice_count: u32,
    /// Whether finalization draws a victory bonus.
    pub victory_bonus_enabled: bool,
    /// Map the room plays on.
    pub map_name: Option<String>,
    /// Encoded validation state.
    pub validation_status: Option<String>,
    /// Winner selected during bonus selection.
    pub winner_team: Option<TeamSide>,
    /// Ordered roster.
    pub players: Vec<MongoPlayerDocument>,
}

/// Player sub-document embedded in a room.
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    /// Player identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Team side.
    pub team: TeamSide,
    /// Session token.
    pub token: String,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            code: value.code,
            creator_token: value.creator_token,
            game_started: value.game_started,
            game_stopped: value.game_stopped,
            game_start_time: value.game_start_time.map(DateTime::from),
            total_paused_ms: value.total_paused.as_millis() as u64,
            event_paused_at: value.event_paused_at.map(DateTime::from),
            mid_mission_delay_secs: value.mid_mission_delay_secs,
            late_mission_delay_secs: value.late_mission_delay_secs,
            mission_choice_count: value.mission_choice_count,
            victory_bonus_enabled: value.victory_bonus_enabled,
            map_name: value.map_name,
            validation_status: value.validation_status,
            winner_team: value.winner_team,
            players: value
                .players
                .into_iter()
                .map(|player| MongoPlayerDocument {
                    id: player.id.to_string(),
                    name: player.name,
                    team: player.team,
                    token: player.token,
                })
                .collect(),
        }
    }
}

impl TryFrom<MongoRoomDocument> for RoomEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomDocument) -> Result<Self, Self::Error> {
        let players = value
            .players
            .into_iter()
            .map(|player| {
                Ok(PlayerEntity {
                    id: parse_uuid(&player.id, "rooms")?,
                    name: player.name,
                    team: player.team,
                    token: player.token,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        Ok(Self {
            code: value.code,
            creator_token: value.creator_token,
            game_started: value.game_started,
            game_stopped: value.game_stopped,
            game_start_time: value.game_start_time.map(Into::into),
            total_paused: Duration::from_millis(value.total_paused_ms),
            event_paused_at: value.event_paused_at.map(Into::into),
            mid_mission_delay_secs: value.mid_mission_delay_secs,
            late_mission_delay_secs: value.late_mission_delay_secs,
            mission_choice_count: value.mission_choice_count,
            victory_bonus_enabled: value.victory_bonus_enabled,
            map_name: value.map_name,
            validation_status: value.validation_status,
            winner_team: value.winner_team,
            players,
        })
    }
}

/// Mission catalog document.
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoMissionDocument {
    /// Mission identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Phase the mission belongs to.
    pub kind: MissionKind,
    /// Category label.
    pub category: String,
    /// Difficulty rating.
    pub difficulty: u8,
    /// Points when validated.
    pub points: i32,
    /// Hidden from other players.
    pub is_private: bool,
    /// Applicable maps.
    pub maps: Vec<String>,
    /// Mission text.
    pub text: String,
    /// Placeholder resolution mode.
    #[serde(default)]
    pub placeholder: PlayerPlaceholder,
}

impl TryFrom<MongoMissionDocument> for MissionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMissionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id, "missions")?,
            kind: value.kind,
            category: value.category,
            difficulty: value.difficulty,
            points: value.points,
            is_private: value.is_private,
            maps: value.maps,
            text: value.text,
            placeholder: value.placeholder,
        })
    }
}

/// Assignment document; the collection carries a unique index on
/// (`player_id`, `kind`).
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoPlayerMissionDocument {
    /// Room code.
    pub room_code: String,
    /// Player identifier.
    pub player_id: String,
    /// Assigned catalog mission.
    pub mission_id: String,
    /// Phase of the assignment.
    pub kind: MissionKind,
    /// Frozen resolved text.
    pub resolved_text: String,
    /// Hidden from other players.
    pub is_private: bool,
    /// Points when validated.
    pub points: i32,
    /// Decision recorded.
    pub decided: bool,
    /// Decision outcome.
    pub validated: bool,
    /// Credited points.
    pub points_earned: i32,
}

impl From<PlayerMissionEntity> for MongoPlayerMissionDocument {
    fn from(value: PlayerMissionEntity) -> Self {
        Self {
            room_code: value.room_code,
            player_id: value.player_id.to_string(),
            mission_id: value.mission_id.to_string(),
            kind: value.kind,
            resolved_text: value.resolved_text,
            is_private: value.is_private,
            points: value.points,
            decided: value.decided,
            validated: value.validated,
            points_earned: value.points_earned,
        }
    }
}

impl TryFrom<MongoPlayerMissionDocument> for PlayerMissionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerMissionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            room_code: value.room_code,
            player_id: parse_uuid(&value.player_id, "player_missions")?,
            mission_id: parse_uuid(&value.mission_id, "player_missions")?,
            kind: value.kind,
            resolved_text: value.resolved_text,
            is_private: value.is_private,
            points: value.points,
            decided: value.decided,
            validated: value.validated,
            points_earned: value.points_earned,
        })
    }
}

/// One offer inside a pending choice document.
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoMissionOffer {
    /// Offered catalog mission.
    pub mission_id: String,
    /// Frozen resolved text.
    pub resolved_text: String,
}

/// Pending choice document; unique index on (`player_id`, `kind`).
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoPendingChoiceDocument {
    /// Room code.
    pub room_code: String,
    /// Player identifier.
    pub player_id: String,
    /// Phase of the offer.
    pub kind: MissionKind,
    /// Offered missions.
    pub offers: Vec<MongoMissionOffer>,
}

impl From<PendingChoiceEntity> for MongoPendingChoiceDocument {
    fn from(value: PendingChoiceEntity) -> Self {
        Self {
            room_code: value.room_code,
            player_id: value.player_id.to_string(),
            kind: value.kind,
            offers: value
                .offers
                .into_iter()
                .map(|offer| MongoMissionOffer {
                    mission_id: offer.mission_id.to_string(),
                    resolved_text: offer.resolved_text,
                })
                .collect(),
        }
    }
}

impl TryFrom<MongoPendingChoiceDocument> for PendingChoiceEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPendingChoiceDocument) -> Result<Self, Self::Error> {
        let offers = value
            .offers
            .into_iter()
            .map(|offer| {
                Ok(MissionOffer {
                    mission_id: parse_uuid(&offer.mission_id, "pending_choices")?,
                    resolved_text: offer.resolved_text,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        Ok(Self {
            room_code: value.room_code,
            player_id: parse_uuid(&value.player_id, "pending_choices")?,
            kind: value.kind,
            offers,
        })
    }
}

/// Event catalog document.
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoEventDocument {
    /// Catalog event identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Instructions.
    pub text: String,
    /// Points at stake.
    pub points: i32,
}

impl TryFrom<MongoEventDocument> for EventEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoEventDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id, "events")?,
            name: value.name,
            text: value.text,
            points: value.points,
        })
    }
}

/// Scheduled event document; unique index on (`room_code`, `ordinal`).
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoRoomEventDocument {
    /// Occurrence identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Room code.
    pub room_code: String,
    /// Seeding position.
    pub ordinal: u32,
    /// Display name.
    pub name: String,
    /// Instructions.
    pub text: String,
    /// Points at stake.
    pub points: i32,
    /// Surface threshold in effective seconds.
    pub scheduled_at_secs: u64,
    /// Surfacing instant.
    pub appeared_at: Option<DateTime>,
    /// Decision gate.
    pub decided: bool,
    /// Credited team.
    pub winner: Option<TeamSide>,
}

impl From<RoomEventEntity> for MongoRoomEventDocument {
    fn from(value: RoomEventEntity) -> Self {
        Self {
            id: value.id.to_string(),
            room_code: value.room_code,
            ordinal: value.ordinal,
            name: value.name,
            text: value.text,
            points: value.points,
            scheduled_at_secs: value.scheduled_at_secs,
            appeared_at: value.appeared_at.map(DateTime::from),
            decided: value.decided,
            winner: value.winner,
        }
    }
}

impl TryFrom<MongoRoomEventDocument> for RoomEventEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomEventDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id, "room_events")?,
            room_code: value.room_code,
            ordinal: value.ordinal,
            name: value.name,
            text: value.text,
            points: value.points,
            scheduled_at_secs: value.scheduled_at_secs,
            appeared_at: value.appeared_at.map(Into::into),
            decided: value.decided,
            winner: value.winner,
        })
    }
}

/// History snapshot document, append-only.
#[derive(Debug, Serialize, Deserialize)]
pub struct MongoHistoryDocument {
    /// Snapshot identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Room code.
    pub room_code: String,
    /// Finalization instant.
    pub finished_at: DateTime,
    /// Player outcomes.
    pub players: Vec<HistoryPlayer>,
    /// Event outcomes.
    pub events: Vec<HistoryEvent>,
    /// Final red score.
    pub red_score: i32,
    /// Final blue score.
    pub blue_score: i32,
    /// Winning team.
    pub winner_team: Option<TeamSide>,
    /// Victory bonus.
    pub bonus_points: i32,
}

impl From<GameHistoryEntity> for MongoHistoryDocument {
    fn from(value: GameHistoryEntity) -> Self {
        Self {
            id: value.id.to_string(),
            room_code: value.room_code,
            finished_at: DateTime::from(value.finished_at),
            players: value.players,
            events: value.events,
            red_score: value.red_score,
            blue_score: value.blue_score,
            winner_team: value.winner_team,
            bonus_points: value.bonus_points,
        }
    }
}

impl TryFrom<MongoHistoryDocument> for GameHistoryEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoHistoryDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id, "histories")?,
            room_code: value.room_code,
            finished_at: value.finished_at.into(),
            players: value.players,
            events: value.events,
            red_score: value.red_score,
            blue_score: value.blue_score,
            winner_team: value.winner_team,
            bonus_points: value.bonus_points,
        })
    }
}
