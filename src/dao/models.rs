use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use utoipa::ToSchema;
use uuid::Uuid;

/// Team a player fights for. Rooms are split into two fixed sides; players
/// who have not picked yet stay unassigned and are skipped by team-scoped
/// draws.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    /// Red team.
    Red,
    /// Blue team.
    Blue,
    /// No team selected yet.
    Unassigned,
}

impl TeamSide {
    /// The opposing side, if this side has one.
    pub fn opponent(self) -> Option<TeamSide> {
        match self {
            TeamSide::Red => Some(TeamSide::Blue),
            TeamSide::Blue => Some(TeamSide::Red),
            TeamSide::Unassigned => None,
        }
    }

    /// Whether the player picked one of the two playable sides.
    pub fn is_rostered(self) -> bool {
        !matches!(self, TeamSide::Unassigned)
    }
}

/// Timed checkpoint after which a batch of missions unlocks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    /// Handed out when the game starts (by the room bootstrap collaborator).
    Start,
    /// Unlocked once the mid-game delay has elapsed.
    Mid,
    /// Unlocked once the late-game delay has elapsed.
    Late,
}

/// How the `{player}` token inside a mission text must be resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerPlaceholder {
    /// Text contains no placeholder.
    #[default]
    None,
    /// Any other player in the room.
    Any,
    /// A random player from the same team.
    Teammate,
    /// A random player from the opposing team.
    Opponent,
    /// The specific player paired by the duel draw.
    Duel,
}

/// Participant of a room. The position inside [`RoomEntity::players`] is the
/// stepping order used by the validation coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier for the player.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Team the player fights for.
    pub team: TeamSide,
    /// Opaque token identifying the player's browser session.
    pub token: String,
}

/// Aggregate room entity persisted by the storage layer.
///
/// Owned by the store; mutated only through the coordinators or the external
/// room CRUD collaborators (settings, join/leave).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Unique, human-shareable room code.
    pub code: String,
    /// Opaque token held by the room creator's browser session.
    pub creator_token: String,
    /// Whether the game clock has been started.
    pub game_started: bool,
    /// Set once and for all by finalization.
    pub game_stopped: bool,
    /// Instant the game clock started, if it did.
    pub game_start_time: Option<SystemTime>,
    /// Accumulated time spent paused, excluded from the effective clock.
    pub total_paused: Duration,
    /// Set while an appeared event holds the clock; folded into
    /// [`Self::total_paused`] when the event is closed.
    pub event_paused_at: Option<SystemTime>,
    /// Seconds of effective play before MID missions unlock.
    pub mid_mission_delay_secs: u64,
    /// Seconds of effective play before LATE missions unlock.
    /// Invariant: strictly greater than the MID delay.
    pub late_mission_delay_secs: u64,
    /// 1 = direct assignment, >1 = each player picks among that many offers.
    pub mission_choice_count: u32,
    /// Whether finalization awards a random victory bonus to the winner.
    pub victory_bonus_enabled: bool,
    /// Map the room plays on; missions listing other maps are filtered out.
    pub map_name: Option<String>,
    /// String-encoded validation state, `None` until validation starts.
    pub validation_status: Option<String>,
    /// Winning team selected during bonus selection.
    pub winner_team: Option<TeamSide>,
    /// Ordered roster; the array index is the validation stepping order.
    pub players: Vec<PlayerEntity>,
}

impl RoomEntity {
    /// Compute the effective elapsed play time at `now`, excluding paused
    /// intervals. `None` when the game clock never started.
    pub fn effective_elapsed(&self, now: SystemTime) -> Option<Duration> {
        let start = self.game_start_time?;
        let mut elapsed = now.duration_since(start).unwrap_or_default();
        elapsed = elapsed.saturating_sub(self.total_paused);
        if let Some(paused_at) = self.event_paused_at {
            elapsed = elapsed.saturating_sub(now.duration_since(paused_at).unwrap_or_default());
        }
        Some(elapsed)
    }

    /// Find a player by identifier.
    pub fn player(&self, id: Uuid) -> Option<&PlayerEntity> {
        self.players.iter().find(|player| player.id == id)
    }
}

/// Mission catalog entry. The catalog is curated by an external collaborator
/// and read-only for this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissionEntity {
    /// Stable identifier for the mission.
    pub id: Uuid,
    /// Phase the mission belongs to.
    pub kind: MissionKind,
    /// Free-form category label.
    pub category: String,
    /// Difficulty rating, 1 (trivial) to 5 (hard).
    pub difficulty: u8,
    /// Points awarded when the mission is validated.
    pub points: i32,
    /// Hidden from other players when set.
    pub is_private: bool,
    /// Maps the mission applies to; empty means every map.
    pub maps: Vec<String>,
    /// Mission text, possibly containing a `{player}` token.
    pub text: String,
    /// How the `{player}` token must be resolved.
    #[serde(default)]
    pub placeholder: PlayerPlaceholder,
}

impl MissionEntity {
    /// Whether the mission may be assigned in a room playing on `map_name`.
    pub fn applies_to(&self, map_name: Option<&str>) -> bool {
        match map_name {
            None => true,
            Some(map) => self.maps.is_empty() || self.maps.iter().any(|m| m == map),
        }
    }
}

/// Durable assignment of one mission to one player for one phase.
///
/// The uniqueness constraint on (`player_id`, `kind`) is the concurrency
/// primitive making phase transitions exactly-once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerMissionEntity {
    /// Room the assignment belongs to.
    pub room_code: String,
    /// Player holding the mission.
    pub player_id: Uuid,
    /// Catalog mission that was assigned.
    pub mission_id: Uuid,
    /// Phase the assignment was made for.
    pub kind: MissionKind,
    /// Placeholder-substituted text, frozen at assignment time.
    pub resolved_text: String,
    /// Copied from the catalog at assignment time; hides the text from
    /// other players.
    pub is_private: bool,
    /// Points the mission is worth, copied from the catalog at assignment
    /// time so decisions never re-read the catalog.
    pub points: i32,
    /// Whether the creator recorded a decision during validation.
    pub decided: bool,
    /// Whether the decision marked the mission as accomplished.
    pub validated: bool,
    /// Points credited by the decision (0 unless validated).
    pub points_earned: i32,
}

/// One offered mission inside a pending choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissionOffer {
    /// Catalog mission offered.
    pub mission_id: Uuid,
    /// Placeholder-substituted text, frozen at offer time.
    pub resolved_text: String,
}

/// Transient multi-choice offer handed to a player in choice mode; collapsed
/// into a [`PlayerMissionEntity`] by the external pick collaborator.
/// Uniqueness constraint on (`player_id`, `kind`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingChoiceEntity {
    /// Room the offer belongs to.
    pub room_code: String,
    /// Player the offer targets.
    pub player_id: Uuid,
    /// Phase the offer was made for.
    pub kind: MissionKind,
    /// Candidate missions, pairwise distinct.
    pub offers: Vec<MissionOffer>,
}

/// Event catalog entry, curated externally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEntity {
    /// Stable identifier for the catalog event.
    pub id: Uuid,
    /// Short display name.
    pub name: String,
    /// Event instructions shown to the room.
    pub text: String,
    /// Points credited to the winning team during events validation.
    pub points: i32,
}

/// Scheduled occurrence of a catalog event inside a room.
///
/// Created exactly once per room by the phase coordinator (uniqueness on
/// (`room_code`, `ordinal`)), surfaced write-once via `appeared_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEventEntity {
    /// Stable identifier for this occurrence.
    pub id: Uuid,
    /// Room the event was scheduled in.
    pub room_code: String,
    /// Seeding position, part of the write-once uniqueness key.
    pub ordinal: u32,
    /// Display name copied from the catalog.
    pub name: String,
    /// Instructions copied from the catalog.
    pub text: String,
    /// Points at stake, copied from the catalog.
    pub points: i32,
    /// Seconds of effective play after which the event surfaces.
    pub scheduled_at_secs: u64,
    /// Set once when the event surfaces; never cleared.
    pub appeared_at: Option<SystemTime>,
    /// Gates re-decision during events validation.
    pub decided: bool,
    /// Team credited with the event, `None` recorded as "no winner".
    pub winner: Option<TeamSide>,
}

/// Outcome of one mission inside a history snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMission {
    /// Frozen mission text as the player saw it.
    pub resolved_text: String,
    /// Phase the mission belonged to.
    pub kind: MissionKind,
    /// Whether the creator validated it.
    pub validated: bool,
    /// Points it contributed to the final score.
    pub points_earned: i32,
}

/// Outcome of one player inside a history snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryPlayer {
    /// Player display name at finalization time.
    pub name: String,
    /// Team the player ended on.
    pub team: TeamSide,
    /// All the player's missions with their outcomes.
    pub missions: Vec<HistoryMission>,
}

/// Outcome of one appeared event inside a history snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEvent {
    /// Event display name.
    pub name: String,
    /// Points the event was worth.
    pub points: i32,
    /// Team credited, if any.
    pub winner: Option<TeamSide>,
}

/// Immutable snapshot of a completed game, written exactly once by
/// finalization and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameHistoryEntity {
    /// Stable identifier for the snapshot.
    pub id: Uuid,
    /// Room the game was played in.
    pub room_code: String,
    /// Instant the game was finalized.
    pub finished_at: SystemTime,
    /// Every player with their mission outcomes.
    pub players: Vec<HistoryPlayer>,
    /// Every appeared event with its outcome.
    pub events: Vec<HistoryEvent>,
    /// Final red team score.
    pub red_score: i32,
    /// Final blue team score.
    pub blue_score: i32,
    /// Winning team, if one was selected.
    pub winner_team: Option<TeamSide>,
    /// Victory bonus credited to the winner, when the option was enabled.
    pub bonus_points: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_started_at(start: SystemTime) -> RoomEntity {
        RoomEntity {
            code: "ABCD".into(),
            creator_token: "tok".into(),
            game_started: true,
            game_stopped: false,
            game_start_time: Some(start),
            total_paused: Duration::ZERO,
            event_paused_at: None,
            mid_mission_delay_secs: 300,
            late_mission_delay_secs: 900,
            mission_choice_count: 1,
            victory_bonus_enabled: false,
            map_name: None,
            validation_status: None,
            winner_team: None,
            players: Vec::new(),
        }
    }

    #[test]
    fn effective_elapsed_excludes_paused_time() {
        let start = SystemTime::UNIX_EPOCH;
        let mut room = room_started_at(start);
        room.total_paused = Duration::from_secs(40);

        let now = start + Duration::from_secs(100);
        assert_eq!(room.effective_elapsed(now), Some(Duration::from_secs(60)));
    }

    #[test]
    fn effective_elapsed_excludes_running_event_pause() {
        let start = SystemTime::UNIX_EPOCH;
        let mut room = room_started_at(start);
        room.event_paused_at = Some(start + Duration::from_secs(80));

        let now = start + Duration::from_secs(100);
        assert_eq!(room.effective_elapsed(now), Some(Duration::from_secs(80)));
    }

    #[test]
    fn effective_elapsed_is_none_before_start() {
        let mut room = room_started_at(SystemTime::UNIX_EPOCH);
        room.game_start_time = None;
        assert_eq!(room.effective_elapsed(SystemTime::UNIX_EPOCH), None);
    }

    #[test]
    fn mission_applicability_follows_map_filter() {
        let mission = MissionEntity {
            id: Uuid::new_v4(),
            kind: MissionKind::Mid,
            category: "social".into(),
            difficulty: 2,
            points: 3,
            is_private: false,
            maps: vec!["villa".into()],
            text: "Swap two chairs without being seen".into(),
            placeholder: PlayerPlaceholder::None,
        };

        assert!(mission.applies_to(Some("villa")));
        assert!(!mission.applies_to(Some("campsite")));
        assert!(mission.applies_to(None));
    }
}
