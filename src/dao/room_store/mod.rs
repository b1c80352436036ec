//! Persistence abstraction for rooms and the content the coordinators own.

pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    EventEntity, GameHistoryEntity, MissionEntity, MissionKind, PendingChoiceEntity,
    PlayerMissionEntity, RoomEntity, RoomEventEntity, TeamSide,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer.
///
/// Unique inserts and conditional updates are the transactional primitives
/// the coordinators rely on: a lost race surfaces as
/// [`StorageError::Duplicate`](crate::dao::storage::StorageError::Duplicate)
/// or as a `false` return, never as partial state.
pub trait RoomStore: Send + Sync {
    /// Fetch a room with its ordered roster.
    fn find_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;

    /// Catalog missions of one kind.
    fn missions_by_kind(
        &self,
        kind: MissionKind,
    ) -> BoxFuture<'static, StorageResult<Vec<MissionEntity>>>;

    /// The full event catalog.
    fn event_catalog(&self) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>>;

    /// Every mission assignment recorded for a room.
    fn player_missions(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerMissionEntity>>>;

    /// Every pending multi-choice offer recorded for a room.
    fn pending_choices(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PendingChoiceEntity>>>;

    /// Insert a batch of assignments, all-or-nothing against the
    /// (`player_id`, `kind`) uniqueness constraint.
    fn insert_player_missions(
        &self,
        missions: Vec<PlayerMissionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert a batch of choice offers, all-or-nothing against the
    /// (`player_id`, `kind`) uniqueness constraint.
    fn insert_pending_choices(
        &self,
        choices: Vec<PendingChoiceEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Record (or idempotently re-record) the decision for one assignment.
    /// Returns `false` when no such assignment exists.
    fn record_mission_decision(
        &self,
        room_code: &str,
        player_id: Uuid,
        kind: MissionKind,
        validated: bool,
        points_earned: i32,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Every scheduled event occurrence of a room, in ordinal order.
    fn room_events(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEventEntity>>>;

    /// Seed a room's event schedule, all-or-nothing against the
    /// (`room_code`, `ordinal`) uniqueness constraint.
    fn insert_room_events(
        &self,
        events: Vec<RoomEventEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Surface an event: set `appeared_at` if it is still unset.
    /// Returns whether this call performed the write.
    fn mark_event_appeared(
        &self,
        room_code: &str,
        event_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Record the ternary decision for an appeared event, gated on it not
    /// being decided yet. Returns whether this call performed the write.
    fn decide_event(
        &self,
        room_code: &str,
        event_id: Uuid,
        winner: Option<TeamSide>,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Hold the room clock for an appeared event. Returns `false` when the
    /// clock is already held.
    fn pause_for_event(
        &self,
        room_code: &str,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Release the event hold, folding the interval into the accumulated
    /// pause. Returns `false` when no hold was active.
    fn resume_from_event(
        &self,
        room_code: &str,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Compare-and-swap the room's encoded validation status. Returns
    /// whether the swap applied; `false` means another writer moved first.
    fn swap_validation_status(
        &self,
        room_code: &str,
        expected: Option<String>,
        next: Option<String>,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Record the winner selected during bonus selection.
    fn set_winner_team(
        &self,
        room_code: &str,
        team: TeamSide,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Finalize a room: flip `game_stopped` (the mutual-exclusion point) and
    /// persist the history snapshot. Fails with a conflict when the room was
    /// already finalized.
    fn finalize_room(
        &self,
        room_code: &str,
        history: GameHistoryEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Fetch the history snapshot of a finalized room.
    fn find_history(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<GameHistoryEntity>>>;

    /// Cheap backend liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Attempt to re-establish a lost backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
