//! In-memory [`RoomStore`] backend.
//!
//! Always compiled: it backs the test suite and lets the server run without
//! a database. Every operation takes the single inner lock, which makes the
//! batch inserts and conditional updates atomic — the same guarantees the
//! MongoDB backend gets from its unique indexes and filtered updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    EventEntity, GameHistoryEntity, MissionEntity, MissionKind, PendingChoiceEntity,
    PlayerMissionEntity, RoomEntity, RoomEventEntity, TeamSide,
};
use crate::dao::room_store::RoomStore;
use crate::dao::storage::{StorageError, StorageResult};

#[derive(Default)]
struct MemoryInner {
    rooms: HashMap<String, RoomEntity>,
    missions: Vec<MissionEntity>,
    event_catalog: Vec<EventEntity>,
    player_missions: Vec<PlayerMissionEntity>,
    pending_choices: Vec<PendingChoiceEntity>,
    room_events: Vec<RoomEventEntity>,
    histories: HashMap<String, GameHistoryEntity>,
}

/// Process-local [`RoomStore`] implementation.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace a room. Stands in for the out-of-scope room CRUD
    /// collaborator.
    pub fn seed_room(&self, room: RoomEntity) {
        let mut inner = self.lock();
        inner.rooms.insert(room.code.clone(), room);
    }

    /// Install the mission catalog.
    pub fn seed_missions(&self, missions: Vec<MissionEntity>) {
        let mut inner = self.lock();
        inner.missions = missions;
    }

    /// Install the event catalog.
    pub fn seed_event_catalog(&self, events: Vec<EventEntity>) {
        let mut inner = self.lock();
        inner.event_catalog = events;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_room<T>(
        &self,
        code: &str,
        apply: impl FnOnce(&mut RoomEntity) -> T,
    ) -> StorageResult<T> {
        let mut inner = self.lock();
        let room = inner
            .rooms
            .get_mut(code)
            .ok_or_else(|| StorageError::conflict(format!("room `{code}` does not exist")))?;
        Ok(apply(room))
    }
}

impl RoomStore for MemoryRoomStore {
    fn find_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        let code = code.to_owned();
        Box::pin(async move { Ok(store.lock().rooms.get(&code).cloned()) })
    }

    fn missions_by_kind(
        &self,
        kind: MissionKind,
    ) -> BoxFuture<'static, StorageResult<Vec<MissionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .lock()
                .missions
                .iter()
                .filter(|mission| mission.kind == kind)
                .cloned()
                .collect())
        })
    }

    fn event_catalog(&self) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.lock().event_catalog.clone()) })
    }

    fn player_missions(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerMissionEntity>>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            Ok(store
                .lock()
                .player_missions
                .iter()
                .filter(|assignment| assignment.room_code == room_code)
                .cloned()
                .collect())
        })
    }

    fn pending_choices(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PendingChoiceEntity>>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            Ok(store
                .lock()
                .pending_choices
                .iter()
                .filter(|choice| choice.room_code == room_code)
                .cloned()
                .collect())
        })
    }

    fn insert_player_missions(
        &self,
        missions: Vec<PlayerMissionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inner = store.lock();
            let collides = missions.iter().any(|candidate| {
                inner.player_missions.iter().any(|existing| {
                    existing.player_id == candidate.player_id && existing.kind == candidate.kind
                })
            });
            if collides {
                return Err(StorageError::duplicate("player_missions(player_id, kind)"));
            }
            inner.player_missions.extend(missions);
            Ok(())
        })
    }

    fn insert_pending_choices(
        &self,
        choices: Vec<PendingChoiceEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inner = store.lock();
            let collides = choices.iter().any(|candidate| {
                inner.pending_choices.iter().any(|existing| {
                    existing.player_id == candidate.player_id && existing.kind == candidate.kind
                })
            });
            if collides {
                return Err(StorageError::duplicate("pending_choices(player_id, kind)"));
            }
            inner.pending_choices.extend(choices);
            Ok(())
        })
    }

    fn record_mission_decision(
        &self,
        room_code: &str,
        player_id: Uuid,
        kind: MissionKind,
        validated: bool,
        points_earned: i32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            let mut inner = store.lock();
            let Some(assignment) = inner.player_missions.iter_mut().find(|assignment| {
                assignment.room_code == room_code
                    && assignment.player_id == player_id
                    && assignment.kind == kind
            }) else {
                return Ok(false);
            };
            assignment.decided = true;
            assignment.validated = validated;
            assignment.points_earned = points_earned;
            Ok(true)
        })
    }

    fn room_events(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEventEntity>>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            let mut events: Vec<RoomEventEntity> = store
                .lock()
                .room_events
                .iter()
                .filter(|event| event.room_code == room_code)
                .cloned()
                .collect();
            events.sort_by_key(|event| event.ordinal);
            Ok(events)
        })
    }

    fn insert_room_events(
        &self,
        events: Vec<RoomEventEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inner = store.lock();
            let collides = events.iter().any(|candidate| {
                inner.room_events.iter().any(|existing| {
                    existing.room_code == candidate.room_code
                        && existing.ordinal == candidate.ordinal
                })
            });
            if collides {
                return Err(StorageError::duplicate("room_events(room_code, ordinal)"));
            }
            inner.room_events.extend(events);
            Ok(())
        })
    }

    fn mark_event_appeared(
        &self,
        room_code: &str,
        event_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            let mut inner = store.lock();
            let Some(event) = inner
                .room_events
                .iter_mut()
                .find(|event| event.room_code == room_code && event.id == event_id)
            else {
                return Ok(false);
            };
            if event.appeared_at.is_some() {
                return Ok(false);
            }
            event.appeared_at = Some(at);
            Ok(true)
        })
    }

    fn decide_event(
        &self,
        room_code: &str,
        event_id: Uuid,
        winner: Option<TeamSide>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            let mut inner = store.lock();
            let Some(event) = inner
                .room_events
                .iter_mut()
                .find(|event| event.room_code == room_code && event.id == event_id)
            else {
                return Ok(false);
            };
            if event.appeared_at.is_none() || event.decided {
                return Ok(false);
            }
            event.decided = true;
            event.winner = winner;
            Ok(true)
        })
    }

    fn pause_for_event(
        &self,
        room_code: &str,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            store.with_room(&room_code, |room| {
                if room.event_paused_at.is_some() {
                    return false;
                }
                room.event_paused_at = Some(at);
                true
            })
        })
    }

    fn resume_from_event(
        &self,
        room_code: &str,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            store.with_room(&room_code, |room| {
                let Some(paused_at) = room.event_paused_at.take() else {
                    return false;
                };
                room.total_paused += at.duration_since(paused_at).unwrap_or_default();
                true
            })
        })
    }

    fn swap_validation_status(
        &self,
        room_code: &str,
        expected: Option<String>,
        next: Option<String>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            store.with_room(&room_code, |room| {
                if room.validation_status != expected {
                    return false;
                }
                room.validation_status = next;
                true
            })
        })
    }

    fn set_winner_team(
        &self,
        room_code: &str,
        team: TeamSide,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            store.with_room(&room_code, |room| {
                room.winner_team = Some(team);
            })
        })
    }

    fn finalize_room(
        &self,
        room_code: &str,
        history: GameHistoryEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move {
            let mut inner = store.lock();
            let room = inner
                .rooms
                .get_mut(&room_code)
                .ok_or_else(|| StorageError::conflict(format!("room `{room_code}` does not exist")))?;
            if room.game_stopped {
                return Err(StorageError::conflict(format!(
                    "room `{room_code}` is already finalized"
                )));
            }
            room.game_stopped = true;
            inner.histories.insert(room_code, history);
            Ok(())
        })
    }

    fn find_history(
        &self,
        room_code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<GameHistoryEntity>>> {
        let store = self.clone();
        let room_code = room_code.to_owned();
        Box::pin(async move { Ok(store.lock().histories.get(&room_code).cloned()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::PlayerPlaceholder;

    fn assignment(player_id: Uuid, kind: MissionKind) -> PlayerMissionEntity {
        PlayerMissionEntity {
            room_code: "ROOM1".into(),
            player_id,
            mission_id: Uuid::new_v4(),
            kind,
            resolved_text: "Swap two chairs without being seen".into(),
            is_private: false,
            points: 3,
            decided: false,
            validated: false,
            points_earned: 0,
        }
    }

    #[tokio::test]
    async fn duplicate_assignment_batch_is_rejected_whole() {
        let store = MemoryRoomStore::new();
        let player = Uuid::new_v4();
        let other = Uuid::new_v4();

        store
            .insert_player_missions(vec![assignment(player, MissionKind::Mid)])
            .await
            .unwrap();

        let err = store
            .insert_player_missions(vec![
                assignment(other, MissionKind::Mid),
                assignment(player, MissionKind::Mid),
            ])
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        // The losing batch must not leave partial rows behind.
        let rows = store.player_missions("ROOM1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].player_id, player);
    }

    #[tokio::test]
    async fn same_player_may_hold_one_mission_per_kind() {
        let store = MemoryRoomStore::new();
        let player = Uuid::new_v4();

        store
            .insert_player_missions(vec![assignment(player, MissionKind::Mid)])
            .await
            .unwrap();
        store
            .insert_player_missions(vec![assignment(player, MissionKind::Late)])
            .await
            .unwrap();

        assert_eq!(store.player_missions("ROOM1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn event_appearance_is_write_once() {
        let store = MemoryRoomStore::new();
        let event_id = Uuid::new_v4();
        store
            .insert_room_events(vec![RoomEventEntity {
                id: event_id,
                room_code: "ROOM1".into(),
                ordinal: 0,
                name: "Blackout".into(),
                text: "Everyone keeps one eye closed".into(),
                points: 5,
                scheduled_at_secs: 120,
                appeared_at: None,
                decided: false,
                winner: None,
            }])
            .await
            .unwrap();

        let now = SystemTime::now();
        assert!(store.mark_event_appeared("ROOM1", event_id, now).await.unwrap());
        assert!(!store.mark_event_appeared("ROOM1", event_id, now).await.unwrap());
    }

    #[tokio::test]
    async fn placeholder_enum_defaults_to_none() {
        // Guards the serde default used when catalogs omit the field.
        let parsed: PlayerPlaceholder = serde_json::from_str("\"duel\"").unwrap();
        assert_eq!(parsed, PlayerPlaceholder::Duel);
        assert_eq!(PlayerPlaceholder::default(), PlayerPlaceholder::None);
    }
}
