//! Idempotent phase-transition coordinator.
//!
//! Every connected client's local timer calls the same attempt endpoint, so
//! correctness never depends on a single caller owning the transition. The
//! store's uniqueness constraints are the mutual-exclusion primitive: losing
//! the insert race is a success path ("someone else did it"), not an error.

use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            MissionEntity, MissionKind, MissionOffer, PendingChoiceEntity, PlayerMissionEntity,
            RoomEntity, RoomEventEntity,
        },
        room_store::RoomStore,
    },
    dto::phase::{PhaseAttemptResponse, PhaseAttemptStatus, PhaseParam},
    error::ServiceError,
    services::{
        assignment::{self, AssignError},
        room_service, sse_events,
    },
    state::SharedState,
};

/// Read-back verification attempts after an observed write.
const VERIFY_ATTEMPTS: u32 = 3;
/// Backoff between verification attempts.
const VERIFY_BACKOFF: Duration = Duration::from_millis(50);

/// Attempt a timed phase transition for a room.
///
/// Callable concurrently and redundantly; at most one caller per room and
/// phase ever lands content, everyone else observes `not_yet` or
/// `already_done` without side effects beyond a notification publish.
pub async fn attempt_phase(
    state: &SharedState,
    code: &str,
    phase: PhaseParam,
) -> Result<PhaseAttemptResponse, ServiceError> {
    let room = room_service::load_room(state, code).await?;

    if !room.game_started {
        return Err(ServiceError::InvalidState(
            "the game has not started yet".into(),
        ));
    }
    if room.game_stopped {
        return Err(ServiceError::InvalidState("the game is over".into()));
    }
    if room.players.is_empty() {
        return Err(ServiceError::InvalidState("the room has no players".into()));
    }

    let now = SystemTime::now();
    let elapsed = room
        .effective_elapsed(now)
        .ok_or_else(|| ServiceError::InvalidState("the game clock never started".into()))?
        .as_secs();

    match phase {
        PhaseParam::Mid => {
            attempt_mission_phase(state, &room, MissionKind::Mid, elapsed).await
        }
        PhaseParam::Late => {
            attempt_mission_phase(state, &room, MissionKind::Late, elapsed).await
        }
        PhaseParam::Event => attempt_event_phase(state, &room, elapsed, now).await,
    }
}

/// Release the clock hold of the currently open event. Creator only.
pub async fn resume_after_event(
    state: &SharedState,
    code: &str,
    token: &str,
) -> Result<(), ServiceError> {
    let room = room_service::load_room(state, code).await?;
    room_service::ensure_creator(token, &room)?;

    let store = state.require_room_store().await?;
    let resumed = store.resume_from_event(code, SystemTime::now()).await?;
    if !resumed {
        return Err(ServiceError::InvalidState(
            "no event is holding the room clock".into(),
        ));
    }

    sse_events::broadcast_event_closed(state, code);
    Ok(())
}

async fn attempt_mission_phase(
    state: &SharedState,
    room: &RoomEntity,
    kind: MissionKind,
    elapsed: u64,
) -> Result<PhaseAttemptResponse, ServiceError> {
    let required = match kind {
        MissionKind::Late => room.late_mission_delay_secs,
        _ => room.mid_mission_delay_secs,
    };

    if elapsed < required {
        return Ok(response(PhaseAttemptStatus::NotYet, elapsed, required));
    }

    let store = state.require_room_store().await?;
    let code = room.code.as_str();
    let choice_mode = room.mission_choice_count > 1;

    // Unlocked pre-check: cheap no-op when the transition already happened.
    if phase_content_exists(store.as_ref(), code, kind).await? {
        verify_completeness(store.as_ref(), room, kind, choice_mode).await?;
        sse_events::broadcast_phase_assigned(state, code, kind, choice_mode);
        return Ok(response(PhaseAttemptStatus::AlreadyDone, elapsed, required));
    }

    let pool: Vec<MissionEntity> = store
        .missions_by_kind(kind)
        .await?
        .into_iter()
        .filter(|mission| mission.applies_to(room.map_name.as_deref()))
        .collect();

    // The uniqueness constraint closes the race between the pre-check and
    // this write: a concurrent winner turns our insert into a duplicate.
    let wrote = if choice_mode {
        insert_choice_offers(store.as_ref(), room, kind, &pool).await?
    } else {
        insert_direct_assignments(store.as_ref(), room, kind, &pool).await?
    };

    verify_completeness(store.as_ref(), room, kind, choice_mode).await?;
    sse_events::broadcast_phase_assigned(state, code, kind, choice_mode);

    let status = if wrote {
        PhaseAttemptStatus::Assigned
    } else {
        PhaseAttemptStatus::AlreadyDone
    };
    Ok(response(status, elapsed, required))
}

async fn insert_direct_assignments(
    store: &dyn RoomStore,
    room: &RoomEntity,
    kind: MissionKind,
    pool: &[MissionEntity],
) -> Result<bool, ServiceError> {
    if pool.len() < room.players.len() {
        return Err(ServiceError::InsufficientPool {
            required: room.players.len(),
            available: pool.len(),
        });
    }

    let assigned = assignment::assign_direct(&room.players, pool, &mut rand::rng())
        .map_err(map_assign_error)?;

    let rows: Vec<PlayerMissionEntity> = assigned
        .into_iter()
        .map(|(player_id, entry)| PlayerMissionEntity {
            room_code: room.code.clone(),
            player_id,
            mission_id: entry.mission.id,
            kind,
            resolved_text: entry.resolved_text,
            is_private: entry.mission.is_private,
            points: entry.mission.points,
            decided: false,
            validated: false,
            points_earned: 0,
        })
        .collect();

    absorb_duplicate(store.insert_player_missions(rows).await, &room.code, kind)
}

async fn insert_choice_offers(
    store: &dyn RoomStore,
    room: &RoomEntity,
    kind: MissionKind,
    pool: &[MissionEntity],
) -> Result<bool, ServiceError> {
    if !room.players.iter().any(|player| player.team.is_rostered()) {
        return Err(ServiceError::InvalidState(
            "choice mode requires at least one team-rostered player".into(),
        ));
    }

    let k = room.mission_choice_count as usize;
    let offers = assignment::assign_choices(&room.players, pool, k, &mut rand::rng())
        .map_err(map_assign_error)?;

    let rows: Vec<PendingChoiceEntity> = offers
        .into_iter()
        .map(|(player_id, drawn)| PendingChoiceEntity {
            room_code: room.code.clone(),
            player_id,
            kind,
            offers: drawn
                .into_iter()
                .map(|entry| MissionOffer {
                    mission_id: entry.mission.id,
                    resolved_text: entry.resolved_text,
                })
                .collect(),
        })
        .collect();

    absorb_duplicate(store.insert_pending_choices(rows).await, &room.code, kind)
}

/// Turn a lost uniqueness race into the success-by-other path.
fn absorb_duplicate(
    result: Result<(), crate::dao::storage::StorageError>,
    code: &str,
    kind: MissionKind,
) -> Result<bool, ServiceError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_duplicate() => {
            info!(room = code, ?kind, "concurrent caller won the assignment race");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Re-read the room content with bounded retry until every eligible player
/// is covered. Tolerates the narrow window where a concurrent writer has
/// committed content for some but not all players; fails closed otherwise.
async fn verify_completeness(
    store: &dyn RoomStore,
    room: &RoomEntity,
    kind: MissionKind,
    choice_mode: bool,
) -> Result<(), ServiceError> {
    let eligible: Vec<Uuid> = room
        .players
        .iter()
        .filter(|player| !choice_mode || player.team.is_rostered())
        .map(|player| player.id)
        .collect();

    for attempt in 0..VERIFY_ATTEMPTS {
        let covered = if choice_mode {
            let choices = store.pending_choices(&room.code).await?;
            eligible.iter().all(|player_id| {
                choices
                    .iter()
                    .any(|choice| choice.player_id == *player_id && choice.kind == kind)
            })
        } else {
            let assignments = store.player_missions(&room.code).await?;
            eligible.iter().all(|player_id| {
                assignments
                    .iter()
                    .any(|row| row.player_id == *player_id && row.kind == kind)
            })
        };

        if covered {
            return Ok(());
        }

        if attempt + 1 < VERIFY_ATTEMPTS {
            sleep(VERIFY_BACKOFF).await;
        }
    }

    warn!(
        room = %room.code,
        ?kind,
        "assignment verification exhausted its retries"
    );
    Err(ServiceError::IncompleteAssignment {
        room: room.code.clone(),
        phase: kind_label(kind),
    })
}

async fn attempt_event_phase(
    state: &SharedState,
    room: &RoomEntity,
    elapsed: u64,
    now: SystemTime,
) -> Result<PhaseAttemptResponse, ServiceError> {
    let store = state.require_room_store().await?;
    let code = room.code.as_str();

    let mut events = store.room_events(code).await?;

    // First attempt after game start seeds the schedule exactly once; the
    // (room_code, ordinal) uniqueness constraint absorbs seeding races.
    if events.is_empty() {
        let catalog = store.event_catalog().await?;
        let count = state.config().room_event_count() as usize;
        if catalog.is_empty() {
            return Err(ServiceError::InsufficientPool {
                required: count,
                available: 0,
            });
        }

        let window = room.mid_mission_delay_secs..room.late_mission_delay_secs;
        let scheduled = assignment::schedule_events(&catalog, count, window, &mut rand::rng());

        let rows: Vec<RoomEventEntity> = scheduled
            .into_iter()
            .enumerate()
            .map(|(ordinal, (event, at))| RoomEventEntity {
                id: Uuid::new_v4(),
                room_code: room.code.clone(),
                ordinal: ordinal as u32,
                name: event.name,
                text: event.text,
                points: event.points,
                scheduled_at_secs: at,
                appeared_at: None,
                decided: false,
                winner: None,
            })
            .collect();

        match store.insert_room_events(rows).await {
            Ok(()) => {}
            Err(err) if err.is_duplicate() => {
                info!(room = code, "concurrent caller won the event seeding race");
            }
            Err(err) => return Err(err.into()),
        }

        events = store.room_events(code).await?;
    }

    let last_required = events
        .iter()
        .map(|event| event.scheduled_at_secs)
        .max()
        .unwrap_or(0);

    // One event on screen at a time: while the clock is held, the live
    // event is the already-happened transition.
    if room.event_paused_at.is_some() {
        if let Some(live) = events
            .iter()
            .filter(|event| event.appeared_at.is_some())
            .max_by_key(|event| event.scheduled_at_secs)
        {
            sse_events::broadcast_event_appeared(state, code, live.id, &live.name);
        }
        return Ok(response(PhaseAttemptStatus::AlreadyDone, elapsed, last_required));
    }

    let Some(next) = events
        .iter()
        .filter(|event| event.appeared_at.is_none())
        .min_by_key(|event| event.scheduled_at_secs)
    else {
        // Everything surfaced already; keep the fan-out robust by letting
        // late observers publish too.
        if let Some(last) = events.iter().max_by_key(|event| event.scheduled_at_secs) {
            sse_events::broadcast_event_appeared(state, code, last.id, &last.name);
        }
        return Ok(response(PhaseAttemptStatus::AlreadyDone, elapsed, last_required));
    };

    if elapsed < next.scheduled_at_secs {
        return Ok(response(
            PhaseAttemptStatus::NotYet,
            elapsed,
            next.scheduled_at_secs,
        ));
    }

    let surfaced = store.mark_event_appeared(code, next.id, now).await?;
    if surfaced {
        // Hold the clock until the creator closes the event overlay.
        store.pause_for_event(code, now).await?;
    }

    sse_events::broadcast_event_appeared(state, code, next.id, &next.name);

    let status = if surfaced {
        PhaseAttemptStatus::Assigned
    } else {
        PhaseAttemptStatus::AlreadyDone
    };
    Ok(response(status, elapsed, next.scheduled_at_secs))
}

fn map_assign_error(err: AssignError) -> ServiceError {
    match err {
        AssignError::InsufficientPool {
            required,
            available,
        } => ServiceError::InsufficientPool {
            required,
            available,
        },
        err @ AssignError::NoEligiblePlayer { .. } => ServiceError::InvalidState(err.to_string()),
    }
}

async fn phase_content_exists(
    store: &dyn RoomStore,
    code: &str,
    kind: MissionKind,
) -> Result<bool, ServiceError> {
    let assignments = store.player_missions(code).await?;
    if assignments.iter().any(|row| row.kind == kind) {
        return Ok(true);
    }
    let choices = store.pending_choices(code).await?;
    Ok(choices.iter().any(|choice| choice.kind == kind))
}

fn kind_label(kind: MissionKind) -> &'static str {
    match kind {
        MissionKind::Start => "start",
        MissionKind::Mid => "mid",
        MissionKind::Late => "late",
    }
}

fn response(status: PhaseAttemptStatus, elapsed: u64, required: u64) -> PhaseAttemptResponse {
    PhaseAttemptResponse {
        status,
        elapsed_secs: elapsed,
        required_secs: required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{EventEntity, PlayerEntity, PlayerPlaceholder, TeamSide},
            room_store::memory::MemoryRoomStore,
        },
        state::AppState,
    };
    use std::sync::Arc;

    const CREATOR: &str = "creator-token";

    fn player(name: &str, team: TeamSide) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            name: name.into(),
            team,
            token: format!("tok-{name}"),
        }
    }

    fn room(code: &str, started_secs_ago: u64, mid: u64, late: u64, choice: u32) -> RoomEntity {
        RoomEntity {
            code: code.into(),
            creator_token: CREATOR.into(),
            game_started: true,
            game_stopped: false,
            game_start_time: Some(SystemTime::now() - Duration::from_secs(started_secs_ago)),
            total_paused: Duration::ZERO,
            event_paused_at: None,
            mid_mission_delay_secs: mid,
            late_mission_delay_secs: late,
            mission_choice_count: choice,
            victory_bonus_enabled: false,
            map_name: None,
            validation_status: None,
            winner_team: None,
            players: vec![
                player("Ana", TeamSide::Red),
                player("Bob", TeamSide::Red),
                player("Cleo", TeamSide::Blue),
                player("Dan", TeamSide::Blue),
            ],
        }
    }

    fn missions(kind: MissionKind, count: usize) -> Vec<MissionEntity> {
        (0..count)
            .map(|i| MissionEntity {
                id: Uuid::new_v4(),
                kind,
                category: "social".into(),
                difficulty: 2,
                points: 3,
                is_private: false,
                maps: Vec::new(),
                text: format!("mission {i}"),
                placeholder: PlayerPlaceholder::None,
            })
            .collect()
    }

    fn event_catalog(count: usize) -> Vec<EventEntity> {
        (0..count)
            .map(|i| EventEntity {
                id: Uuid::new_v4(),
                name: format!("event {i}"),
                text: "everyone freezes".into(),
                points: 5,
            })
            .collect()
    }

    async fn install(store: &MemoryRoomStore) -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.set_room_store(Arc::new(store.clone())).await;
        state
    }

    #[tokio::test]
    async fn mid_phase_assigns_exactly_once_per_player() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", 301, 300, 900, 1));
        store.seed_missions(missions(MissionKind::Mid, 5));
        let state = install(&store).await;

        let first = attempt_phase(&state, "K7QX", PhaseParam::Mid).await.unwrap();
        assert_eq!(first.status, PhaseAttemptStatus::Assigned);
        assert_eq!(first.required_secs, 300);

        let second = attempt_phase(&state, "K7QX", PhaseParam::Mid).await.unwrap();
        assert_eq!(second.status, PhaseAttemptStatus::AlreadyDone);

        let rows = store.player_missions("K7QX").await.unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|row| row.kind == MissionKind::Mid));
    }

    #[tokio::test]
    async fn concurrent_attempts_assign_exactly_once() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", 301, 300, 900, 1));
        store.seed_missions(missions(MissionKind::Mid, 4));
        let state = install(&store).await;

        let (a, b) = tokio::join!(
            attempt_phase(&state, "K7QX", PhaseParam::Mid),
            attempt_phase(&state, "K7QX", PhaseParam::Mid),
        );
        let mut statuses = vec![a.unwrap().status, b.unwrap().status];
        statuses.sort_by_key(|status| *status == PhaseAttemptStatus::Assigned);

        assert_eq!(
            statuses,
            vec![PhaseAttemptStatus::AlreadyDone, PhaseAttemptStatus::Assigned]
        );
        assert_eq!(store.player_missions("K7QX").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn threshold_gates_each_phase_independently() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", 500, 300, 900, 1));
        store.seed_missions(missions(MissionKind::Late, 5));
        let state = install(&store).await;

        let response = attempt_phase(&state, "K7QX", PhaseParam::Late).await.unwrap();
        assert_eq!(response.status, PhaseAttemptStatus::NotYet);
        assert_eq!(response.required_secs, 900);
        assert!(store.player_missions("K7QX").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn choice_mode_offers_k_missions_per_rostered_player() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", 301, 300, 900, 2));
        store.seed_missions(missions(MissionKind::Mid, 8));
        let state = install(&store).await;

        let response = attempt_phase(&state, "K7QX", PhaseParam::Mid).await.unwrap();
        assert_eq!(response.status, PhaseAttemptStatus::Assigned);

        let choices = store.pending_choices("K7QX").await.unwrap();
        assert_eq!(choices.len(), 4);
        assert!(choices.iter().all(|choice| choice.offers.len() == 2));
        assert!(store.player_missions("K7QX").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn choice_mode_rejects_a_short_pool() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", 301, 300, 900, 2));
        store.seed_missions(missions(MissionKind::Mid, 7));
        let state = install(&store).await;

        let err = attempt_phase(&state, "K7QX", PhaseParam::Mid).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientPool {
                required: 8,
                available: 7,
            }
        ));
        assert!(store.pending_choices("K7QX").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn event_phase_seeds_surfaces_and_pauses() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", 1000, 10, 20, 1));
        store.seed_event_catalog(event_catalog(5));
        let state = install(&store).await;

        // First attempt seeds the schedule and surfaces the earliest event.
        let first = attempt_phase(&state, "K7QX", PhaseParam::Event).await.unwrap();
        assert_eq!(first.status, PhaseAttemptStatus::Assigned);

        let events = store.room_events("K7QX").await.unwrap();
        assert_eq!(events.len(), AppConfig::default().room_event_count() as usize);
        assert_eq!(events.iter().filter(|e| e.appeared_at.is_some()).count(), 1);

        let paused = store.find_room("K7QX").await.unwrap().unwrap();
        assert!(paused.event_paused_at.is_some());

        // While the event holds the clock, further attempts are no-ops.
        let held = attempt_phase(&state, "K7QX", PhaseParam::Event).await.unwrap();
        assert_eq!(held.status, PhaseAttemptStatus::AlreadyDone);

        resume_after_event(&state, "K7QX", CREATOR).await.unwrap();
        let resumed = store.find_room("K7QX").await.unwrap().unwrap();
        assert!(resumed.event_paused_at.is_none());

        // Second event surfaces, then the schedule is exhausted.
        let second = attempt_phase(&state, "K7QX", PhaseParam::Event).await.unwrap();
        assert_eq!(second.status, PhaseAttemptStatus::Assigned);
        resume_after_event(&state, "K7QX", CREATOR).await.unwrap();

        let done = attempt_phase(&state, "K7QX", PhaseParam::Event).await.unwrap();
        assert_eq!(done.status, PhaseAttemptStatus::AlreadyDone);
    }

    #[tokio::test]
    async fn stopped_room_rejects_attempts() {
        let store = MemoryRoomStore::new();
        let mut stopped = room("K7QX", 301, 300, 900, 1);
        stopped.game_stopped = true;
        store.seed_room(stopped);
        let state = install(&store).await;

        let err = attempt_phase(&state, "K7QX", PhaseParam::Mid).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn resume_is_creator_only() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", 1000, 10, 20, 1));
        store.seed_event_catalog(event_catalog(3));
        let state = install(&store).await;

        attempt_phase(&state, "K7QX", PhaseParam::Event).await.unwrap();

        let err = resume_after_event(&state, "K7QX", "tok-Ana").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
