//! Creator-driven validation coordinator.
//!
//! The encoded status on the room row is the single source of truth; every
//! transition goes through one compare-and-swap against the state the
//! coordinator validated, so a stale or duplicated request can never move
//! the machine twice or out of order. Spectators only ever render the
//! store-confirmed status.

use std::time::SystemTime;

use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{
        GameHistoryEntity, HistoryEvent, HistoryMission, HistoryPlayer, PlayerMissionEntity,
        RoomEntity, RoomEventEntity, TeamSide,
    },
    dto::validation::{
        AdvanceValidationRequest, DecideEventRequest, FinalizeResponse, RecordDecisionRequest,
        SelectBonusRequest, ValidationStatusResponse,
    },
    error::ServiceError,
    services::{assignment, room_service, sse_events},
    state::{InvalidTransition, SharedState, ValidationContext, ValidationState},
};

/// Begin validation: `idle` → `in_progress:0`. Creator only.
pub async fn start_validation(
    state: &SharedState,
    code: &str,
    token: &str,
) -> Result<ValidationStatusResponse, ServiceError> {
    let room = room_service::load_room(state, code).await?;
    room_service::ensure_creator(token, &room)?;

    if !room.game_started {
        return Err(ServiceError::InvalidState(
            "cannot validate before the game started".into(),
        ));
    }

    let current = ValidationState::parse(room.validation_status.as_deref())?;
    let ctx = ValidationContext {
        player_count: room.players.len(),
        ..Default::default()
    };
    let next = current.start(ctx)?;

    apply_status_swap(state, code, &current, &next).await?;
    Ok(status_response(&next))
}

/// Record (idempotently) the decision for one mission of the current player.
pub async fn record_decision(
    state: &SharedState,
    code: &str,
    token: &str,
    request: RecordDecisionRequest,
) -> Result<ValidationStatusResponse, ServiceError> {
    let room = room_service::load_room(state, code).await?;
    room_service::ensure_creator(token, &room)?;

    let current = ValidationState::parse(room.validation_status.as_deref())?;
    let Some(index) = current.current_player() else {
        return Err(InvalidTransition::new(
            current,
            "decisions are only accepted while stepping through players".to_string(),
        )
        .into());
    };

    // Decisions target the current player exclusively; anything else is a
    // client that ran ahead of the server-confirmed index.
    let is_current = room
        .players
        .get(index)
        .is_some_and(|player| player.id == request.player_id);
    if !is_current {
        return Err(InvalidTransition::new(
            current,
            format!("player {} is not the current validation step", request.player_id),
        )
        .into());
    }

    let store = state.require_room_store().await?;
    let assignments = store.player_missions(code).await?;
    let row = assignments
        .iter()
        .find(|row| row.player_id == request.player_id && row.kind == request.kind)
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "player {} holds no {:?} mission",
                request.player_id, request.kind
            ))
        })?;

    let points_earned = if request.validated { row.points } else { 0 };
    let updated = store
        .record_mission_decision(code, request.player_id, request.kind, request.validated, points_earned)
        .await?;
    if !updated {
        return Err(ServiceError::NotFound(format!(
            "player {} holds no {:?} mission",
            request.player_id, request.kind
        )));
    }

    sse_events::broadcast_mission_decided(state, code, request.player_id, request.kind, request.validated);
    Ok(status_response(&current))
}

/// Advance the machine to the requested next step.
pub async fn advance_validation(
    state: &SharedState,
    code: &str,
    token: &str,
    request: &AdvanceValidationRequest,
) -> Result<ValidationStatusResponse, ServiceError> {
    let room = room_service::load_room(state, code).await?;
    room_service::ensure_creator(token, &room)?;

    let store = state.require_room_store().await?;
    let assignments = store.player_missions(code).await?;
    let events = store.room_events(code).await?;

    let current = ValidationState::parse(room.validation_status.as_deref())?;
    let ctx = build_context(&room, &assignments, &events, &current);
    let next = current.advance(request.into(), ctx)?;

    apply_status_swap(state, code, &current, &next).await?;
    Ok(status_response(&next))
}

/// Record the ternary decision of one appeared event. Creator only; each
/// event accepts exactly one decision.
pub async fn decide_event(
    state: &SharedState,
    code: &str,
    token: &str,
    event_id: Uuid,
    request: DecideEventRequest,
) -> Result<ValidationStatusResponse, ServiceError> {
    let room = room_service::load_room(state, code).await?;
    room_service::ensure_creator(token, &room)?;

    let current = ValidationState::parse(room.validation_status.as_deref())?;
    if current != ValidationState::EventsValidation {
        return Err(InvalidTransition::new(
            current,
            "events can only be decided during events validation".to_string(),
        )
        .into());
    }

    let store = state.require_room_store().await?;
    let decided = store
        .decide_event(code, event_id, request.winner.team())
        .await?;
    if !decided {
        return Err(ServiceError::InvalidState(format!(
            "event `{event_id}` is unknown, never appeared, or was already decided"
        )));
    }

    sse_events::broadcast_event_decided(state, code, event_id, request.winner.team());
    Ok(status_response(&current))
}

/// Select the victory-bonus winner. Creator only.
pub async fn select_bonus_winner(
    state: &SharedState,
    code: &str,
    token: &str,
    request: SelectBonusRequest,
) -> Result<ValidationStatusResponse, ServiceError> {
    let room = room_service::load_room(state, code).await?;
    room_service::ensure_creator(token, &room)?;

    let current = ValidationState::parse(room.validation_status.as_deref())?;
    if current != ValidationState::BonusSelection {
        return Err(InvalidTransition::new(
            current,
            "the winner can only be selected during bonus selection".to_string(),
        )
        .into());
    }

    if !request.team.is_rostered() {
        return Err(ServiceError::InvalidInput(
            "the bonus winner must be the red or the blue team".into(),
        ));
    }

    let store = state.require_room_store().await?;
    store.set_winner_team(code, request.team).await?;

    sse_events::broadcast_bonus_selected(state, code, request.team);
    Ok(status_response(&current))
}

/// Finalize the room: write the history snapshot, stop the game, and move
/// the status to its terminal value. The history write is the single
/// irrevocable step.
pub async fn finalize(
    state: &SharedState,
    code: &str,
    token: &str,
) -> Result<FinalizeResponse, ServiceError> {
    let room = room_service::load_room(state, code).await?;
    room_service::ensure_creator(token, &room)?;

    let store = state.require_room_store().await?;
    let assignments = store.player_missions(code).await?;
    let events = store.room_events(code).await?;

    let current = ValidationState::parse(room.validation_status.as_deref())?;
    let ctx = build_context(&room, &assignments, &events, &current);
    current.ensure_finalizable(ctx)?;

    let (mut red_score, mut blue_score) = mission_scores(&room, &assignments);
    for event in events.iter().filter(|event| event.appeared_at.is_some()) {
        match event.winner {
            Some(TeamSide::Red) => red_score += event.points,
            Some(TeamSide::Blue) => blue_score += event.points,
            _ => {}
        }
    }

    let winner_team = room.winner_team;
    let bonus_points = if room.victory_bonus_enabled {
        let bonus = assignment::draw_bonus_points(state.config().bonus_range(), &mut rand::rng());
        match winner_team {
            Some(TeamSide::Red) => red_score += bonus,
            Some(TeamSide::Blue) => blue_score += bonus,
            _ => {}
        }
        bonus
    } else {
        0
    };

    let history = build_history(&room, &assignments, &events, red_score, blue_score, bonus_points);
    store.finalize_room(code, history).await?;

    // The room is stopped either way; a lost status swap only means another
    // finalizer already published the terminal state.
    let swapped = store
        .swap_validation_status(code, current.encode(), ValidationState::Finalized.encode())
        .await?;
    if !swapped {
        warn!(room = code, "validation status moved while finalizing");
    }

    sse_events::broadcast_validation_advanced(
        state,
        code,
        ValidationState::Finalized.encode().as_deref(),
    );
    sse_events::broadcast_game_finalized(state, code, red_score, blue_score, winner_team);

    Ok(FinalizeResponse {
        red_score,
        blue_score,
        winner_team,
        bonus_points,
    })
}

/// Swap the persisted status or fail: a lost swap means another writer
/// advanced the machine after our validation.
async fn apply_status_swap(
    state: &SharedState,
    code: &str,
    current: &ValidationState,
    next: &ValidationState,
) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let swapped = store
        .swap_validation_status(code, current.encode(), next.encode())
        .await?;
    if !swapped {
        return Err(ServiceError::InvalidState(
            "the validation status changed underneath this request".into(),
        ));
    }

    sse_events::broadcast_validation_advanced(state, code, next.encode().as_deref());
    Ok(())
}

fn build_context(
    room: &RoomEntity,
    assignments: &[PlayerMissionEntity],
    events: &[RoomEventEntity],
    current: &ValidationState,
) -> ValidationContext {
    let current_player_decided = current
        .current_player()
        .and_then(|index| room.players.get(index))
        .map(|player| {
            assignments
                .iter()
                .filter(|row| row.player_id == player.id)
                .all(|row| row.decided)
        })
        .unwrap_or(false);

    let appeared: Vec<&RoomEventEntity> = events
        .iter()
        .filter(|event| event.appeared_at.is_some())
        .collect();

    ValidationContext {
        player_count: room.players.len(),
        current_player_decided,
        any_event_appeared: !appeared.is_empty(),
        all_events_decided: appeared.iter().all(|event| event.decided),
        bonus_enabled: room.victory_bonus_enabled,
        winner_selected: room.winner_team.is_some(),
    }
}

fn mission_scores(room: &RoomEntity, assignments: &[PlayerMissionEntity]) -> (i32, i32) {
    let mut red = 0;
    let mut blue = 0;
    for player in &room.players {
        let earned: i32 = assignments
            .iter()
            .filter(|row| row.player_id == player.id)
            .map(|row| row.points_earned)
            .sum();
        match player.team {
            TeamSide::Red => red += earned,
            TeamSide::Blue => blue += earned,
            TeamSide::Unassigned => {}
        }
    }
    (red, blue)
}

fn build_history(
    room: &RoomEntity,
    assignments: &[PlayerMissionEntity],
    events: &[RoomEventEntity],
    red_score: i32,
    blue_score: i32,
    bonus_points: i32,
) -> GameHistoryEntity {
    let players = room
        .players
        .iter()
        .map(|player| HistoryPlayer {
            name: player.name.clone(),
            team: player.team,
            missions: assignments
                .iter()
                .filter(|row| row.player_id == player.id)
                .map(|row| HistoryMission {
                    resolved_text: row.resolved_text.clone(),
                    kind: row.kind,
                    validated: row.validated,
                    points_earned: row.points_earned,
                })
                .collect(),
        })
        .collect();

    let events = events
        .iter()
        .filter(|event| event.appeared_at.is_some())
        .map(|event| HistoryEvent {
            name: event.name.clone(),
            points: event.points,
            winner: event.winner,
        })
        .collect();

    GameHistoryEntity {
        id: Uuid::new_v4(),
        room_code: room.code.clone(),
        finished_at: SystemTime::now(),
        players,
        events,
        red_score,
        blue_score,
        winner_team: room.winner_team,
        bonus_points,
    }
}

fn status_response(state: &ValidationState) -> ValidationStatusResponse {
    ValidationStatusResponse {
        status: state.encode(),
        current_player: state.current_player(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{MissionKind, PlayerEntity},
            room_store::{RoomStore, memory::MemoryRoomStore},
        },
        dto::validation::EventWinner,
        state::AppState,
    };
    use std::{sync::Arc, time::Duration};

    const CREATOR: &str = "creator-token";

    fn player(name: &str, team: TeamSide) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            name: name.into(),
            team,
            token: format!("tok-{name}"),
        }
    }

    fn room(code: &str, bonus: bool) -> RoomEntity {
        RoomEntity {
            code: code.into(),
            creator_token: CREATOR.into(),
            game_started: true,
            game_stopped: false,
            game_start_time: Some(SystemTime::now() - Duration::from_secs(1000)),
            total_paused: Duration::ZERO,
            event_paused_at: None,
            mid_mission_delay_secs: 300,
            late_mission_delay_secs: 900,
            mission_choice_count: 1,
            victory_bonus_enabled: bonus,
            map_name: None,
            validation_status: None,
            winner_team: None,
            players: vec![
                player("Ana", TeamSide::Red),
                player("Bob", TeamSide::Blue),
                player("Cleo", TeamSide::Red),
            ],
        }
    }

    fn mission_row(room: &RoomEntity, index: usize, points: i32) -> PlayerMissionEntity {
        PlayerMissionEntity {
            room_code: room.code.clone(),
            player_id: room.players[index].id,
            mission_id: Uuid::new_v4(),
            kind: MissionKind::Mid,
            resolved_text: format!("mission of player {index}"),
            is_private: false,
            points,
            decided: false,
            validated: false,
            points_earned: 0,
        }
    }

    fn appeared_event(room: &RoomEntity, points: i32) -> RoomEventEntity {
        RoomEventEntity {
            id: Uuid::new_v4(),
            room_code: room.code.clone(),
            ordinal: 0,
            name: "Blackout".into(),
            text: "everyone freezes".into(),
            points,
            scheduled_at_secs: 400,
            appeared_at: Some(SystemTime::now()),
            decided: false,
            winner: None,
        }
    }

    async fn install(store: &MemoryRoomStore) -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.set_room_store(Arc::new(store.clone())).await;
        state
    }

    async fn decide(
        state: &SharedState,
        code: &str,
        player_id: Uuid,
        validated: bool,
    ) -> Result<ValidationStatusResponse, ServiceError> {
        record_decision(
            state,
            code,
            CREATOR,
            RecordDecisionRequest {
                player_id,
                kind: MissionKind::Mid,
                validated,
            },
        )
        .await
    }

    #[tokio::test]
    async fn full_validation_flow_without_events_or_bonus() {
        let store = MemoryRoomStore::new();
        let the_room = room("K7QX", false);
        store
            .insert_player_missions(vec![
                mission_row(&the_room, 0, 3),
                mission_row(&the_room, 1, 5),
                mission_row(&the_room, 2, 2),
            ])
            .await
            .unwrap();
        store.seed_room(the_room.clone());
        let state = install(&store).await;

        let started = start_validation(&state, "K7QX", CREATOR).await.unwrap();
        assert_eq!(started.status.as_deref(), Some("in_progress:0"));

        for index in 0..3 {
            decide(&state, "K7QX", the_room.players[index].id, index != 1)
                .await
                .unwrap();
            if index < 2 {
                let advanced = advance_validation(
                    &state,
                    "K7QX",
                    CREATOR,
                    &AdvanceValidationRequest::Player { index: index + 1 },
                )
                .await
                .unwrap();
                assert_eq!(advanced.current_player, Some(index + 1));
            }
        }

        let result = finalize(&state, "K7QX", CREATOR).await.unwrap();
        // Ana (red) validated 3, Bob (blue) failed, Cleo (red) validated 2.
        assert_eq!(result.red_score, 5);
        assert_eq!(result.blue_score, 0);
        assert_eq!(result.bonus_points, 0);

        let stopped = store.find_room("K7QX").await.unwrap().unwrap();
        assert!(stopped.game_stopped);
        assert_eq!(stopped.validation_status.as_deref(), Some("finalized"));

        let history = store.find_history("K7QX").await.unwrap().unwrap();
        assert_eq!(history.players.len(), 3);
        assert_eq!(history.red_score, 5);

        // Finalization is irrevocable.
        let err = finalize(&state, "K7QX", CREATOR).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn decisions_for_non_current_players_are_rejected() {
        let store = MemoryRoomStore::new();
        let the_room = room("K7QX", false);
        store
            .insert_player_missions(vec![mission_row(&the_room, 0, 3), mission_row(&the_room, 1, 3)])
            .await
            .unwrap();
        store.seed_room(the_room.clone());
        let state = install(&store).await;

        start_validation(&state, "K7QX", CREATOR).await.unwrap();

        let err = decide(&state, "K7QX", the_room.players[1].id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        // Re-sending the decision for the current player is idempotent.
        decide(&state, "K7QX", the_room.players[0].id, true).await.unwrap();
        decide(&state, "K7QX", the_room.players[0].id, false).await.unwrap();
        let rows = store.player_missions("K7QX").await.unwrap();
        let row = rows
            .iter()
            .find(|row| row.player_id == the_room.players[0].id)
            .unwrap();
        assert!(row.decided);
        assert!(!row.validated);
        assert_eq!(row.points_earned, 0);
    }

    #[tokio::test]
    async fn advancing_past_an_undecided_player_is_rejected() {
        let store = MemoryRoomStore::new();
        let the_room = room("K7QX", false);
        store
            .insert_player_missions(vec![mission_row(&the_room, 0, 3)])
            .await
            .unwrap();
        store.seed_room(the_room);
        let state = install(&store).await;

        start_validation(&state, "K7QX", CREATOR).await.unwrap();

        let err = advance_validation(
            &state,
            "K7QX",
            CREATOR,
            &AdvanceValidationRequest::Player { index: 1 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        let unchanged = store.find_room("K7QX").await.unwrap().unwrap();
        assert_eq!(unchanged.validation_status.as_deref(), Some("in_progress:0"));
    }

    #[tokio::test]
    async fn events_and_bonus_steps_gate_finalization() {
        let store = MemoryRoomStore::new();
        let the_room = room("K7QX", true);
        store
            .insert_player_missions(vec![
                mission_row(&the_room, 0, 3),
                mission_row(&the_room, 1, 3),
                mission_row(&the_room, 2, 3),
            ])
            .await
            .unwrap();
        store
            .insert_room_events(vec![appeared_event(&the_room, 7)])
            .await
            .unwrap();
        let event_id = store.room_events("K7QX").await.unwrap()[0].id;
        store.seed_room(the_room.clone());
        let state = install(&store).await;

        start_validation(&state, "K7QX", CREATOR).await.unwrap();
        for index in 0..3 {
            decide(&state, "K7QX", the_room.players[index].id, true)
                .await
                .unwrap();
            let target = if index < 2 {
                AdvanceValidationRequest::Player { index: index + 1 }
            } else {
                AdvanceValidationRequest::EventsValidation
            };
            advance_validation(&state, "K7QX", CREATOR, &target).await.unwrap();
        }

        // Finalize is rejected until the event is decided and a winner picked.
        assert!(finalize(&state, "K7QX", CREATOR).await.is_err());

        decide_event(
            &state,
            "K7QX",
            CREATOR,
            event_id,
            DecideEventRequest {
                winner: EventWinner::Blue,
            },
        )
        .await
        .unwrap();

        // An event accepts exactly one decision.
        let err = decide_event(
            &state,
            "K7QX",
            CREATOR,
            event_id,
            DecideEventRequest {
                winner: EventWinner::Red,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        advance_validation(
            &state,
            "K7QX",
            CREATOR,
            &AdvanceValidationRequest::BonusSelection,
        )
        .await
        .unwrap();

        assert!(finalize(&state, "K7QX", CREATOR).await.is_err());

        select_bonus_winner(
            &state,
            "K7QX",
            CREATOR,
            SelectBonusRequest {
                team: TeamSide::Red,
            },
        )
        .await
        .unwrap();

        let result = finalize(&state, "K7QX", CREATOR).await.unwrap();

        // Red: Ana 3 + Cleo 3 + bonus; Blue: Bob 3 + event 7.
        let bonus_range = AppConfig::default().bonus_range();
        assert_eq!(result.blue_score, 10);
        assert!(result.red_score >= 6 + bonus_range.start());
        assert!(result.red_score <= 6 + bonus_range.end());
        assert!(bonus_range.contains(&result.bonus_points));
        assert_eq!(result.winner_team, Some(TeamSide::Red));
    }

    #[tokio::test]
    async fn spectator_tokens_cannot_drive_validation() {
        let store = MemoryRoomStore::new();
        store.seed_room(room("K7QX", false));
        let state = install(&store).await;

        let err = start_validation(&state, "K7QX", "tok-Ana").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
