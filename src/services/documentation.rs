use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Party Missions Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::room::get_room,
        crate::routes::room::get_history,
        crate::routes::room::resume_after_event,
        crate::routes::phase::attempt_phase,
        crate::routes::validation::start_validation,
        crate::routes::validation::record_decision,
        crate::routes::validation::advance_validation,
        crate::routes::validation::decide_event,
        crate::routes::validation::select_bonus_winner,
        crate::routes::validation::finalize,
        crate::routes::sse::room_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::phase::PhaseParam,
            crate::dto::phase::PhaseAttemptStatus,
            crate::dto::phase::PhaseAttemptResponse,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::HistorySnapshot,
            crate::dto::validation::RecordDecisionRequest,
            crate::dto::validation::AdvanceValidationRequest,
            crate::dto::validation::DecideEventRequest,
            crate::dto::validation::SelectBonusRequest,
            crate::dto::validation::ValidationStatusResponse,
            crate::dto::validation::FinalizeResponse,
            crate::dao::models::TeamSide,
            crate::dao::models::MissionKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "room", description = "Room read model and clock control"),
        (name = "phase", description = "Timed phase transitions"),
        (name = "validation", description = "Creator-driven validation workflow"),
        (name = "sse", description = "Per-room server-sent event streams"),
    )
)]
pub struct ApiDoc;
