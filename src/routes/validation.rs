use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::validation::{
        AdvanceValidationRequest, DecideEventRequest, FinalizeResponse, RecordDecisionRequest,
        SelectBonusRequest, ValidationStatusResponse,
    },
    error::AppError,
    routes::creator_token,
    services::validation_service,
    state::SharedState,
};

/// Routes driving the creator-side validation workflow.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{code}/validation/start", post(start_validation))
        .route("/rooms/{code}/validation/decision", post(record_decision))
        .route("/rooms/{code}/validation/advance", post(advance_validation))
        .route(
            "/rooms/{code}/validation/events/{event_id}",
            post(decide_event),
        )
        .route("/rooms/{code}/validation/bonus", post(select_bonus_winner))
        .route("/rooms/{code}/validation/finalize", post(finalize))
}

/// Begin validation at the first player.
#[utoipa::path(
    post,
    path = "/rooms/{code}/validation/start",
    tag = "validation",
    params(
        ("code" = String, Path, description = "Room code"),
        ("x-creator-token" = String, Header, description = "Creator session token")
    ),
    responses(
        (status = 200, description = "Validation started", body = ValidationStatusResponse),
        (status = 409, description = "Validation already started"),
    )
)]
pub async fn start_validation(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ValidationStatusResponse>, AppError> {
    let token = creator_token(&headers)?;
    let response = validation_service::start_validation(&state, &code, &token).await?;
    Ok(Json(response))
}

/// Record (or idempotently re-record) one mission decision.
#[utoipa::path(
    post,
    path = "/rooms/{code}/validation/decision",
    tag = "validation",
    params(
        ("code" = String, Path, description = "Room code"),
        ("x-creator-token" = String, Header, description = "Creator session token")
    ),
    request_body = RecordDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = ValidationStatusResponse),
        (status = 409, description = "Player is not the current step"),
    )
)]
pub async fn record_decision(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<RecordDecisionRequest>,
) -> Result<Json<ValidationStatusResponse>, AppError> {
    let token = creator_token(&headers)?;
    let response = validation_service::record_decision(&state, &code, &token, payload).await?;
    Ok(Json(response))
}

/// Advance to the next validation step.
#[utoipa::path(
    post,
    path = "/rooms/{code}/validation/advance",
    tag = "validation",
    params(
        ("code" = String, Path, description = "Room code"),
        ("x-creator-token" = String, Header, description = "Creator session token")
    ),
    request_body = AdvanceValidationRequest,
    responses(
        (status = 200, description = "Machine advanced", body = ValidationStatusResponse),
        (status = 409, description = "Requested step is not the allowed successor"),
    )
)]
pub async fn advance_validation(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<AdvanceValidationRequest>,
) -> Result<Json<ValidationStatusResponse>, AppError> {
    let token = creator_token(&headers)?;
    let response = validation_service::advance_validation(&state, &code, &token, &payload).await?;
    Ok(Json(response))
}

/// Decide one appeared event (red, blue, or nobody).
#[utoipa::path(
    post,
    path = "/rooms/{code}/validation/events/{event_id}",
    tag = "validation",
    params(
        ("code" = String, Path, description = "Room code"),
        ("event_id" = Uuid, Path, description = "Event occurrence identifier"),
        ("x-creator-token" = String, Header, description = "Creator session token")
    ),
    request_body = DecideEventRequest,
    responses(
        (status = 200, description = "Event decided", body = ValidationStatusResponse),
        (status = 409, description = "Event already decided or never appeared"),
    )
)]
pub async fn decide_event(
    State(state): State<SharedState>,
    Path((code, event_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(payload): Json<DecideEventRequest>,
) -> Result<Json<ValidationStatusResponse>, AppError> {
    let token = creator_token(&headers)?;
    let response =
        validation_service::decide_event(&state, &code, &token, event_id, payload).await?;
    Ok(Json(response))
}

/// Select the victory-bonus winner.
#[utoipa::path(
    post,
    path = "/rooms/{code}/validation/bonus",
    tag = "validation",
    params(
        ("code" = String, Path, description = "Room code"),
        ("x-creator-token" = String, Header, description = "Creator session token")
    ),
    request_body = SelectBonusRequest,
    responses(
        (status = 200, description = "Winner selected", body = ValidationStatusResponse),
        (status = 409, description = "Not in bonus selection"),
    )
)]
pub async fn select_bonus_winner(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SelectBonusRequest>,
) -> Result<Json<ValidationStatusResponse>, AppError> {
    let token = creator_token(&headers)?;
    let response =
        validation_service::select_bonus_winner(&state, &code, &token, payload).await?;
    Ok(Json(response))
}

/// Finalize the room: write the history snapshot and stop the game.
#[utoipa::path(
    post,
    path = "/rooms/{code}/validation/finalize",
    tag = "validation",
    params(
        ("code" = String, Path, description = "Room code"),
        ("x-creator-token" = String, Header, description = "Creator session token")
    ),
    responses(
        (status = 200, description = "Room finalized", body = FinalizeResponse),
        (status = 409, description = "Required steps are not satisfied"),
    )
)]
pub async fn finalize(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FinalizeResponse>, AppError> {
    let token = creator_token(&headers)?;
    let response = validation_service::finalize(&state, &code, &token).await?;
    Ok(Json(response))
}
