use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use crate::{
    dto::phase::{PhaseAttemptResponse, PhaseParam},
    error::AppError,
    services::phase_service,
    state::SharedState,
};

/// Routes handling opportunistic phase-transition attempts.
pub fn router() -> Router<SharedState> {
    Router::new().route("/rooms/{code}/phases/{phase}/attempt", post(attempt_phase))
}

/// Attempt a timed phase transition.
///
/// Called redundantly by every connected client's local timer; `not_yet` and
/// `already_done` are normal outcomes, not errors.
#[utoipa::path(
    post,
    path = "/rooms/{code}/phases/{phase}/attempt",
    tag = "phase",
    params(
        ("code" = String, Path, description = "Room code"),
        ("phase" = PhaseParam, Path, description = "Phase to attempt (mid, late, or event)")
    ),
    responses(
        (status = 200, description = "Attempt outcome", body = PhaseAttemptResponse),
        (status = 409, description = "Content pool too small for the roster"),
    )
)]
pub async fn attempt_phase(
    State(state): State<SharedState>,
    Path((code, phase)): Path<(String, PhaseParam)>,
) -> Result<Json<PhaseAttemptResponse>, AppError> {
    let response = phase_service::attempt_phase(&state, &code, phase).await?;
    Ok(Json(response))
}
