use axum::{Router, http::HeaderMap};

use crate::{error::AppError, state::SharedState};

/// Swagger UI and OpenAPI document routes.
pub mod docs;
/// Health check routes.
pub mod health;
/// Phase attempt routes.
pub mod phase;
/// Room read model and clock control routes.
pub mod room;
/// Per-room SSE stream routes.
pub mod sse;
/// Validation workflow routes.
pub mod validation;

/// Header carrying the opaque session token of the calling browser.
pub const CREATOR_TOKEN_HEADER: &str = "x-creator-token";

/// Extract the creator credential or reject the request.
pub(crate) fn creator_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(CREATOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            AppError::Unauthorized(format!("missing `{CREATOR_TOKEN_HEADER}` header"))
        })
}

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(room::router())
        .merge(phase::router())
        .merge(validation::router())
        .merge(sse::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
