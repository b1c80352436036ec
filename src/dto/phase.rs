use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Timed phase addressed by an attempt call.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseParam {
    /// Mid-game mission unlock.
    Mid,
    /// Late-game mission unlock.
    Late,
    /// Event appearance.
    Event,
}

/// Outcome of one phase attempt.
///
/// `not_yet` and `already_done` are silent to the UI; both share this
/// response shape with `assigned` so redundant callers need no error paths.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseAttemptStatus {
    /// The phase threshold has not been reached.
    NotYet,
    /// The transition already happened (possibly won by a concurrent caller).
    AlreadyDone,
    /// This call performed the transition.
    Assigned,
}

/// Response returned by the phase attempt endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseAttemptResponse {
    /// What the attempt observed.
    pub status: PhaseAttemptStatus,
    /// Effective elapsed play time, in seconds.
    pub elapsed_secs: u64,
    /// Threshold the phase requires, in seconds.
    pub required_secs: u64,
}
