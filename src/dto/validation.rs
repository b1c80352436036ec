//! Validation workflow payloads and shared validators.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::ValidationError;

use crate::dao::models::{MissionKind, TeamSide};
use crate::state::AdvanceTarget;

const ROOM_CODE_MIN: usize = 4;
const ROOM_CODE_MAX: usize = 8;

/// Validates that a room code is 4 to 8 uppercase alphanumeric characters.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("K7QX")     // Ok
/// validate_room_code("k7qx")     // Err - lowercase
/// validate_room_code("K7")       // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.len() < ROOM_CODE_MIN || code.len() > ROOM_CODE_MAX {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be {ROOM_CODE_MIN} to {ROOM_CODE_MAX} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Request recording (or re-recording) the decision for one mission of the
/// current player.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordDecisionRequest {
    /// Player holding the mission.
    pub player_id: Uuid,
    /// Phase of the mission being decided.
    pub kind: MissionKind,
    /// Whether the mission was accomplished.
    pub validated: bool,
}

/// Requested advance step.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum AdvanceValidationRequest {
    /// Step to the player at the given roster index.
    Player {
        /// Requested roster index.
        index: usize,
    },
    /// Step to the events-validation stage.
    EventsValidation,
    /// Step to the bonus-selection stage.
    BonusSelection,
}

impl From<&AdvanceValidationRequest> for AdvanceTarget {
    fn from(value: &AdvanceValidationRequest) -> Self {
        match value {
            AdvanceValidationRequest::Player { index } => AdvanceTarget::Player { index: *index },
            AdvanceValidationRequest::EventsValidation => AdvanceTarget::EventsValidation,
            AdvanceValidationRequest::BonusSelection => AdvanceTarget::BonusSelection,
        }
    }
}

/// Ternary winner of an event decision.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventWinner {
    /// Red team takes the points.
    Red,
    /// Blue team takes the points.
    Blue,
    /// Nobody takes the points.
    None,
}

impl EventWinner {
    /// Team credited by this decision, if any.
    pub fn team(self) -> Option<TeamSide> {
        match self {
            EventWinner::Red => Some(TeamSide::Red),
            EventWinner::Blue => Some(TeamSide::Blue),
            EventWinner::None => None,
        }
    }
}

/// Request deciding an appeared event.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DecideEventRequest {
    /// Which team, if any, takes the event points.
    pub winner: EventWinner,
}

/// Request selecting the victory-bonus winner.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectBonusRequest {
    /// Winning team; must be one of the two playable sides.
    pub team: TeamSide,
}

/// Current validation position, returned by every validation endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationStatusResponse {
    /// Encoded status, as persisted on the room row.
    pub status: Option<String>,
    /// Roster index under decision, when stepping through players.
    pub current_player: Option<usize>,
}

/// Final scores returned by the finalize endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct FinalizeResponse {
    /// Final red team score.
    pub red_score: i32,
    /// Final blue team score.
    pub blue_score: i32,
    /// Winning team, if one was selected.
    pub winner_team: Option<TeamSide>,
    /// Victory bonus credited to the winner.
    pub bonus_points: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_code_valid() {
        assert!(validate_room_code("K7QX").is_ok());
        assert!(validate_room_code("ABCD1234").is_ok());
        assert!(validate_room_code("42AB").is_ok());
    }

    #[test]
    fn test_validate_room_code_invalid_length() {
        assert!(validate_room_code("ABC").is_err()); // too short
        assert!(validate_room_code("ABCD12345").is_err()); // too long
        assert!(validate_room_code("").is_err()); // empty
    }

    #[test]
    fn test_validate_room_code_invalid_format() {
        assert!(validate_room_code("k7qx").is_err()); // lowercase
        assert!(validate_room_code("K7Q-").is_err()); // punctuation
        assert!(validate_room_code("K7 X").is_err()); // space
    }

    #[test]
    fn advance_request_maps_to_target() {
        let request: AdvanceValidationRequest =
            serde_json::from_str(r#"{"target": "player", "index": 2}"#).unwrap();
        assert_eq!(
            AdvanceTarget::from(&request),
            AdvanceTarget::Player { index: 2 }
        );

        let request: AdvanceValidationRequest =
            serde_json::from_str(r#"{"target": "events_validation"}"#).unwrap();
        assert_eq!(AdvanceTarget::from(&request), AdvanceTarget::EventsValidation);
    }
}
