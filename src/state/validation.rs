//! Server-authoritative validation state machine.
//!
//! The state is a single tagged value persisted on the room row as an
//! encoded string; clients only ever render it and request the next
//! transition. Every transition is validated here against store-confirmed
//! facts and applied through one compare-and-swap on the encoded value, so
//! observers can never see the sequence go backwards or skip a step.

use thiserror::Error;

/// Position of the creator-driven validation process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    /// Validation has not started; the room row carries no status.
    Idle,
    /// The creator is deciding the missions of the player at `index`.
    InProgress {
        /// Index into the room's ordered roster.
        index: usize,
    },
    /// Appeared events are being decided.
    EventsValidation,
    /// The winning team is being selected for the victory bonus.
    BonusSelection,
    /// Terminal state written by finalization.
    Finalized,
}

/// Requested advance step, as sent by the creator's client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceTarget {
    /// Step to the player at this roster index.
    Player {
        /// Requested roster index.
        index: usize,
    },
    /// Step to the events-validation stage.
    EventsValidation,
    /// Step to the bonus-selection stage.
    BonusSelection,
}

/// Store-confirmed facts the machine validates transitions against.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationContext {
    /// Number of players in the room's ordered roster.
    pub player_count: usize,
    /// Whether every mission of the current player carries a decision.
    pub current_player_decided: bool,
    /// Whether at least one room event has surfaced.
    pub any_event_appeared: bool,
    /// Whether every appeared event carries a decision (vacuously true).
    pub all_events_decided: bool,
    /// Whether the room awards a victory bonus.
    pub bonus_enabled: bool,
    /// Whether a winning team has been selected.
    pub winner_selected: bool,
}

/// Error returned when a requested transition is not the allowed successor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid validation transition from {from:?}: {detail}")]
pub struct InvalidTransition {
    /// State the machine was in.
    pub from: ValidationState,
    /// Why the request was rejected.
    pub detail: String,
}

impl InvalidTransition {
    pub(crate) fn new(from: ValidationState, detail: impl Into<String>) -> Self {
        Self {
            from,
            detail: detail.into(),
        }
    }
}

const STATUS_EVENTS: &str = "events_validation";
const STATUS_BONUS: &str = "bonus_selection";
const STATUS_FINALIZED: &str = "finalized";
const STATUS_IN_PROGRESS_PREFIX: &str = "in_progress:";

impl ValidationState {
    /// Decode the status string persisted on the room row.
    pub fn parse(status: Option<&str>) -> Result<Self, InvalidTransition> {
        match status {
            None => Ok(ValidationState::Idle),
            Some(STATUS_EVENTS) => Ok(ValidationState::EventsValidation),
            Some(STATUS_BONUS) => Ok(ValidationState::BonusSelection),
            Some(STATUS_FINALIZED) => Ok(ValidationState::Finalized),
            Some(value) => value
                .strip_prefix(STATUS_IN_PROGRESS_PREFIX)
                .and_then(|index| index.parse::<usize>().ok())
                .map(|index| ValidationState::InProgress { index })
                .ok_or_else(|| {
                    InvalidTransition::new(
                        ValidationState::Idle,
                        format!("unrecognized status `{value}`"),
                    )
                }),
        }
    }

    /// Encode to the status string persisted on the room row.
    pub fn encode(&self) -> Option<String> {
        match self {
            ValidationState::Idle => None,
            ValidationState::InProgress { index } => {
                Some(format!("{STATUS_IN_PROGRESS_PREFIX}{index}"))
            }
            ValidationState::EventsValidation => Some(STATUS_EVENTS.to_string()),
            ValidationState::BonusSelection => Some(STATUS_BONUS.to_string()),
            ValidationState::Finalized => Some(STATUS_FINALIZED.to_string()),
        }
    }

    /// Roster index under decision, when stepping through players.
    pub fn current_player(&self) -> Option<usize> {
        match self {
            ValidationState::InProgress { index } => Some(*index),
            _ => None,
        }
    }

    /// Begin validation. Only legal from idle with a non-empty roster.
    pub fn start(&self, ctx: ValidationContext) -> Result<ValidationState, InvalidTransition> {
        match self {
            ValidationState::Idle if ctx.player_count > 0 => {
                Ok(ValidationState::InProgress { index: 0 })
            }
            ValidationState::Idle => Err(InvalidTransition::new(
                *self,
                "cannot validate an empty roster",
            )),
            _ => Err(InvalidTransition::new(*self, "validation already started")),
        }
    }

    /// The single allowed successor, given the confirmed facts.
    fn successor(&self, ctx: ValidationContext) -> Result<ValidationState, InvalidTransition> {
        match self {
            ValidationState::InProgress { index } => {
                if !ctx.current_player_decided {
                    return Err(InvalidTransition::new(
                        *self,
                        format!("player {index} still has undecided missions"),
                    ));
                }
                if index + 1 < ctx.player_count {
                    Ok(ValidationState::InProgress { index: index + 1 })
                } else if ctx.any_event_appeared {
                    Ok(ValidationState::EventsValidation)
                } else if ctx.bonus_enabled {
                    Ok(ValidationState::BonusSelection)
                } else {
                    Err(InvalidTransition::new(
                        *self,
                        "all steps satisfied; finalize instead",
                    ))
                }
            }
            ValidationState::EventsValidation => {
                if !ctx.all_events_decided {
                    return Err(InvalidTransition::new(
                        *self,
                        "appeared events still lack a decision",
                    ));
                }
                if ctx.bonus_enabled {
                    Ok(ValidationState::BonusSelection)
                } else {
                    Err(InvalidTransition::new(
                        *self,
                        "all steps satisfied; finalize instead",
                    ))
                }
            }
            ValidationState::Idle => Err(InvalidTransition::new(*self, "validation not started")),
            ValidationState::BonusSelection => Err(InvalidTransition::new(
                *self,
                "nothing follows bonus selection; finalize instead",
            )),
            ValidationState::Finalized => {
                Err(InvalidTransition::new(*self, "room already finalized"))
            }
        }
    }

    /// Validate a requested advance against the allowed successor.
    pub fn advance(
        &self,
        target: AdvanceTarget,
        ctx: ValidationContext,
    ) -> Result<ValidationState, InvalidTransition> {
        let next = self.successor(ctx)?;
        let matches = match (target, next) {
            (AdvanceTarget::Player { index }, ValidationState::InProgress { index: expected }) => {
                index == expected
            }
            (AdvanceTarget::EventsValidation, ValidationState::EventsValidation) => true,
            (AdvanceTarget::BonusSelection, ValidationState::BonusSelection) => true,
            _ => false,
        };

        if matches {
            Ok(next)
        } else {
            Err(InvalidTransition::new(
                *self,
                format!("requested {target:?} but the next step is {next:?}"),
            ))
        }
    }

    /// Check that every required step is satisfied so the room can be
    /// finalized from this state.
    pub fn ensure_finalizable(&self, ctx: ValidationContext) -> Result<(), InvalidTransition> {
        match self {
            ValidationState::InProgress { index } => {
                if index + 1 < ctx.player_count || !ctx.current_player_decided {
                    return Err(InvalidTransition::new(
                        *self,
                        "players still await decisions",
                    ));
                }
                if ctx.any_event_appeared {
                    return Err(InvalidTransition::new(
                        *self,
                        "appeared events must be validated first",
                    ));
                }
                if ctx.bonus_enabled {
                    return Err(InvalidTransition::new(
                        *self,
                        "a bonus winner must be selected first",
                    ));
                }
                Ok(())
            }
            ValidationState::EventsValidation => {
                if !ctx.all_events_decided {
                    return Err(InvalidTransition::new(
                        *self,
                        "appeared events still lack a decision",
                    ));
                }
                if ctx.bonus_enabled {
                    return Err(InvalidTransition::new(
                        *self,
                        "a bonus winner must be selected first",
                    ));
                }
                Ok(())
            }
            ValidationState::BonusSelection => {
                if !ctx.all_events_decided {
                    return Err(InvalidTransition::new(
                        *self,
                        "appeared events still lack a decision",
                    ));
                }
                if !ctx.winner_selected {
                    return Err(InvalidTransition::new(*self, "no winning team selected"));
                }
                Ok(())
            }
            ValidationState::Idle => Err(InvalidTransition::new(*self, "validation not started")),
            ValidationState::Finalized => {
                Err(InvalidTransition::new(*self, "room already finalized"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ValidationContext {
        ValidationContext {
            player_count: 3,
            current_player_decided: true,
            any_event_appeared: false,
            all_events_decided: true,
            bonus_enabled: false,
            winner_selected: false,
        }
    }

    #[test]
    fn status_round_trips() {
        for state in [
            ValidationState::Idle,
            ValidationState::InProgress { index: 0 },
            ValidationState::InProgress { index: 7 },
            ValidationState::EventsValidation,
            ValidationState::BonusSelection,
            ValidationState::Finalized,
        ] {
            let encoded = state.encode();
            assert_eq!(ValidationState::parse(encoded.as_deref()).unwrap(), state);
        }
    }

    #[test]
    fn malformed_status_is_rejected() {
        assert!(ValidationState::parse(Some("in_progress:")).is_err());
        assert!(ValidationState::parse(Some("in_progress:x")).is_err());
        assert!(ValidationState::parse(Some("done")).is_err());
    }

    #[test]
    fn start_requires_idle_and_players() {
        assert_eq!(
            ValidationState::Idle.start(ctx()).unwrap(),
            ValidationState::InProgress { index: 0 }
        );

        let empty = ValidationContext {
            player_count: 0,
            ..ctx()
        };
        assert!(ValidationState::Idle.start(empty).is_err());
        assert!(ValidationState::EventsValidation.start(ctx()).is_err());
    }

    #[test]
    fn players_step_in_order() {
        let state = ValidationState::InProgress { index: 0 };
        let next = state.advance(AdvanceTarget::Player { index: 1 }, ctx()).unwrap();
        assert_eq!(next, ValidationState::InProgress { index: 1 });

        // Skipping ahead is rejected and leaves the machine untouched.
        let err = state
            .advance(AdvanceTarget::Player { index: 2 }, ctx())
            .unwrap_err();
        assert_eq!(err.from, state);
    }

    #[test]
    fn undecided_player_blocks_the_step() {
        let pending = ValidationContext {
            current_player_decided: false,
            ..ctx()
        };
        let err = ValidationState::InProgress { index: 0 }
            .advance(AdvanceTarget::Player { index: 1 }, pending)
            .unwrap_err();
        assert!(err.detail.contains("undecided"));
    }

    #[test]
    fn last_player_leads_to_events_then_bonus() {
        let facts = ValidationContext {
            any_event_appeared: true,
            all_events_decided: false,
            bonus_enabled: true,
            ..ctx()
        };
        let last = ValidationState::InProgress { index: 2 };
        assert_eq!(
            last.advance(AdvanceTarget::EventsValidation, facts).unwrap(),
            ValidationState::EventsValidation
        );

        // Events must all be decided before moving on to bonus selection.
        assert!(
            ValidationState::EventsValidation
                .advance(AdvanceTarget::BonusSelection, facts)
                .is_err()
        );

        let decided = ValidationContext {
            all_events_decided: true,
            ..facts
        };
        assert_eq!(
            ValidationState::EventsValidation
                .advance(AdvanceTarget::BonusSelection, decided)
                .unwrap(),
            ValidationState::BonusSelection
        );
    }

    #[test]
    fn last_player_skips_missing_stages() {
        let last = ValidationState::InProgress { index: 2 };

        // No events, no bonus: the only move left is finalization.
        let err = last
            .advance(AdvanceTarget::Player { index: 3 }, ctx())
            .unwrap_err();
        assert!(err.detail.contains("finalize"));

        let bonus_only = ValidationContext {
            bonus_enabled: true,
            ..ctx()
        };
        assert_eq!(
            last.advance(AdvanceTarget::BonusSelection, bonus_only).unwrap(),
            ValidationState::BonusSelection
        );
    }

    #[test]
    fn finalize_preconditions_per_state() {
        let last = ValidationState::InProgress { index: 2 };
        assert!(last.ensure_finalizable(ctx()).is_ok());

        let with_events = ValidationContext {
            any_event_appeared: true,
            ..ctx()
        };
        assert!(last.ensure_finalizable(with_events).is_err());

        let mid = ValidationState::InProgress { index: 1 };
        assert!(mid.ensure_finalizable(ctx()).is_err());

        let bonus = ValidationState::BonusSelection;
        assert!(bonus.ensure_finalizable(ctx()).is_err());
        let picked = ValidationContext {
            winner_selected: true,
            ..ctx()
        };
        assert!(bonus.ensure_finalizable(picked).is_ok());

        assert!(ValidationState::Finalized.ensure_finalizable(ctx()).is_err());
        assert!(ValidationState::Idle.ensure_finalizable(ctx()).is_err());
    }
}
