//! Game subsession state machine.
//!
//! At most one game runs at a time. The machine moves `Idle → Active → Idle`
//! on the server's `GameStarted` / `GameEnded` events; local input never
//! changes the phase, since the server decides when a game is over.
//!
//! After a game ends a short suppression window opens. A `GameStarted` that
//! arrives inside it is applied immediately but its view notification is
//! scheduled one window later, so the next game's "begin" cannot overtake
//! the previous game's "end" in the view.
//!
//! Every method is a checked transition: a call that does not fit the
//! current phase returns a [`GameError`] and leaves the state untouched.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::GameError;
use crate::games::GameRegistry;
use crate::protocol::{GameOutcome, OutboundCommand, Scoreboard, VariantPayload};

/// Phase of the game subsession.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// No game is running.
    Idle,
    /// A game is running and accepts input.
    Active,
}

/// The game currently running.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveGame {
    /// Variant tag.
    pub variant: String,
    /// Start payload, e.g. the offsets to memorize.
    pub payload: Value,
}

/// An accepted game start and when the view should hear about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStart {
    pub variant: String,
    pub payload: Value,
    /// Earliest instant at which `on_game_begins` may be delivered.
    pub deliver_at: Instant,
}

/// Owner of the at-most-one [`ActiveGame`].
#[derive(Debug)]
pub struct GameSubsession {
    registry: GameRegistry,
    window: Duration,
    active: Option<ActiveGame>,
    suppress_until: Option<Instant>,
}

impl GameSubsession {
    /// Create an idle subsession over `registry` with the given suppression window.
    pub fn new(registry: GameRegistry, window: Duration) -> Self {
        Self {
            registry,
            window,
            active: None,
            suppress_until: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        if self.active.is_some() {
            GamePhase::Active
        } else {
            GamePhase::Idle
        }
    }

    /// The running game, if any.
    pub fn active(&self) -> Option<&ActiveGame> {
        self.active.as_ref()
    }

    /// The registry variants are looked up in.
    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    /// Apply a `GameStarted` event.
    ///
    /// # Errors
    ///
    /// [`GameError::AlreadyActive`] if a game is running,
    /// [`GameError::UnknownVariant`] for an unregistered tag and
    /// [`GameError::InvalidPayload`] if the payload does not fit the variant.
    pub fn on_game_started(
        &mut self,
        start: VariantPayload,
        now: Instant,
    ) -> Result<ScheduledStart, GameError> {
        if let Some(active) = &self.active {
            return Err(GameError::AlreadyActive {
                active: active.variant.clone(),
                requested: start.variant,
            });
        }

        let variant = self
            .registry
            .get(&start.variant)
            .ok_or_else(|| GameError::UnknownVariant(start.variant.clone()))?;
        variant
            .check_start(&start.payload)
            .map_err(|reason| GameError::InvalidPayload {
                variant: start.variant.clone(),
                reason,
            })?;

        let deliver_at = match self.suppress_until {
            Some(until) if now < until => now + self.window,
            _ => now,
        };

        self.active = Some(ActiveGame {
            variant: start.variant.clone(),
            payload: start.payload.clone(),
        });

        Ok(ScheduledStart {
            variant: start.variant,
            payload: start.payload,
            deliver_at,
        })
    }

    /// Validate a local player input and build the command that carries it.
    ///
    /// Does not change the phase.
    ///
    /// # Errors
    ///
    /// [`GameError::NotActive`] if no game is running,
    /// [`GameError::VariantMismatch`] if `variant` is not the running game and
    /// [`GameError::InvalidPayload`] if the input does not fit the variant.
    pub fn submit_input(&self, variant: &str, input: Value) -> Result<OutboundCommand, GameError> {
        let active = self.active.as_ref().ok_or(GameError::NotActive)?;
        if active.variant != variant {
            return Err(GameError::VariantMismatch {
                active: active.variant.clone(),
                got: variant.to_string(),
            });
        }

        let game = self
            .registry
            .get(variant)
            .ok_or_else(|| GameError::UnknownVariant(variant.to_string()))?;
        game.check_input(&active.payload, &input)
            .map_err(|reason| GameError::InvalidPayload {
                variant: variant.to_string(),
                reason,
            })?;

        Ok(OutboundCommand::SendGameInput(VariantPayload::new(
            variant, input,
        )))
    }

    /// Apply a `GameEnded` event and open the suppression window.
    ///
    /// # Errors
    ///
    /// [`GameError::NotActive`] if no game is running,
    /// [`GameError::UnknownVariant`] for an unregistered tag,
    /// [`GameError::VariantMismatch`] if another game is running and
    /// [`GameError::InvalidPayload`] for a scoreboard the variant rejects.
    pub fn on_game_ended(
        &mut self,
        outcome: GameOutcome,
        now: Instant,
    ) -> Result<GameOutcome, GameError> {
        let active = self.active.as_ref().ok_or(GameError::NotActive)?;
        let game = self
            .registry
            .get(&outcome.variant)
            .ok_or_else(|| GameError::UnknownVariant(outcome.variant.clone()))?;
        if active.variant != outcome.variant {
            return Err(GameError::VariantMismatch {
                active: active.variant.clone(),
                got: outcome.variant,
            });
        }
        game.check_scoreboard(&outcome.scoreboard)
            .map_err(|reason| GameError::InvalidPayload {
                variant: outcome.variant.clone(),
                reason,
            })?;

        self.active = None;
        self.suppress_until = Some(now + self.window);
        Ok(outcome)
    }

    /// Drop the running game without a server verdict (the connection was
    /// lost, so the server-side room is gone).
    ///
    /// Returns an empty-scoreboard outcome for the view, or `None` when idle.
    pub fn abandon(&mut self, now: Instant) -> Option<GameOutcome> {
        let active = self.active.take()?;
        self.suppress_until = Some(now + self.window);
        Some(GameOutcome {
            variant: active.variant,
            scoreboard: Scoreboard::new(),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::games::{MemoryRecall, RockPaperScissors};
    use serde_json::json;

    const WINDOW: Duration = Duration::from_millis(100);

    fn subsession() -> GameSubsession {
        GameSubsession::new(GameRegistry::default(), WINDOW)
    }

    fn rps_start() -> VariantPayload {
        VariantPayload::new(RockPaperScissors::TAG, Value::Null)
    }

    fn rps_end(scoreboard: &[(&str, u64)]) -> GameOutcome {
        GameOutcome {
            variant: RockPaperScissors::TAG.into(),
            scoreboard: scoreboard
                .iter()
                .map(|(name, wins)| (name.to_string(), *wins))
                .collect(),
        }
    }

    #[test]
    fn start_from_idle_activates_immediately() {
        let mut game = subsession();
        let now = Instant::now();
        let start = game.on_game_started(rps_start(), now).unwrap();
        assert_eq!(start.deliver_at, now);
        assert_eq!(game.phase(), GamePhase::Active);
        assert_eq!(game.active().unwrap().variant, RockPaperScissors::TAG);
    }

    #[test]
    fn second_start_while_active_is_rejected() {
        let mut game = subsession();
        let now = Instant::now();
        game.on_game_started(rps_start(), now).unwrap();
        let err = game
            .on_game_started(VariantPayload::new(MemoryRecall::TAG, json!([1])), now)
            .unwrap_err();
        assert!(matches!(err, GameError::AlreadyActive { .. }));
        assert_eq!(game.active().unwrap().variant, RockPaperScissors::TAG);
    }

    #[test]
    fn unknown_or_invalid_starts_leave_idle() {
        let mut game = subsession();
        let now = Instant::now();
        assert_eq!(
            game.on_game_started(VariantPayload::new("Chess", Value::Null), now),
            Err(GameError::UnknownVariant("Chess".into()))
        );
        assert!(matches!(
            game.on_game_started(VariantPayload::new(MemoryRecall::TAG, json!("x")), now),
            Err(GameError::InvalidPayload { .. })
        ));
        assert_eq!(game.phase(), GamePhase::Idle);
    }

    #[test]
    fn input_requires_matching_active_game() {
        let mut game = subsession();
        assert_eq!(
            game.submit_input(RockPaperScissors::TAG, json!("Rock")),
            Err(GameError::NotActive)
        );

        game.on_game_started(rps_start(), Instant::now()).unwrap();
        assert!(matches!(
            game.submit_input(MemoryRecall::TAG, json!([1])),
            Err(GameError::VariantMismatch { .. })
        ));
        assert!(matches!(
            game.submit_input(RockPaperScissors::TAG, json!("Spock")),
            Err(GameError::InvalidPayload { .. })
        ));

        let cmd = game
            .submit_input(RockPaperScissors::TAG, json!("Rock"))
            .unwrap();
        assert_eq!(
            cmd,
            OutboundCommand::SendGameInput(VariantPayload::new(
                RockPaperScissors::TAG,
                json!("Rock")
            ))
        );
        assert_eq!(game.phase(), GamePhase::Active);
    }

    #[test]
    fn end_returns_to_idle() {
        let mut game = subsession();
        let now = Instant::now();
        game.on_game_started(rps_start(), now).unwrap();
        let outcome = game.on_game_ended(rps_end(&[("alice", 1)]), now).unwrap();
        assert_eq!(outcome.scoreboard.get("alice"), Some(&1));
        assert_eq!(game.phase(), GamePhase::Idle);
    }

    #[test]
    fn end_for_other_or_unknown_variant_is_rejected() {
        let mut game = subsession();
        let now = Instant::now();
        assert_eq!(
            game.on_game_ended(rps_end(&[]), now),
            Err(GameError::NotActive)
        );

        game.on_game_started(rps_start(), now).unwrap();
        let other = GameOutcome {
            variant: MemoryRecall::TAG.into(),
            scoreboard: Scoreboard::new(),
        };
        assert!(matches!(
            game.on_game_ended(other, now),
            Err(GameError::VariantMismatch { .. })
        ));
        let unknown = GameOutcome {
            variant: "Chess".into(),
            scoreboard: Scoreboard::new(),
        };
        assert_eq!(
            game.on_game_ended(unknown, now),
            Err(GameError::UnknownVariant("Chess".into()))
        );
        assert_eq!(game.phase(), GamePhase::Active);
    }

    #[test]
    fn start_inside_window_is_delayed_but_applied() {
        let mut game = subsession();
        let t0 = Instant::now();
        game.on_game_started(rps_start(), t0).unwrap();
        game.on_game_ended(rps_end(&[]), t0).unwrap();

        let t1 = t0 + Duration::from_millis(30);
        let start = game.on_game_started(rps_start(), t1).unwrap();
        assert_eq!(start.deliver_at, t1 + WINDOW);
        assert!(start.deliver_at > t0 + WINDOW);
        assert_eq!(game.phase(), GamePhase::Active);
    }

    #[test]
    fn start_after_window_is_not_delayed() {
        let mut game = subsession();
        let t0 = Instant::now();
        game.on_game_started(rps_start(), t0).unwrap();
        game.on_game_ended(rps_end(&[]), t0).unwrap();

        let t1 = t0 + WINDOW;
        assert_eq!(game.on_game_started(rps_start(), t1).unwrap().deliver_at, t1);
    }

    #[test]
    fn abandon_clears_active_game() {
        let mut game = subsession();
        let now = Instant::now();
        assert!(game.abandon(now).is_none());

        game.on_game_started(rps_start(), now).unwrap();
        let outcome = game.abandon(now).unwrap();
        assert_eq!(outcome.variant, RockPaperScissors::TAG);
        assert!(outcome.scoreboard.is_empty());
        assert_eq!(game.phase(), GamePhase::Idle);
    }
}
