//! Single-round rock-paper-scissors.
//!
//! The game starts with no payload; each player answers with one [`Hand`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::GameVariant;

/// A thrown hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    /// Returns `true` if `self` wins against `other`.
    pub fn beats(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Rock, Self::Scissors) | (Self::Scissors, Self::Paper) | (Self::Paper, Self::Rock)
        )
    }

    /// The wire form of this hand, suitable for
    /// [`ParlorClient::submit_game_input`](crate::client::ParlorClient::submit_game_input).
    pub fn to_input(self) -> Value {
        Value::String(self.as_str().to_string())
    }

    /// Wire name of the hand.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rock => "Rock",
            Self::Paper => "Paper",
            Self::Scissors => "Scissors",
        }
    }
}

/// The rock-paper-scissors variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct RockPaperScissors;

impl RockPaperScissors {
    /// Wire tag.
    pub const TAG: &'static str = "RockPaperScissors";
}

impl GameVariant for RockPaperScissors {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn check_start(&self, payload: &Value) -> Result<(), String> {
        if payload.is_null() {
            Ok(())
        } else {
            Err(format!("expected no start payload, got {payload}"))
        }
    }

    fn check_input(&self, _start: &Value, input: &Value) -> Result<(), String> {
        Hand::deserialize(input)
            .map(|_| ())
            .map_err(|_| format!("expected Rock, Paper or Scissors, got {input}"))
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
    use serde_json::json;

    #[test]
    fn each_hand_beats_exactly_one_other() {
        let hands = [Hand::Rock, Hand::Paper, Hand::Scissors];
        for hand in hands {
            let wins = hands.iter().filter(|other| hand.beats(**other)).count();
            assert_eq!(wins, 1, "{hand:?}");
            assert!(!hand.beats(hand));
        }
        assert!(Hand::Paper.beats(Hand::Rock));
    }

    #[test]
    fn start_payload_must_be_empty() {
        assert!(RockPaperScissors.check_start(&Value::Null).is_ok());
        assert!(RockPaperScissors.check_start(&json!([1])).is_err());
    }

    #[test]
    fn input_must_be_a_hand() {
        let game = RockPaperScissors;
        assert!(game.check_input(&Value::Null, &json!("Rock")).is_ok());
        assert!(game.check_input(&Value::Null, &Hand::Scissors.to_input()).is_ok());
        assert!(game.check_input(&Value::Null, &json!("Lizard")).is_err());
        assert!(game.check_input(&Value::Null, &json!(3)).is_err());
    }
}
