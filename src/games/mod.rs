//! Game variants and their registry.
//!
//! Each minigame implements [`GameVariant`], a small fixed capability set
//! describing the shape of its start payload, its player input and its
//! scoreboard. The [`game`](crate::game) state machine only ever talks to
//! variants through a [`GameRegistry`] lookup by tag, so adding a game means
//! registering one more implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::protocol::Scoreboard;

pub mod memory_recall;
pub mod rock_paper_scissors;

pub use memory_recall::MemoryRecall;
pub use rock_paper_scissors::{Hand, RockPaperScissors};

/// Capabilities every game variant provides.
///
/// The `check_*` methods return a human-readable reason when a payload does
/// not fit the variant's shape.
pub trait GameVariant: Send + Sync + 'static {
    /// Wire tag of this variant, e.g. `"RockPaperScissors"`.
    fn tag(&self) -> &'static str;

    /// Validate the payload carried by `GameStarted`.
    fn check_start(&self, payload: &Value) -> Result<(), String>;

    /// Validate a player input against the start payload of the running game.
    fn check_input(&self, start: &Value, input: &Value) -> Result<(), String>;

    /// Validate the scoreboard carried by `GameEnded`.
    fn check_scoreboard(&self, _scoreboard: &Scoreboard) -> Result<(), String> {
        Ok(())
    }
}

/// Set of known game variants, looked up by tag.
#[derive(Clone)]
pub struct GameRegistry {
    variants: HashMap<&'static str, Arc<dyn GameVariant>>,
}

impl GameRegistry {
    /// A registry with no variants.
    pub fn empty() -> Self {
        Self {
            variants: HashMap::new(),
        }
    }

    /// Register `variant`, replacing any variant with the same tag.
    #[must_use]
    pub fn with(mut self, variant: impl GameVariant) -> Self {
        self.register(variant);
        self
    }

    /// Register `variant`, replacing any variant with the same tag.
    pub fn register(&mut self, variant: impl GameVariant) {
        self.variants.insert(variant.tag(), Arc::new(variant));
    }

    /// Look up a variant by its wire tag.
    pub fn get(&self, tag: &str) -> Option<&Arc<dyn GameVariant>> {
        self.variants.get(tag)
    }

    /// Tags of every registered variant, sorted.
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.variants.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

impl Default for GameRegistry {
    /// Both built-in games.
    fn default() -> Self {
        Self::empty().with(RockPaperScissors).with(MemoryRecall)
    }
}

impl fmt::Debug for GameRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameRegistry")
            .field("variants", &self.tags())
            .finish()
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

    struct CoinFlip;

    impl GameVariant for CoinFlip {
        fn tag(&self) -> &'static str {
            "CoinFlip"
        }

        fn check_start(&self, _payload: &Value) -> Result<(), String> {
            Ok(())
        }

        fn check_input(&self, _start: &Value, input: &Value) -> Result<(), String> {
            input
                .as_bool()
                .map(|_| ())
                .ok_or_else(|| "expected a boolean".into())
        }
    }

    #[test]
    fn default_registry_knows_both_games() {
        let registry = GameRegistry::default();
        assert_eq!(registry.tags(), vec!["MemoryRecall", "RockPaperScissors"]);
    }

    #[test]
    fn custom_variants_can_be_registered() {
        let registry = GameRegistry::default().with(CoinFlip);
        let coin = registry.get("CoinFlip").unwrap();
        assert!(coin.check_input(&Value::Null, &json!(true)).is_ok());
        assert!(coin.check_input(&Value::Null, &json!("heads")).is_err());
        assert!(coin.check_scoreboard(&Scoreboard::new()).is_ok());
    }

    #[test]
    fn unknown_tags_are_absent() {
        assert!(GameRegistry::empty().get("RockPaperScissors").is_none());
    }
}
