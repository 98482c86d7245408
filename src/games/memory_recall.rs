//! "The right icon": a memorize-then-pick challenge.
//!
//! The start payload is the list of icon offsets to memorize. After the
//! board is shuffled the player answers with the offsets they recall; only
//! an exact match scores.

use serde_json::Value;

use super::GameVariant;

/// The memory-recall variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryRecall;

impl MemoryRecall {
    /// Wire tag.
    pub const TAG: &'static str = "MemoryRecall";

    /// Parse a list of icon offsets (`[u8]`) out of a payload.
    pub fn offsets(payload: &Value) -> Result<Vec<u8>, String> {
        let items = payload
            .as_array()
            .ok_or_else(|| format!("expected a list of offsets, got {payload}"))?;
        items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| format!("offset {item} is not in 0..=255"))
            })
            .collect()
    }

    /// Returns `true` if `pick` recalls `target` exactly.
    pub fn is_correct(target: &[u8], pick: &[u8]) -> bool {
        target == pick
    }
}

impl GameVariant for MemoryRecall {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn check_start(&self, payload: &Value) -> Result<(), String> {
        let offsets = Self::offsets(payload)?;
        if offsets.is_empty() {
            return Err("nothing to memorize".into());
        }
        Ok(())
    }

    fn check_input(&self, _start: &Value, input: &Value) -> Result<(), String> {
        Self::offsets(input).map(|_| ())
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
    fn start_needs_a_non_empty_offset_list() {
        assert!(MemoryRecall.check_start(&json!([3, 1, 4])).is_ok());
        assert!(MemoryRecall.check_start(&json!([])).is_err());
        assert!(MemoryRecall.check_start(&Value::Null).is_err());
        assert!(MemoryRecall.check_start(&json!([256])).is_err());
        assert!(MemoryRecall.check_start(&json!([-1])).is_err());
    }

    #[test]
    fn input_is_an_offset_list() {
        let start = json!([3, 1, 4]);
        assert!(MemoryRecall.check_input(&start, &json!([3, 1, 4])).is_ok());
        assert!(MemoryRecall.check_input(&start, &json!([9])).is_ok());
        assert!(MemoryRecall.check_input(&start, &json!("3,1,4")).is_err());
    }

    #[test]
    fn only_exact_recall_is_correct() {
        assert!(MemoryRecall::is_correct(&[3, 1, 4], &[3, 1, 4]));
        assert!(!MemoryRecall::is_correct(&[3, 1, 4], &[3, 4, 1]));
        assert!(!MemoryRecall::is_correct(&[3, 1, 4], &[3, 1]));
    }
}
