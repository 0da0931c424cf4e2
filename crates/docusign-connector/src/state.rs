use serde::{Deserialize, Serialize};

const SEED_WATERMARK: &str = "2020-01-01T00:00:00.000Z";

/// Persisted cursor state, read once at sync start and written once via
/// checkpoint at sync end (SPEC_FULL.md §4.6).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SyncState {
    pub last_envelope_sync: String,
    pub last_template_sync: String,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_envelope_sync: SEED_WATERMARK.to_string(),
            last_template_sync: SEED_WATERMARK.to_string(),
        }
    }
}

impl SyncState {
    /// Builds the checkpoint state that replaces this one after a fully
    /// successful traversal: both watermarks advance to `now`.
    pub fn advanced_to(now: &str) -> Self {
        Self {
            last_envelope_sync: now.to_string(),
            last_template_sync: now.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_seeds_both_watermarks() {
        let state = SyncState::default();
        assert_eq!(state.last_envelope_sync, SEED_WATERMARK);
        assert_eq!(state.last_template_sync, SEED_WATERMARK);
    }

    #[test]
    fn advanced_to_sets_both_watermarks_to_now() {
        let state = SyncState::advanced_to("2024-06-01T00:00:00Z");
        assert_eq!(state.last_envelope_sync, "2024-06-01T00:00:00Z");
        assert_eq!(state.last_template_sync, "2024-06-01T00:00:00Z");
    }
}
