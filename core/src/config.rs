//! Engine configuration.
//!
//! Loaded from a JSON file by the runner; tests use default_test().

use crate::types::SkillCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minutes of slippage tolerated before the detector reports a delay.
    pub grace_window_minutes: i64,

    /// Maximum age of a roster snapshot before the planner refuses to
    /// act on it and defers to the next pass.
    pub roster_freshness_seconds: i64,

    /// Upper bound on appointments touched by a single cascade. A walk
    /// terminates on its own (the day queue is finite); this guards the
    /// store against a runaway queue.
    pub max_cascade_steps: usize,

    /// Recognized skill codes. Ingestion rejects appointments that
    /// reference anything outside this set.
    pub skill_catalog: BTreeSet<SkillCode>,
}

impl EngineConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            grace_window_minutes: 5,
            roster_freshness_seconds: 300,
            max_cascade_steps: 64,
            skill_catalog: [
                "CUT".to_string(),
                "COLOR".to_string(),
                "MASSAGE".to_string(),
                "PHYSIO".to_string(),
                "CONSULT".to_string(),
                "SURG".to_string(),
            ]
            .into(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_test()
    }
}
