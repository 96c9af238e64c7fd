//! Coordinator configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default.

use super::state::MAX_HISTORY;
use crate::utils::error::{FusionError, FusionResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunables for a [`FusionCoordinator`](super::FusionCoordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FusionConfig {
    /// Minimum spacing between classification starts (milliseconds)
    pub throttle_interval_ms: u64,

    /// Utterance history cap (1..=500)
    pub max_history: usize,

    /// Capacity of the observer event channel
    pub event_capacity: usize,

    /// Buffer used by bridged frame sources
    pub frame_buffer: usize,

    /// Buffer used by bridged transcript sources
    pub transcript_buffer: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: 70,
            max_history: MAX_HISTORY,
            event_capacity: 100,
            frame_buffer: 8,
            transcript_buffer: 64,
        }
    }
}

impl FusionConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> FusionResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config: FusionConfig = serde_json::from_str(&contents)?;
        config.validate()?;

        tracing::debug!("Loaded fusion config from {:?}", path);
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    /// Malformed or invalid files are still errors.
    pub fn load_or_default(path: &Path) -> FusionResult<Self> {
        match Self::load(path) {
            Err(FusionError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No fusion config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// - MOODFUSE_THROTTLE_MS → throttle_interval_ms
    /// - MOODFUSE_MAX_HISTORY → max_history
    ///
    /// Empty or unparsable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_number::<u64>("MOODFUSE_THROTTLE_MS") {
            self.throttle_interval_ms = ms;
        }
        if let Some(cap) = env_number::<usize>("MOODFUSE_MAX_HISTORY") {
            self.max_history = cap;
        }
        self
    }

    pub fn validate(&self) -> FusionResult<()> {
        if self.throttle_interval_ms == 0 {
            return Err(FusionError::Config(
                "throttleIntervalMs must be greater than zero".to_string(),
            ));
        }
        if self.max_history == 0 || self.max_history > MAX_HISTORY {
            return Err(FusionError::Config(format!(
                "maxHistory must be between 1 and {MAX_HISTORY}, got {}",
                self.max_history
            )));
        }
        if self.event_capacity == 0 || self.frame_buffer == 0 || self.transcript_buffer == 0 {
            return Err(FusionError::Config(
                "channel capacities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse().ok()
}
