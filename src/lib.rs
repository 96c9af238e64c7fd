//! moodfuse - live emotion and speech fusion.
//!
//! Merges a facial-emotion classification stream and a speech transcript
//! stream into one observable session state: the latest emotion plus an
//! emotion-tagged utterance history.

pub mod capture;
pub mod recorder;
pub mod session;
pub mod utils;

pub use capture::{EmotionClassifier, Frame, FrameSource, TranscriptEvent, TranscriptSource};
pub use recorder::{
    EmotionPrediction, FusedState, FusionConfig, FusionCoordinator, FusionEvent, LifecycleState, Utterance,
};
pub use session::{ChatMessage, ChatRole, SessionSummary};
pub use utils::error::{CaptureError, ErrorResponse, FusionError, FusionResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
///
/// Honors `RUST_LOG`, defaulting to `moodfuse=debug`. Returns false if a
/// subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodfuse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing();
        assert!(!init_tracing());
    }
}
