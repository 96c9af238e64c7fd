//! Fusion engine
//!
//! This module implements the emotion/transcript fusion:
//! - FusedState and the Idle/Previewing/Recording lifecycle
//! - FusionCoordinator to start, stop and reset the collaborators
//! - Pumps that drain each collaborator stream, with a classification throttle

pub mod config;
pub mod coordinator;
mod pump;
pub mod state;
pub mod throttle;

pub use config::FusionConfig;
pub use coordinator::{FusionCoordinator, FusionEvent};
pub use state::{format_confidence, EmotionPrediction, FusedState, LifecycleState, Utterance, MAX_HISTORY};
pub use throttle::{ClassificationThrottle, ThrottleTicket};
