//! Capture collaborators
//!
//! Contracts for the camera, the emotion classifier and the speech
//! transcriber, plus the channel-fed implementations platform code plugs into
//! and deterministic mocks for tests.

pub mod bridge;
pub mod mock;
pub mod traits;

pub use bridge::{BridgedFrameSource, BridgedTranscriptSource, FrameFeeder, TranscriptFeeder};
pub use mock::{MockEmotionClassifier, MockFrameSource, MockTranscriptSource};
pub use traits::{
    EmotionClassifier, Frame, FrameSource, FrameStream, TranscriptEvent, TranscriptSource,
    TranscriptStream,
};
