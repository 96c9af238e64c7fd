//! Capture trait definitions
//!
//! Platform-agnostic contracts for the three upstream producers the
//! coordinator drives: a camera, an emotion classifier and a speech
//! transcriber. Streams are handed out by `start()` as bounded channels; an
//! `Err` item is a mid-session fault and a closed channel is a normal end.

use crate::recorder::state::EmotionPrediction;
use crate::utils::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque handle to a captured video frame
///
/// Cloning is cheap; pixel data is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic sequence number assigned by the source
    pub sequence: u64,

    /// Capture time
    pub captured_at: DateTime<Utc>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Raw pixel buffer in the source's native format
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            sequence,
            captured_at: Utc::now(),
            width,
            height,
            data: data.into(),
        }
    }

    /// Frame without pixel data, used where only ordering matters
    pub fn empty(sequence: u64) -> Self {
        Self::new(sequence, 0, 0, Vec::new())
    }
}

/// A raw utterance as produced by a speech transcriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(text, Utc::now())
    }

    pub fn at(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }
}

/// Frames in capture order
pub type FrameStream = mpsc::Receiver<Result<Frame, CaptureError>>;

/// Utterances in recognition order
pub type TranscriptStream = mpsc::Receiver<Result<TranscriptEvent, CaptureError>>;

/// A camera (or any other producer of video frames)
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Short identifier used in logs
    fn id(&self) -> &str;

    /// Acquire the device and open a frame stream
    async fn start(&self) -> CaptureResult<FrameStream>;

    /// Release the device; closes the stream. Idempotent.
    fn stop(&self);
}

/// Facial-emotion classifier
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    fn id(&self) -> &str;

    /// Prepare the model. A classifier that fails to load stays unusable and
    /// simply returns `None` from `classify`.
    async fn start(&self);

    /// Release the model. Idempotent.
    fn stop(&self);

    /// Classify one frame. `None` when nothing was detected or the model is
    /// unavailable.
    async fn classify(&self, frame: Frame) -> Option<EmotionPrediction>;

    /// Whether `start` left the classifier able to produce predictions
    fn is_ready(&self) -> bool;
}

/// Speech transcriber
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    fn id(&self) -> &str;

    /// Acquire the microphone/recognizer and open an utterance stream
    async fn start(&self) -> CaptureResult<TranscriptStream>;

    /// Release the microphone; closes the stream. Idempotent.
    fn stop(&self);
}
