//! Deterministic collaborators for tests
//!
//! Each mock counts its lifecycle calls, can be told to fail `start`, and lets
//! the test decide exactly which items (or faults) the stream carries.

use crate::capture::bridge::StreamBridge;
use crate::capture::traits::{
    EmotionClassifier, Frame, FrameSource, FrameStream, TranscriptEvent, TranscriptSource,
    TranscriptStream,
};
use crate::recorder::state::EmotionPrediction;
use crate::utils::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

const MOCK_BUFFER: usize = 1024;

/// Counters shared by the mock sources
#[derive(Default)]
struct CallCounts {
    start: AtomicUsize,
    stop: AtomicUsize,
}

/// Scripted camera
pub struct MockFrameSource {
    bridge: StreamBridge<Frame>,
    calls: CallCounts,
    next_sequence: AtomicUsize,
}

impl MockFrameSource {
    pub fn new() -> Self {
        Self {
            bridge: StreamBridge::new(MOCK_BUFFER),
            calls: CallCounts::default(),
            next_sequence: AtomicUsize::new(0),
        }
    }

    /// Make `start()` fail with `message` until cleared
    pub fn fail_start_with(&self, message: &str) {
        self.bridge.set_unavailable(Some(message.to_string()));
    }

    pub fn clear_start_failure(&self) {
        self.bridge.set_unavailable(None);
    }

    /// Deliver the next frame. Returns false when no stream is open.
    pub async fn emit(&self) -> bool {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) as u64;
        self.bridge.push(Ok(Frame::empty(sequence))).await
    }

    /// Deliver a mid-session fault
    pub async fn fault(&self, message: &str) -> bool {
        self.bridge
            .push(Err(CaptureError::StreamFault(message.to_string())))
            .await
    }

    /// End the stream without a `stop()` call (camera session ended on its own)
    pub fn end_stream(&self) {
        self.bridge.close();
    }

    pub fn is_streaming(&self) -> bool {
        self.bridge.is_open()
    }

    pub fn start_calls(&self) -> usize {
        self.calls.start.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.calls.stop.load(Ordering::SeqCst)
    }
}

impl Default for MockFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    fn id(&self) -> &str {
        "mock-camera"
    }

    async fn start(&self) -> CaptureResult<FrameStream> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        self.bridge.open()
    }

    fn stop(&self) {
        self.calls.stop.fetch_add(1, Ordering::SeqCst);
        self.bridge.close();
    }
}

/// Scripted speech transcriber
pub struct MockTranscriptSource {
    bridge: StreamBridge<TranscriptEvent>,
    calls: CallCounts,
}

impl MockTranscriptSource {
    pub fn new() -> Self {
        Self {
            bridge: StreamBridge::new(MOCK_BUFFER),
            calls: CallCounts::default(),
        }
    }

    pub fn fail_start_with(&self, message: &str) {
        self.bridge.set_unavailable(Some(message.to_string()));
    }

    pub fn clear_start_failure(&self) {
        self.bridge.set_unavailable(None);
    }

    /// Deliver an utterance. Returns false when no stream is open.
    pub async fn say(&self, text: &str) -> bool {
        self.emit(TranscriptEvent::new(text)).await
    }

    pub async fn emit(&self, event: TranscriptEvent) -> bool {
        self.bridge.push(Ok(event)).await
    }

    pub async fn fault(&self, message: &str) -> bool {
        self.bridge
            .push(Err(CaptureError::StreamFault(message.to_string())))
            .await
    }

    pub fn end_stream(&self) {
        self.bridge.close();
    }

    pub fn is_streaming(&self) -> bool {
        self.bridge.is_open()
    }

    pub fn start_calls(&self) -> usize {
        self.calls.start.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.calls.stop.load(Ordering::SeqCst)
    }
}

impl Default for MockTranscriptSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptSource for MockTranscriptSource {
    fn id(&self) -> &str {
        "mock-speech"
    }

    async fn start(&self) -> CaptureResult<TranscriptStream> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        self.bridge.open()
    }

    fn stop(&self) {
        self.calls.stop.fetch_add(1, Ordering::SeqCst);
        self.bridge.close();
    }
}

/// Classifier that answers every frame with a configurable prediction
pub struct MockEmotionClassifier {
    /// (label, confidence) returned while ready; `None` means "no face"
    response: Mutex<Option<(String, f32)>>,
    latency: Duration,
    model_missing: bool,
    ready: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    classify_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl MockEmotionClassifier {
    /// Classifier that detects nothing until a response is set
    pub fn new() -> Self {
        Self {
            response: Mutex::new(None),
            latency: Duration::ZERO,
            model_missing: false,
            ready: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            classify_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Answer every classification with `label` at `confidence`
    pub fn with_prediction(self, label: &str, confidence: f32) -> Self {
        self.set_prediction(label, confidence);
        self
    }

    /// Simulated inference time
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `start()` leaves the classifier unusable
    pub fn with_model_missing(mut self) -> Self {
        self.model_missing = true;
        self
    }

    pub fn set_prediction(&self, label: &str, confidence: f32) {
        *self.response.lock() = Some((label.to_string(), confidence));
    }

    pub fn clear_prediction(&self) {
        *self.response.lock() = None;
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    /// Highest number of classifications observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// When each classification started
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().clone()
    }
}

impl Default for MockEmotionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmotionClassifier for MockEmotionClassifier {
    fn id(&self) -> &str {
        "mock-classifier"
    }

    async fn start(&self) {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.ready.store(!self.model_missing, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
    }

    async fn classify(&self, _frame: Frame) -> Option<EmotionPrediction> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(tokio::time::Instant::now());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if !self.ready.load(Ordering::SeqCst) {
            return None;
        }
        let (label, confidence) = self.response.lock().clone()?;
        Some(EmotionPrediction::new(label, confidence))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
