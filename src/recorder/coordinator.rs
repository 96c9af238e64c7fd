//! Fusion coordinator
//!
//! Owns the preview/recording lifecycle, starts and stops the camera,
//! classifier and transcriber, and runs the two pumps that merge their output
//! into one [`FusedState`].

use super::config::FusionConfig;
use super::pump::{CancelSignal, FramePump, PumpHandle, TranscriptPump};
use super::state::{EmotionPrediction, FusedState, LifecycleState, Utterance};
use super::throttle::ClassificationThrottle;
use crate::capture::traits::{EmotionClassifier, FrameSource, TranscriptEvent, TranscriptSource};
use crate::utils::error::{CaptureError, FusionError, FusionResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Events emitted to observers
#[derive(Debug, Clone, PartialEq)]
pub enum FusionEvent {
    /// Frame/emotion pump started
    PreviewStarted,
    /// Frame/emotion pump stopped (explicitly or because its stream ended)
    PreviewStopped,
    /// Transcript pump started
    RecordingStarted,
    /// Transcript pump stopped (explicitly or because its stream ended)
    RecordingStopped,
    /// A new classification replaced the current emotion
    EmotionUpdated(EmotionPrediction),
    /// An utterance was tagged and appended
    UtteranceAppended(Utterance),
    /// A start failure or stream fault was recorded as the last error
    Error(String),
    /// State was cleared by `reset()`
    Reset,
}

/// State shared between the coordinator and its pumps
///
/// `FusedState` sits behind a single lock and is only ever replaced or
/// mutated while that lock is held, so a snapshot is always consistent.
pub(crate) struct SharedState {
    state: RwLock<Arc<FusedState>>,
    previewing: AtomicBool,
    recording: AtomicBool,
    last_error: RwLock<Option<String>>,
    max_history: usize,
    event_tx: broadcast::Sender<FusionEvent>,
}

impl SharedState {
    fn new(config: &FusionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            state: RwLock::new(Arc::new(FusedState::default())),
            previewing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            last_error: RwLock::new(None),
            max_history: config.max_history,
            event_tx,
        }
    }

    pub(crate) fn emit(&self, event: FusionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn snapshot(&self) -> Arc<FusedState> {
        self.state.read().clone()
    }

    /// Overwrite the current emotion unless the producing pump was cancelled.
    /// The cancel check happens under the write lock so a stale result can
    /// never land after a reset.
    pub(crate) fn publish_emotion(&self, prediction: EmotionPrediction, cancel: &CancelSignal) -> bool {
        {
            let mut state = self.state.write();
            if cancel.is_cancelled() {
                return false;
            }
            Arc::make_mut(&mut state).set_emotion(prediction.clone());
        }

        tracing::debug!(
            "Emotion updated: {} ({:.2})",
            prediction.label,
            prediction.confidence
        );
        self.emit(FusionEvent::EmotionUpdated(prediction));
        true
    }

    /// Tag with the emotion current right now and append, evicting the
    /// oldest utterances beyond the cap.
    pub(crate) fn append_utterance(&self, event: TranscriptEvent) -> Utterance {
        let (utterance, evicted) = {
            let mut state = self.state.write();
            Arc::make_mut(&mut state).append_tagged(event, self.max_history)
        };

        if evicted > 0 {
            tracing::debug!("History full, evicted {} oldest utterance(s)", evicted);
        }
        self.emit(FusionEvent::UtteranceAppended(utterance.clone()));
        utterance
    }

    /// Empty the state and the error slot together, so no observer sees a
    /// fresh state next to a stale error.
    fn clear(&self) {
        let mut state = self.state.write();
        let mut last_error = self.last_error.write();
        *state = Arc::new(FusedState::default());
        *last_error = None;
    }

    pub(crate) fn record_error(&self, message: String) {
        *self.last_error.write() = Some(message.clone());
        self.emit(FusionEvent::Error(message));
    }

    /// Clear the previewing flag; emits only on an actual transition
    pub(crate) fn end_preview(&self) {
        if self.previewing.swap(false, Ordering::SeqCst) {
            self.emit(FusionEvent::PreviewStopped);
        }
    }

    pub(crate) fn end_recording(&self) {
        if self.recording.swap(false, Ordering::SeqCst) {
            self.emit(FusionEvent::RecordingStopped);
        }
    }
}

/// Running pumps; at most one of each kind
#[derive(Default)]
struct Pumps {
    preview: Option<PumpHandle>,
    recording: Option<PumpHandle>,
}

/// Merges the emotion and transcript streams of one session
pub struct FusionCoordinator {
    /// Camera
    frames: Arc<dyn FrameSource>,

    /// Emotion model
    classifier: Arc<dyn EmotionClassifier>,

    /// Speech recognizer
    transcripts: Arc<dyn TranscriptSource>,

    config: FusionConfig,

    /// Shared by every frame pump, so a classification still running for a
    /// stopped preview blocks the next one
    throttle: ClassificationThrottle,

    /// State observed by the presentation layer
    shared: Arc<SharedState>,

    /// Pump handles; the lock also serializes lifecycle commands
    pumps: Mutex<Pumps>,
}

impl FusionCoordinator {
    /// Create a coordinator with the default configuration
    pub fn new(
        frames: Arc<dyn FrameSource>,
        classifier: Arc<dyn EmotionClassifier>,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> Self {
        Self::with_config(frames, classifier, transcripts, FusionConfig::default())
    }

    pub fn with_config(
        frames: Arc<dyn FrameSource>,
        classifier: Arc<dyn EmotionClassifier>,
        transcripts: Arc<dyn TranscriptSource>,
        config: FusionConfig,
    ) -> Self {
        let shared = Arc::new(SharedState::new(&config));
        let throttle = ClassificationThrottle::new(config.throttle_interval());
        Self {
            frames,
            classifier,
            transcripts,
            config,
            throttle,
            shared,
            pumps: Mutex::new(Pumps::default()),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Subscribe to state and lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<FusionEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Consistent read-only snapshot of the fused state
    pub fn fused_state(&self) -> Arc<FusedState> {
        self.shared.snapshot()
    }

    pub fn current_emotion(&self) -> Option<EmotionPrediction> {
        self.shared.snapshot().current_emotion().cloned()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    pub fn is_previewing(&self) -> bool {
        self.shared.previewing.load(Ordering::SeqCst)
    }

    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_flags(self.is_previewing(), self.is_recording())
    }

    /// Most recent start failure or stream fault, until acknowledged or reset
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.read().clone()
    }

    /// Dismiss the last error on behalf of the presentation layer
    pub fn acknowledge_error(&self) {
        self.shared.last_error.write().take();
    }

    /// Start the camera, the classifier and the frame/emotion pump.
    ///
    /// No-op while a preview is already running.
    pub async fn start_preview(&self) -> FusionResult<()> {
        let mut pumps = self.pumps.lock().await;
        self.start_preview_locked(&mut pumps).await
    }

    async fn start_preview_locked(&self, pumps: &mut Pumps) -> FusionResult<()> {
        if let Some(handle) = pumps.preview.take() {
            if self.is_previewing() && handle.is_running() {
                pumps.preview = Some(handle);
                tracing::debug!("Preview already running");
                return Ok(());
            }
            // Left over from a stream that ended on its own
            handle.shutdown().await;
        }

        tracing::info!("Starting preview from '{}'", self.frames.id());

        let stream = match self.frames.start().await {
            Ok(stream) => stream,
            Err(e) => {
                self.frames.stop();
                return Err(self.fail_transition("preview", e));
            }
        };

        self.classifier.start().await;
        if !self.classifier.is_ready() {
            tracing::warn!(
                "Classifier '{}' is not ready; preview will run without emotion updates",
                self.classifier.id()
            );
        }

        self.shared.previewing.store(true, Ordering::SeqCst);

        let cancel = CancelSignal::new();
        let pump = FramePump {
            frames: self.frames.clone(),
            classifier: self.classifier.clone(),
            throttle: self.throttle.clone(),
            shared: self.shared.clone(),
        };

        // Before the pump can publish anything
        self.shared.emit(FusionEvent::PreviewStarted);
        pumps.preview = Some(PumpHandle::spawn(
            "frame",
            cancel.clone(),
            pump.run(stream, cancel),
        ));

        tracing::info!("Preview started");
        Ok(())
    }

    /// Start the transcriber and the transcript pump, starting the preview
    /// first if it is not running.
    ///
    /// No-op while already recording. A preview that fails to start is
    /// reported but does not prevent recording; utterances then carry no
    /// emotion.
    pub async fn start_recording(&self) -> FusionResult<()> {
        let mut pumps = self.pumps.lock().await;

        if let Some(handle) = pumps.recording.take() {
            if self.is_recording() && handle.is_running() {
                pumps.recording = Some(handle);
                tracing::debug!("Already recording");
                return Ok(());
            }
            handle.shutdown().await;
        }

        let preview_live = self.is_previewing()
            && pumps.preview.as_ref().is_some_and(|handle| handle.is_running());
        if !preview_live {
            if let Err(e) = self.start_preview_locked(&mut pumps).await {
                tracing::warn!("Recording without emotion tagging: {}", e);
            }
        }

        tracing::info!("Starting recording from '{}'", self.transcripts.id());
        self.shared.recording.store(true, Ordering::SeqCst);

        let stream = match self.transcripts.start().await {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.recording.store(false, Ordering::SeqCst);
                self.transcripts.stop();
                return Err(self.fail_transition("recording", e));
            }
        };

        let cancel = CancelSignal::new();
        let pump = TranscriptPump {
            transcripts: self.transcripts.clone(),
            shared: self.shared.clone(),
        };

        self.shared.emit(FusionEvent::RecordingStarted);
        pumps.recording = Some(PumpHandle::spawn(
            "transcript",
            cancel.clone(),
            pump.run(stream, cancel),
        ));

        tracing::info!("Recording started");
        Ok(())
    }

    /// Stop the transcriber and its pump. The preview keeps running.
    pub async fn stop_recording(&self) {
        let mut pumps = self.pumps.lock().await;
        self.stop_recording_locked(&mut pumps).await;
    }

    async fn stop_recording_locked(&self, pumps: &mut Pumps) {
        let Some(handle) = pumps.recording.take() else {
            tracing::debug!("Not recording");
            return;
        };

        if !handle.is_running() && !self.is_recording() {
            // The stream already ended; its pump released the transcriber
            tracing::debug!("Not recording");
            handle.shutdown().await;
            return;
        }

        tracing::info!("Stopping recording");
        self.transcripts.stop();
        handle.shutdown().await;
        self.shared.end_recording();
    }

    async fn stop_preview_locked(&self, pumps: &mut Pumps) {
        let Some(handle) = pumps.preview.take() else {
            return;
        };

        if !handle.is_running() && !self.is_previewing() {
            handle.shutdown().await;
            return;
        }

        tracing::info!("Stopping preview");
        self.frames.stop();
        handle.shutdown().await;
        self.shared.end_preview();
    }

    /// Stop recording (if active), then the preview. Safe from any state.
    pub async fn stop_all(&self) {
        let mut pumps = self.pumps.lock().await;
        self.stop_recording_locked(&mut pumps).await;
        self.stop_preview_locked(&mut pumps).await;
        tracing::info!("All capture stopped");
    }

    /// Stop everything and return to a clean idle session
    pub async fn reset(&self) {
        let mut pumps = self.pumps.lock().await;
        self.stop_recording_locked(&mut pumps).await;
        self.stop_preview_locked(&mut pumps).await;

        self.shared.clear();
        self.shared.emit(FusionEvent::Reset);
        tracing::info!("Session reset");
    }

    /// Record a failed transition and turn it into the caller's error
    fn fail_transition(&self, transition: &str, error: CaptureError) -> FusionError {
        tracing::warn!("Failed to start {}: {}", transition, error);
        self.shared.record_error(error.to_string());
        FusionError::Capture(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{MockEmotionClassifier, MockFrameSource, MockTranscriptSource};
    use std::time::Duration;

    struct Rig {
        frames: Arc<MockFrameSource>,
        classifier: Arc<MockEmotionClassifier>,
        transcripts: Arc<MockTranscriptSource>,
        coordinator: FusionCoordinator,
    }

    fn rig(classifier: MockEmotionClassifier) -> Rig {
        let frames = Arc::new(MockFrameSource::new());
        let classifier = Arc::new(classifier);
        let transcripts = Arc::new(MockTranscriptSource::new());
        let coordinator = FusionCoordinator::new(frames.clone(), classifier.clone(), transcripts.clone());
        Rig {
            frames,
            classifier,
            transcripts,
            coordinator,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_idle() {
        let rig = rig(MockEmotionClassifier::new());
        assert_eq!(rig.coordinator.lifecycle(), LifecycleState::Idle);
        assert!(rig.coordinator.fused_state().is_empty());
        assert!(rig.coordinator.last_error().is_none());
        assert!(!rig.coordinator.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_start_order_and_emotion() {
        let rig = rig(MockEmotionClassifier::new().with_prediction("Happy", 0.8));
        rig.coordinator.start_preview().await.unwrap();

        assert_eq!(rig.frames.start_calls(), 1);
        assert_eq!(rig.classifier.start_calls(), 1);
        assert_eq!(rig.coordinator.lifecycle(), LifecycleState::Previewing);

        assert!(rig.frames.emit().await);
        settle().await;

        let emotion = rig.coordinator.current_emotion().unwrap();
        assert_eq!(emotion.label, "Happy");
        assert_eq!(emotion.confidence, 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_start_failure_stays_idle() {
        let rig = rig(MockEmotionClassifier::new());
        rig.frames.fail_start_with("camera permission denied");

        let err = rig.coordinator.start_preview().await.unwrap_err();
        assert_eq!(err.to_string(), "camera permission denied");
        assert_eq!(rig.coordinator.lifecycle(), LifecycleState::Idle);
        assert_eq!(rig.coordinator.last_error().as_deref(), Some("camera permission denied"));
        assert_eq!(rig.classifier.start_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_tags_with_snapshot() {
        let rig = rig(MockEmotionClassifier::new().with_prediction("Sad", 0.6));
        rig.coordinator.start_preview().await.unwrap();
        rig.frames.emit().await;
        settle().await;

        rig.coordinator.start_recording().await.unwrap();
        assert_eq!(rig.coordinator.lifecycle(), LifecycleState::Recording);
        rig.transcripts.say("hello").await;
        settle().await;

        let state = rig.coordinator.fused_state();
        let utterance = state.utterances().back().unwrap();
        assert_eq!(utterance.text, "hello");
        assert_eq!(utterance.emotion.as_deref(), Some("Sad"));
        assert_eq!(utterance.confidence, Some(0.6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_recording_keeps_preview() {
        let rig = rig(MockEmotionClassifier::new());
        rig.coordinator.start_recording().await.unwrap();
        assert!(rig.coordinator.is_previewing());

        rig.coordinator.stop_recording().await;
        assert!(!rig.coordinator.is_recording());
        assert!(!rig.transcripts.is_streaming());
        assert_eq!(rig.coordinator.lifecycle(), LifecycleState::Previewing);
        assert!(rig.frames.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_lifecycle() {
        let rig = rig(MockEmotionClassifier::new());
        let mut events = rig.coordinator.subscribe();

        rig.coordinator.start_recording().await.unwrap();
        rig.coordinator.stop_all().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                FusionEvent::PreviewStarted,
                FusionEvent::RecordingStarted,
                FusionEvent::RecordingStopped,
                FusionEvent::PreviewStopped,
            ]
        );
    }

    /// Transcriber whose stream already holds an utterance when handed out
    struct PrimedTranscripts;

    #[async_trait::async_trait]
    impl TranscriptSource for PrimedTranscripts {
        fn id(&self) -> &str {
            "primed"
        }

        async fn start(&self) -> crate::utils::error::CaptureResult<crate::capture::traits::TranscriptStream> {
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            let _ = tx.try_send(Ok(TranscriptEvent::new("buffered")));
            Ok(rx)
        }

        fn stop(&self) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_started_event_precedes_buffered_output() {
        let coordinator = FusionCoordinator::new(
            Arc::new(MockFrameSource::new()),
            Arc::new(MockEmotionClassifier::new()),
            Arc::new(PrimedTranscripts),
        );
        let mut events = coordinator.subscribe();
        coordinator.start_recording().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), FusionEvent::PreviewStarted);
        assert_eq!(events.recv().await.unwrap(), FusionEvent::RecordingStarted);
        match events.recv().await.unwrap() {
            FusionEvent::UtteranceAppended(u) => assert_eq!(u.text, "buffered"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_clear_resets_state_and_error_together() {
        let shared = SharedState::new(&FusionConfig::default());
        shared.append_utterance(TranscriptEvent::new("hello"));
        shared.record_error("mic denied".to_string());

        shared.clear();
        assert!(shared.snapshot().is_empty());
        assert!(shared.last_error.read().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_error_clears_slot() {
        let rig = rig(MockEmotionClassifier::new());
        rig.transcripts.fail_start_with("mic denied");
        assert!(rig.coordinator.start_recording().await.is_err());
        assert_eq!(rig.coordinator.last_error().as_deref(), Some("mic denied"));

        // A later success does not clear it
        rig.transcripts.clear_start_failure();
        rig.coordinator.start_recording().await.unwrap();
        assert_eq!(rig.coordinator.last_error().as_deref(), Some("mic denied"));

        rig.coordinator.acknowledge_error();
        assert!(rig.coordinator.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_cap_from_config() {
        let frames = Arc::new(MockFrameSource::new());
        let transcripts = Arc::new(MockTranscriptSource::new());
        let config = FusionConfig {
            max_history: 3,
            ..Default::default()
        };
        let coordinator = FusionCoordinator::with_config(
            frames,
            Arc::new(MockEmotionClassifier::new()),
            transcripts.clone(),
            config,
        );

        coordinator.start_recording().await.unwrap();
        for text in ["a", "b", "c", "d", "e"] {
            transcripts.say(text).await;
        }
        settle().await;

        let state = coordinator.fused_state();
        let texts: Vec<_> = state.utterances().iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["c", "d", "e"]);
    }
}
