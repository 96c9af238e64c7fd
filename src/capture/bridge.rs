//! Channel-fed capture sources
//!
//! Platform capture code (camera callbacks, speech recognizer callbacks) runs
//! on its own threads and pushes results through a feeder handle. The bridged
//! source turns those pushes into the stream the coordinator consumes, and
//! closes it again on `stop()`.

use crate::capture::traits::{Frame, FrameSource, FrameStream, TranscriptEvent, TranscriptSource, TranscriptStream};
use crate::recorder::config::FusionConfig;
use crate::utils::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Item<T> = Result<T, CaptureError>;

/// One reusable stream endpoint: a fresh channel per `open`, dropped on `close`
pub(crate) struct StreamBridge<T> {
    buffer: usize,
    sender: Mutex<Option<mpsc::Sender<Item<T>>>>,
    unavailable: Mutex<Option<String>>,
}

impl<T: Send + 'static> StreamBridge<T> {
    pub(crate) fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            sender: Mutex::new(None),
            unavailable: Mutex::new(None),
        }
    }

    /// Open a new stream, replacing (and thereby ending) any previous one
    pub(crate) fn open(&self) -> CaptureResult<mpsc::Receiver<Item<T>>> {
        if let Some(reason) = self.unavailable.lock().clone() {
            return Err(CaptureError::Start(reason));
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        *self.sender.lock() = Some(tx);
        Ok(rx)
    }

    /// Drop the sender so the consumer sees the end of the stream
    pub(crate) fn close(&self) -> bool {
        self.sender.lock().take().is_some()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.sender.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub(crate) fn set_unavailable(&self, reason: Option<String>) {
        *self.unavailable.lock() = reason;
    }

    fn current(&self) -> Option<mpsc::Sender<Item<T>>> {
        self.sender.lock().clone()
    }

    /// Non-blocking push. Returns false when the stream is closed or full.
    pub(crate) fn try_push(&self, item: Item<T>) -> bool {
        match self.current() {
            Some(tx) => tx.try_send(item).is_ok(),
            None => false,
        }
    }

    /// Push, waiting for buffer space. Returns false when the stream is closed.
    pub(crate) async fn push(&self, item: Item<T>) -> bool {
        // Clone the sender out so the lock is never held across the await
        let Some(tx) = self.current() else {
            return false;
        };
        tx.send(item).await.is_ok()
    }
}

/// Frame source fed by a platform camera callback
pub struct BridgedFrameSource {
    id: String,
    bridge: Arc<StreamBridge<Frame>>,
}

impl BridgedFrameSource {
    /// Create a source whose stream buffers up to `buffer` frames
    pub fn new(id: impl Into<String>, buffer: usize) -> Self {
        Self {
            id: id.into(),
            bridge: Arc::new(StreamBridge::new(buffer)),
        }
    }

    /// Create a source sized by `config.frame_buffer`
    pub fn from_config(id: impl Into<String>, config: &FusionConfig) -> Self {
        Self::new(id, config.frame_buffer)
    }

    /// Handle for the capture callback
    pub fn feeder(&self) -> FrameFeeder {
        FrameFeeder {
            bridge: self.bridge.clone(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make subsequent `start()` calls fail with `reason` (permission denied,
    /// camera missing). `None` clears it.
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.bridge.set_unavailable(reason);
    }

    pub fn is_streaming(&self) -> bool {
        self.bridge.is_open()
    }
}

#[async_trait]
impl FrameSource for BridgedFrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> CaptureResult<FrameStream> {
        let stream = self.bridge.open()?;
        tracing::info!("Frame source '{}' started", self.id);
        Ok(stream)
    }

    fn stop(&self) {
        if self.bridge.close() {
            tracing::info!("Frame source '{}' stopped", self.id);
        }
    }
}

/// Push side of a [`BridgedFrameSource`]
#[derive(Clone)]
pub struct FrameFeeder {
    bridge: Arc<StreamBridge<Frame>>,
    sequence: Arc<AtomicU64>,
}

impl FrameFeeder {
    /// Offer a frame. Live capture never waits: when the consumer is behind or
    /// the source is stopped the frame is dropped and `false` returned.
    pub fn feed(&self, frame: Frame) -> bool {
        self.bridge.try_push(Ok(frame))
    }

    /// Offer raw pixels, numbering frames in feed order
    pub fn feed_pixels(&self, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> bool {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.feed(Frame::new(sequence, width, height, data))
    }

    /// Report that the camera session died
    pub fn fault(&self, message: impl Into<String>) -> bool {
        self.bridge.try_push(Err(CaptureError::StreamFault(message.into())))
    }
}

/// Transcript source fed by a platform speech recognizer
pub struct BridgedTranscriptSource {
    id: String,
    bridge: Arc<StreamBridge<TranscriptEvent>>,
}

impl BridgedTranscriptSource {
    pub fn new(id: impl Into<String>, buffer: usize) -> Self {
        Self {
            id: id.into(),
            bridge: Arc::new(StreamBridge::new(buffer)),
        }
    }

    pub fn from_config(id: impl Into<String>, config: &FusionConfig) -> Self {
        Self::new(id, config.transcript_buffer)
    }

    pub fn feeder(&self) -> TranscriptFeeder {
        TranscriptFeeder {
            bridge: self.bridge.clone(),
        }
    }

    /// Make subsequent `start()` calls fail with `reason` (e.g. speech
    /// recognition not authorized). `None` clears it.
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.bridge.set_unavailable(reason);
    }

    pub fn is_streaming(&self) -> bool {
        self.bridge.is_open()
    }
}

#[async_trait]
impl TranscriptSource for BridgedTranscriptSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> CaptureResult<TranscriptStream> {
        let stream = self.bridge.open()?;
        tracing::info!("Transcript source '{}' started", self.id);
        Ok(stream)
    }

    fn stop(&self) {
        if self.bridge.close() {
            tracing::info!("Transcript source '{}' stopped", self.id);
        }
    }
}

/// Push side of a [`BridgedTranscriptSource`]
#[derive(Clone)]
pub struct TranscriptFeeder {
    bridge: Arc<StreamBridge<TranscriptEvent>>,
}

impl TranscriptFeeder {
    /// Deliver an utterance, waiting for buffer space so none are lost.
    /// Returns false when the source is stopped.
    pub async fn feed(&self, event: TranscriptEvent) -> bool {
        self.bridge.push(Ok(event)).await
    }

    /// Report a recognizer error; the coordinator ends the recording
    pub async fn fault(&self, message: impl Into<String>) -> bool {
        self.bridge
            .push(Err(CaptureError::StreamFault(message.into())))
            .await
    }
}
