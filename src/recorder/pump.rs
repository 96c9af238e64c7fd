//! Stream pumps
//!
//! A pump is a spawned task draining one collaborator stream into the fused
//! state. Pumps stop cooperatively: the coordinator raises a [`CancelSignal`]
//! and the pump notices at its next iteration boundary. Whatever way a pump
//! exits, its collaborators are stopped by a drop guard.

use super::coordinator::SharedState;
use super::throttle::ClassificationThrottle;
use crate::capture::traits::{EmotionClassifier, FrameSource, FrameStream, TranscriptSource, TranscriptStream};
use crate::utils::error::CaptureError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Cooperative cancellation flag shared by a pump and the tasks it spawns
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake the pump. Idempotent.
    pub(crate) fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel cannot be missed
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Owner's side of a running pump
///
/// Dropping the handle cancels the pump without waiting for it.
pub(crate) struct PumpHandle {
    name: &'static str,
    cancel: CancelSignal,
    task: Option<JoinHandle<()>>,
}

impl PumpHandle {
    pub(crate) fn spawn<F>(name: &'static str, cancel: CancelSignal, pump: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!("Spawning {} pump", name);
        Self {
            name,
            cancel,
            task: Some(tokio::spawn(pump)),
        }
    }

    /// False once the pump task has returned
    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the pump and wait for it to return
    pub(crate) async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("{} pump terminated abnormally: {}", self.name, e);
            }
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Runs a closure when dropped; used to guarantee collaborator `stop()`
struct OnExit<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnExit<F> {
    fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnExit<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Why a pump loop returned
#[derive(Debug)]
enum PumpExit {
    Cancelled,
    Ended,
    Faulted(CaptureError),
}

/// Everything the frame/emotion pump needs
pub(crate) struct FramePump {
    pub frames: Arc<dyn FrameSource>,
    pub classifier: Arc<dyn EmotionClassifier>,
    pub throttle: ClassificationThrottle,
    pub shared: Arc<SharedState>,
}

impl FramePump {
    /// Drain frames, classifying at most one at a time and dropping the rest.
    pub(crate) async fn run(self, mut stream: FrameStream, cancel: CancelSignal) {
        let FramePump {
            frames,
            classifier,
            throttle,
            shared,
        } = self;

        let _release = OnExit::new({
            let frames = frames.clone();
            let classifier = classifier.clone();
            move || {
                frames.stop();
                classifier.stop();
            }
        });

        let mut seen: u64 = 0;
        let mut dropped: u64 = 0;
        let mut classified: u64 = 0;

        let exit = loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PumpExit::Cancelled,
                item = stream.recv() => item,
            };

            match item {
                None => break PumpExit::Ended,
                Some(Err(fault)) => break PumpExit::Faulted(fault),
                Some(Ok(frame)) => {
                    seen += 1;
                    match throttle.try_begin() {
                        None => dropped += 1,
                        Some(ticket) => {
                            classified += 1;
                            let classifier = classifier.clone();
                            let shared = shared.clone();
                            let signal = cancel.clone();
                            tokio::spawn(async move {
                                if let Some(prediction) = classifier.classify(frame).await {
                                    if !shared.publish_emotion(prediction, &signal) {
                                        tracing::debug!("Discarding classification from stopped preview");
                                    }
                                }
                                ticket.release().await;
                            });
                        }
                    }
                }
            }

            if cancel.is_cancelled() {
                break PumpExit::Cancelled;
            }
        };

        // In-flight classifications must not land after this pump is gone
        cancel.cancel();

        match exit {
            PumpExit::Cancelled => {}
            PumpExit::Ended => {
                tracing::info!("Frame stream from '{}' ended", frames.id());
                shared.end_preview();
            }
            PumpExit::Faulted(fault) => {
                tracing::error!("Frame stream from '{}' faulted: {}", frames.id(), fault);
                shared.record_error(fault.to_string());
                shared.end_preview();
            }
        }

        tracing::info!(
            "Frame pump exited: {} frames, {} classified, {} dropped by throttle",
            seen,
            classified,
            dropped
        );
    }
}

/// Everything the transcript pump needs
pub(crate) struct TranscriptPump {
    pub transcripts: Arc<dyn TranscriptSource>,
    pub shared: Arc<SharedState>,
}

impl TranscriptPump {
    /// Drain utterances in order, tagging each with the current emotion.
    pub(crate) async fn run(self, mut stream: TranscriptStream, cancel: CancelSignal) {
        let TranscriptPump { transcripts, shared } = self;

        let _release = OnExit::new({
            let transcripts = transcripts.clone();
            move || transcripts.stop()
        });

        let mut appended: u64 = 0;

        let exit = loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PumpExit::Cancelled,
                item = stream.recv() => item,
            };

            match item {
                None => break PumpExit::Ended,
                Some(Err(fault)) => break PumpExit::Faulted(fault),
                Some(Ok(event)) => {
                    shared.append_utterance(event);
                    appended += 1;
                }
            }

            if cancel.is_cancelled() {
                break PumpExit::Cancelled;
            }
        };

        cancel.cancel();

        match exit {
            PumpExit::Cancelled => {}
            PumpExit::Ended => {
                tracing::info!("Transcript stream from '{}' ended", transcripts.id());
                shared.end_recording();
            }
            PumpExit::Faulted(fault) => {
                tracing::error!("Transcript stream from '{}' faulted: {}", transcripts.id(), fault);
                shared.record_error(fault.to_string());
                shared.end_recording();
            }
        }

        tracing::info!("Transcript pump exited: {} utterances appended", appended);
    }
}
