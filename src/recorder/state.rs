//! Fused session state
//!
//! Defines the lifecycle state machine and the value observers read: the
//! latest emotion classification plus the emotion-tagged utterance history.

use crate::capture::traits::TranscriptEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Upper bound on retained utterances; oldest are evicted first
pub const MAX_HISTORY: usize = 500;

/// Current lifecycle state of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Nothing running
    #[default]
    Idle,
    /// Frame/emotion pump active, transcript pump inactive
    Previewing,
    /// Transcript pump active
    Recording,
}

impl LifecycleState {
    /// Derive the state from the two pump flags
    pub fn from_flags(previewing: bool, recording: bool) -> Self {
        if recording {
            Self::Recording
        } else if previewing {
            Self::Previewing
        } else {
            Self::Idle
        }
    }
}

/// A single emotion classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionPrediction {
    /// Class label (e.g. "Happy")
    pub label: String,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// When the classification was produced
    pub timestamp: DateTime<Utc>,
}

impl EmotionPrediction {
    /// Create a prediction stamped now. Confidence is clamped to [0, 1].
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self::with_timestamp(label, confidence, Utc::now())
    }

    pub fn with_timestamp(label: impl Into<String>, confidence: f32, timestamp: DateTime<Utc>) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
            timestamp,
        }
    }

    /// Short HUD text, e.g. "Happy 80%"
    pub fn display(&self) -> String {
        format!("{} {}", self.label, format_confidence(self.confidence))
    }
}

/// A transcribed utterance tagged with the emotion current at its arrival
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub emotion: Option<String>,
    pub confidence: Option<f32>,
}

impl Utterance {
    /// Wrap a raw transcript event, copying the emotion snapshot into the record.
    pub fn tagged(event: TranscriptEvent, emotion: Option<&EmotionPrediction>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: event.text,
            timestamp: event.timestamp,
            emotion: emotion.map(|e| e.label.clone()),
            confidence: emotion.map(|e| e.confidence),
        }
    }

    /// "Sad 60%" when the utterance carries an emotion
    pub fn emotion_badge(&self) -> Option<String> {
        let label = self.emotion.as_ref()?;
        Some(match self.confidence {
            Some(c) => format!("{} {}", label, format_confidence(c)),
            None => label.clone(),
        })
    }
}

/// Snapshot of everything the coordinator has fused so far
///
/// Only the coordinator mutates this value; observers receive it behind an
/// `Arc` and can never see a partially applied update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedState {
    current_emotion: Option<EmotionPrediction>,
    utterances: VecDeque<Utterance>,
}

impl FusedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest classification, if any has happened yet
    pub fn current_emotion(&self) -> Option<&EmotionPrediction> {
        self.current_emotion.as_ref()
    }

    /// Utterances in arrival order
    pub fn utterances(&self) -> &VecDeque<Utterance> {
        &self.utterances
    }

    pub fn is_empty(&self) -> bool {
        self.current_emotion.is_none() && self.utterances.is_empty()
    }

    /// Last-writer-wins replacement of the current emotion
    pub(crate) fn set_emotion(&mut self, prediction: EmotionPrediction) {
        self.current_emotion = Some(prediction);
    }

    /// Tag `event` with the current emotion and append it, keeping at most
    /// `cap` utterances. Returns the appended record and how many were evicted.
    pub(crate) fn append_tagged(&mut self, event: TranscriptEvent, cap: usize) -> (Utterance, usize) {
        let utterance = Utterance::tagged(event, self.current_emotion.as_ref());
        let evicted = self.push_utterance(utterance.clone(), cap);
        (utterance, evicted)
    }

    /// Append and evict from the front until `len <= cap`.
    pub(crate) fn push_utterance(&mut self, utterance: Utterance, cap: usize) -> usize {
        let cap = cap.clamp(1, MAX_HISTORY);
        self.utterances.push_back(utterance);

        let mut evicted = 0;
        while self.utterances.len() > cap {
            self.utterances.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// Render a confidence in [0, 1] as a whole percentage, e.g. "80%"
pub fn format_confidence(confidence: f32) -> String {
    format!("{}%", (confidence * 100.0).round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> TranscriptEvent {
        TranscriptEvent::new(text)
    }

    #[test]
    fn test_lifecycle_from_flags() {
        assert_eq!(LifecycleState::from_flags(false, false), LifecycleState::Idle);
        assert_eq!(LifecycleState::from_flags(true, false), LifecycleState::Previewing);
        assert_eq!(LifecycleState::from_flags(true, true), LifecycleState::Recording);
        // Frame stream faulted while recording continues
        assert_eq!(LifecycleState::from_flags(false, true), LifecycleState::Recording);
    }

    #[test]
    fn test_prediction_confidence_is_clamped() {
        assert_eq!(EmotionPrediction::new("Happy", 1.4).confidence, 1.0);
        assert_eq!(EmotionPrediction::new("Happy", -0.2).confidence, 0.0);
        assert_eq!(EmotionPrediction::new("Happy", f32::NAN).confidence, 0.0);
    }

    #[test]
    fn test_tagging_copies_snapshot() {
        let mut state = FusedState::new();
        state.set_emotion(EmotionPrediction::new("Sad", 0.6));
        let (first, _) = state.append_tagged(event("hello"), MAX_HISTORY);

        state.set_emotion(EmotionPrediction::new("Happy", 0.9));
        let (second, _) = state.append_tagged(event("world"), MAX_HISTORY);

        assert_eq!(first.emotion.as_deref(), Some("Sad"));
        assert_eq!(first.confidence, Some(0.6));
        assert_eq!(state.utterances()[0].emotion.as_deref(), Some("Sad"));
        assert_eq!(second.emotion.as_deref(), Some("Happy"));
    }

    #[test]
    fn test_untagged_when_no_emotion() {
        let mut state = FusedState::new();
        let (utterance, evicted) = state.append_tagged(event("hi"), MAX_HISTORY);
        assert_eq!(evicted, 0);
        assert!(utterance.emotion.is_none());
        assert!(utterance.confidence.is_none());
        assert!(utterance.emotion_badge().is_none());
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut state = FusedState::new();
        for i in 0..MAX_HISTORY {
            state.append_tagged(event(&format!("u{i}")), MAX_HISTORY);
        }
        assert_eq!(state.utterances().len(), MAX_HISTORY);

        let (_, evicted) = state.append_tagged(event("newest"), MAX_HISTORY);
        assert_eq!(evicted, 1);
        assert_eq!(state.utterances().len(), MAX_HISTORY);
        assert_eq!(state.utterances().front().unwrap().text, "u1");
        assert_eq!(state.utterances().back().unwrap().text, "newest");
    }

    #[test]
    fn test_cap_never_exceeds_max_history() {
        let mut state = FusedState::new();
        for i in 0..(MAX_HISTORY + 20) {
            state.push_utterance(Utterance::tagged(event(&i.to_string()), None), MAX_HISTORY * 2);
        }
        assert_eq!(state.utterances().len(), MAX_HISTORY);
        assert_eq!(state.utterances().front().unwrap().text, "20");
    }

    #[test]
    fn test_display_helpers() {
        let prediction = EmotionPrediction::new("Happy", 0.8);
        assert_eq!(prediction.display(), "Happy 80%");

        let mut state = FusedState::new();
        state.set_emotion(EmotionPrediction::new("Sad", 0.6));
        let (utterance, _) = state.append_tagged(event("hello"), MAX_HISTORY);
        assert_eq!(utterance.emotion_badge().as_deref(), Some("Sad 60%"));
        assert_eq!(format_confidence(0.125), "13%");
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let mut state = FusedState::new();
        state.set_emotion(EmotionPrediction::new("Neutral", 0.5));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["currentEmotion"]["label"], "Neutral");
        assert!(json["utterances"].as_array().unwrap().is_empty());

        let lifecycle = serde_json::to_string(&LifecycleState::Previewing).unwrap();
        assert_eq!(lifecycle, "\"previewing\"");
    }
}
