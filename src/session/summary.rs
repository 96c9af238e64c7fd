//! Post-recording review
//!
//! Condenses a [`FusedState`] into what a review screen shows and seeds the
//! conversation a chat view opens with.

use crate::recorder::state::{format_confidence, EmotionPrediction, FusedState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const GREETING: &str = "Let's reflect on your latest recording. Ask me anything!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
        }
    }
}

/// Review of one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Utterance texts in arrival order, one per line
    pub transcript: String,

    pub utterance_count: usize,

    /// Emotion current when the summary was taken
    pub last_emotion: Option<EmotionPrediction>,

    /// Most frequent emotion among tagged utterances
    pub dominant_emotion: Option<String>,
}

impl SessionSummary {
    pub fn from_state(state: &FusedState) -> Self {
        let utterances = state.utterances();
        let transcript = utterances
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            transcript,
            utterance_count: utterances.len(),
            last_emotion: state.current_emotion().cloned(),
            dominant_emotion: dominant_label(utterances.iter().filter_map(|u| u.emotion.as_deref())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.utterance_count == 0 && self.last_emotion.is_none()
    }

    /// Messages a chat view starts with: a greeting, then the transcript and
    /// the detected emotion when known.
    pub fn chat_context(&self) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new(ChatRole::Assistant, GREETING)];

        if !self.transcript.is_empty() {
            messages.push(ChatMessage::new(
                ChatRole::System,
                format!("Transcript from your recording:\n{}", self.transcript),
            ));
        }

        if let Some(emotion) = &self.last_emotion {
            messages.push(ChatMessage::new(
                ChatRole::System,
                format!(
                    "Detected emotion: {} ({})",
                    emotion.label,
                    format_confidence(emotion.confidence)
                ),
            ));
        }

        messages
    }
}

/// Most frequent label; on a tie the one seen first wins
fn dominant_label<'a>(labels: impl Iterator<Item = &'a str>) -> Option<String> {
    // (label, count) in first-seen order
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|(seen, _)| *seen == label) {
            Some((_, count)) => *count += 1,
            None => counts.push((label, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.to_string())
}
