//! Session review helpers

pub mod summary;

pub use summary::{ChatMessage, ChatRole, SessionSummary};
