//! Phase detection over the message log.
//!
//! The conversation phase is never stored. Every turn re-derives it from the
//! full log by scanning newest to oldest for phase markers:
//!
//! | Newest relevant marker      | Phase                      |
//! |-----------------------------|----------------------------|
//! | answer boundary             | `InProgress`               |
//! | `-ASSESSMENT_COMPLETED-`    | `Completed`                |
//! | none                        | `FreeChat`                 |
//!
//! A question block with no boundary after it leaves the conversation in
//! `FreeChat`: generating questions alone does not start answer collection.

use std::fmt;

use super::markers::Marker;
use super::models::{Message, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseState {
    FreeChat,
    /// Grading was delivered; the conversation is back to free chat.
    Completed,
    /// Answers are being collected for the most recent question block.
    InProgress {
        /// Chronological index of the boundary message.
        start_index: usize,
        /// Most recent question block in the log, if any.
        assessment_text: Option<String>,
    },
}

impl PhaseState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FreeChat => "free_chat",
            Self::Completed => "completed",
            Self::InProgress { .. } => "in_progress",
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A conversation's messages in total `(created_at, id)` order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Accepts messages in any order.
    pub fn new(mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn phase(&self) -> PhaseState {
        let mut boundary = None;
        for (index, message) in self.messages.iter().enumerate().rev() {
            match Marker::detect(message) {
                Some(Marker::AnswerBoundary) => {
                    boundary = Some(index);
                    break;
                }
                Some(Marker::AssessmentCompleted) => return PhaseState::Completed,
                _ => {}
            }
        }

        match boundary {
            Some(start_index) => PhaseState::InProgress {
                start_index,
                assessment_text: self.latest_assessment().map(str::to_string),
            },
            None => PhaseState::FreeChat,
        }
    }

    /// The most recent question block, searched over the whole log.
    pub fn latest_assessment(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::System)
            .find(|m| Marker::AssessmentHeading.matches(&m.content))
            .map(|m| m.content.as_str())
    }

    /// Contents of `user` messages strictly after `index`, in arrival order.
    pub fn user_messages_after(&self, index: usize) -> Vec<&str> {
        self.messages
            .iter()
            .skip(index.saturating_add(1))
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect()
    }

    /// `role: content` lines for the newest `limit` messages, oldest first.
    pub fn render(&self, limit: usize) -> String {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages
            .iter()
            .skip(skip)
            .map(|m| format!("{}: {}\n", m.role, m.content))
            .collect()
    }
}

/// Derive the phase of a conversation from its messages, in any order.
pub fn derive_phase(messages: &[Message]) -> PhaseState {
    Transcript::new(messages.to_vec()).phase()
}
