//! Phase markers: reserved `system` messages that carry conversation state.
//!
//! The strings below are a wire format between turns. Conversations already in
//! flight are recognised by these exact texts, so they must never change.

use super::models::{Message, Role};

const ASSESSMENT_HEADING: &str = "-Self assessment-";
const ANSWER_BOUNDARY: &str = "Please answer these questions one by one.";
const ASSESSMENT_STARTED: &str = "-ASSESSMENT_STARTED-";
const ASSESSMENT_COMPLETED: &str = "-ASSESSMENT_COMPLETED-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Heading of a generated question block; matched as a substring.
    AssessmentHeading,
    /// Start of answer collection; matched as a substring.
    AnswerBoundary,
    /// Written immediately before the boundary; matched exactly.
    AssessmentStarted,
    /// Grading delivered; matched exactly.
    AssessmentCompleted,
}

impl Marker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssessmentHeading => ASSESSMENT_HEADING,
            Self::AnswerBoundary => ANSWER_BOUNDARY,
            Self::AssessmentStarted => ASSESSMENT_STARTED,
            Self::AssessmentCompleted => ASSESSMENT_COMPLETED,
        }
    }

    /// Whether `content` carries this marker, ignoring the author role.
    pub fn matches(&self, content: &str) -> bool {
        match self {
            Self::AssessmentHeading | Self::AnswerBoundary => content.contains(self.as_str()),
            Self::AssessmentStarted | Self::AssessmentCompleted => content.trim() == self.as_str(),
        }
    }

    /// Decode the marker carried by a message. Only `system` messages count;
    /// a user typing a sentinel never moves the conversation.
    pub fn detect(message: &Message) -> Option<Marker> {
        if message.role != Role::System {
            return None;
        }
        [
            Self::AssessmentCompleted,
            Self::AssessmentStarted,
            Self::AnswerBoundary,
            Self::AssessmentHeading,
        ]
        .into_iter()
        .find(|marker| marker.matches(&message.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(content: &str) -> Message {
        Message {
            id: 1,
            conversation_id: 1,
            role: Role::System,
            content: content.to_string(),
            created_at: "2024-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_sentinel_texts_are_stable() {
        assert_eq!(Marker::AssessmentHeading.as_str(), "-Self assessment-");
        assert_eq!(
            Marker::AnswerBoundary.as_str(),
            "Please answer these questions one by one."
        );
        assert_eq!(Marker::AssessmentStarted.as_str(), "-ASSESSMENT_STARTED-");
        assert_eq!(Marker::AssessmentCompleted.as_str(), "-ASSESSMENT_COMPLETED-");
    }

    #[test]
    fn test_detect_exact_flags() {
        assert_eq!(
            Marker::detect(&system("-ASSESSMENT_COMPLETED-")),
            Some(Marker::AssessmentCompleted)
        );
        assert_eq!(
            Marker::detect(&system("  -ASSESSMENT_STARTED-\n")),
            Some(Marker::AssessmentStarted)
        );
        assert_eq!(Marker::detect(&system("The -ASSESSMENT_COMPLETED- flag")), None);
    }

    #[test]
    fn test_detect_substring_markers() {
        let block = "-Self assessment-\nQuestion 1: What is a vector?";
        assert_eq!(Marker::detect(&system(block)), Some(Marker::AssessmentHeading));
        assert_eq!(
            Marker::detect(&system("Great. Please answer these questions one by one.")),
            Some(Marker::AnswerBoundary)
        );
    }

    #[test]
    fn test_detect_ignores_non_system_roles() {
        let mut msg = system("-ASSESSMENT_COMPLETED-");
        msg.role = Role::User;
        assert_eq!(Marker::detect(&msg), None);
        msg.role = Role::Chatbot;
        assert_eq!(Marker::detect(&msg), None);
    }

    #[test]
    fn test_detect_plain_text_is_none() {
        assert_eq!(Marker::detect(&system("Let me know if you need more.")), None);
    }
}
