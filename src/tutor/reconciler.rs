//! Answer reconciliation while a self-assessment is in progress.
//!
//! Each user message after the answer boundary may carry one answer, several,
//! or none. The oracle extracts per-question answers from everything the
//! student has sent so far; when its output is unusable the last five user
//! messages are taken positionally instead.

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use super::engine::TurnContext;
use super::markers::Marker;
use super::models::{Role, TurnReply};
use super::oracle::Oracle;
use super::phase::Transcript;
use super::prompts::{self, QUESTION_COUNT};
use crate::errors::TurnError;

/// Malformed extractor output. Recovered locally by the positional fallback.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extractor returned no JSON object")]
    NoJson,

    #[error("Extractor JSON did not match the schema: {0}")]
    Schema(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractedAnswer {
    pub q: i64,
    #[serde(default)]
    pub text: String,
}

/// The extractor's structured result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Extraction {
    pub count: i64,
    #[serde(default)]
    pub answers: Vec<ExtractedAnswer>,
}

impl Extraction {
    /// Decode extractor output, tolerating a surrounding markdown code fence.
    pub fn parse(raw: &str) -> Result<Self, ExtractionError> {
        let trimmed = raw.trim();
        let body = if trimmed.starts_with("```") {
            let start = trimmed.find('{').ok_or(ExtractionError::NoJson)?;
            let end = trimmed.rfind('}').ok_or(ExtractionError::NoJson)?;
            if end < start {
                return Err(ExtractionError::NoJson);
            }
            &trimmed[start..=end]
        } else {
            trimmed
        };
        Ok(serde_json::from_str(body)?)
    }

    /// Reported count clamped to `0..=QUESTION_COUNT`.
    pub fn answered(&self) -> usize {
        self.count.clamp(0, QUESTION_COUNT as i64) as usize
    }

    /// `Answer <q>: <text>` lines in question order, or `None` unless every
    /// question 1..=5 appears exactly once with non-empty text.
    pub fn complete_answers(&self) -> Option<Vec<String>> {
        let mut slots: Vec<Option<&str>> = vec![None; QUESTION_COUNT];
        for answer in &self.answers {
            let text = answer.text.trim();
            if !(1..=QUESTION_COUNT as i64).contains(&answer.q) || text.is_empty() {
                return None;
            }
            let slot = &mut slots[(answer.q - 1) as usize];
            if slot.is_some() {
                return None;
            }
            *slot = Some(text);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, text)| text.map(|t| format!("Answer {}: {}", i + 1, t)))
            .collect()
    }
}

/// Which path produced the ordered answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Extraction,
    Positional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Still waiting on answers. `remaining` is always at least 1.
    Pending { remaining: usize },
    /// Five ordered answer lines, ready for grading.
    Ready {
        answers: Vec<String>,
        strategy: Strategy,
    },
}

/// Take the newest five responses in arrival order and label them 1..=5.
pub fn positional(responses: &[&str]) -> Reconciliation {
    if responses.len() < QUESTION_COUNT {
        return Reconciliation::Pending {
            remaining: QUESTION_COUNT - responses.len(),
        };
    }
    let answers = responses[responses.len() - QUESTION_COUNT..]
        .iter()
        .enumerate()
        .map(|(i, text)| format!("Answer {}: {}", i + 1, text.trim()))
        .collect();
    Reconciliation::Ready {
        answers,
        strategy: Strategy::Positional,
    }
}

/// Decide whether enough answers are in, preferring the oracle's extraction.
///
/// The positional strategy is used when there is no question block to
/// extract against, or when the extractor fails, returns malformed JSON, or
/// reports five answers without five usable ones. A well-formed count below
/// five is trusted as-is.
pub async fn reconcile(
    oracle: &dyn Oracle,
    assessment: Option<&str>,
    responses: &[&str],
) -> Reconciliation {
    let Some(assessment) = assessment else {
        return positional(responses);
    };

    let raw = match oracle
        .complete(&prompts::extraction_prompt(assessment, &responses.join("\n")))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "answer extraction failed; using positional answers");
            return positional(responses);
        }
    };

    match Extraction::parse(&raw) {
        Ok(extraction) => {
            let answered = extraction.answered();
            if answered < QUESTION_COUNT {
                return Reconciliation::Pending {
                    remaining: QUESTION_COUNT - answered,
                };
            }
            match extraction.complete_answers() {
                Some(answers) => Reconciliation::Ready {
                    answers,
                    strategy: Strategy::Extraction,
                },
                None => {
                    warn!("extractor reported all answers but returned incomplete ones; using positional answers");
                    positional(responses)
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "extractor output unusable; using positional answers");
            positional(responses)
        }
    }
}

/// Grade five ordered answers. Returns the feedback and whether it is the
/// degraded notice standing in for a failed or empty grading call.
pub async fn grade(
    oracle: &dyn Oracle,
    assessment: Option<&str>,
    answers: &[String],
) -> (String, bool) {
    match oracle
        .complete(&prompts::grading_prompt(assessment, answers))
        .await
    {
        Ok(feedback) if !feedback.trim().is_empty() => (feedback, false),
        Ok(_) => {
            warn!("grading returned empty feedback; storing notice");
            (prompts::GRADING_DEGRADED_NOTICE.to_string(), true)
        }
        Err(e) => {
            warn!(error = %e, "grading failed; storing notice");
            (prompts::GRADING_DEGRADED_NOTICE.to_string(), true)
        }
    }
}

/// Handle a user message received while answers are being collected.
///
/// The user's message must already be in `transcript`.
pub async fn answer_turn(
    ctx: &TurnContext<'_>,
    transcript: &Transcript,
    start_index: usize,
    assessment: Option<&str>,
) -> Result<TurnReply, TurnError> {
    let responses = transcript.user_messages_after(start_index);

    match reconcile(ctx.oracle, assessment, &responses).await {
        Reconciliation::Pending { remaining } => {
            ctx.reply(Role::System, &prompts::remaining_questions(remaining))
                .await
        }
        Reconciliation::Ready { answers, strategy } => {
            let (feedback, degraded) = grade(ctx.oracle, assessment, &answers).await;
            let mut reply = ctx.reply(Role::Chatbot, &feedback).await?;
            ctx.append(Role::System, Marker::AssessmentCompleted.as_str())
                .await?;
            info!(
                conversation_id = ctx.conversation_id,
                ?strategy,
                degraded,
                "assessment graded"
            );
            reply.degraded = degraded;
            Ok(reply)
        }
    }
}
