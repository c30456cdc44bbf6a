use tracing::info;

use super::classifier::normalize;
use super::engine::TurnContext;
use super::markers::Marker;
use super::models::{Role, TurnReply};
use super::phase::Transcript;
use super::prompts;
use crate::errors::TurnError;

/// Outcome of probing a free-chat message for assessment readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Supplementary material was stored and is the reply.
    NotReady(TurnReply),
    /// A question block and the answer boundary were stored; the block is the reply.
    Ready(TurnReply),
    /// The oracle said neither yes nor no; the caller falls through to chat.
    NotApplicable,
}

/// Ask whether the student wants to self-assess and act on the answer.
///
/// Oracle failures here end the turn with an error; nothing is retried.
pub async fn probe(
    ctx: &TurnContext<'_>,
    latest_user_message: &str,
    transcript: &Transcript,
    transcript_limit: usize,
) -> Result<Decision, TurnError> {
    let intent = ctx
        .oracle
        .complete(&prompts::readiness_prompt(latest_user_message))
        .await?;

    match normalize(&intent).as_str() {
        "no" => {
            let history = transcript.render(transcript_limit);
            let material = ctx
                .oracle
                .complete(&prompts::more_material_prompt(&history))
                .await?;
            let reply = ctx.reply(Role::System, &material).await?;
            ctx.append(Role::System, prompts::STUDY_NUDGE).await?;
            info!(conversation_id = ctx.conversation_id, "student not ready; sent more material");
            Ok(Decision::NotReady(reply))
        }
        "yes" => {
            let history = transcript.render(transcript_limit);
            let block = ctx
                .oracle
                .complete(&prompts::question_prompt(&history))
                .await?;
            let reply = ctx.reply(Role::System, &with_heading(&block)).await?;
            ctx.append(Role::System, Marker::AssessmentStarted.as_str())
                .await?;
            ctx.append(Role::System, Marker::AnswerBoundary.as_str())
                .await?;
            info!(conversation_id = ctx.conversation_id, "assessment generated; collecting answers");
            Ok(Decision::Ready(reply))
        }
        _ => Ok(Decision::NotApplicable),
    }
}

/// The stored block must carry the heading or later turns cannot find it.
fn with_heading(block: &str) -> String {
    let heading = Marker::AssessmentHeading.as_str();
    if block.contains(heading) {
        block.to_string()
    } else {
        format!("{}\n{}", heading, block.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor::db::MessageLog;
    use crate::tutor::models::Page;
    use crate::tutor::phase::PhaseState;
    use crate::tutor::testing::*;

    async fn transcript_of(log: &dyn MessageLog, id: i64) -> Transcript {
        Transcript::new(log.list_messages(id, Page::all()).await.unwrap())
    }

    #[tokio::test]
    async fn test_not_ready_sends_material_then_nudge() {
        let (log, id) = store_with_conversation();
        log.append_message(id, Role::User, "I'm not sure yet").await.unwrap();
        let oracle = ScriptedOracle::new()
            .on(READINESS, "No")
            .on(MATERIAL, "Vectors have magnitude and direction.");
        let ctx = TurnContext::new(&log, &oracle, id);
        let transcript = transcript_of(&log, id).await;

        let decision = probe(&ctx, "I'm not sure yet", &transcript, 100).await.unwrap();
        let reply = match decision {
            Decision::NotReady(reply) => reply,
            other => panic!("Expected NotReady, got {:?}", other),
        };
        assert_eq!(reply.content, "Vectors have magnitude and direction.");
        assert_eq!(reply.role, Role::System);

        let stored = contents(&log, id).await;
        assert_eq!(
            &stored[1..],
            &[
                "Vectors have magnitude and direction.".to_string(),
                prompts::STUDY_NUDGE.to_string()
            ]
        );
        let material_prompt = oracle
            .calls()
            .into_iter()
            .find(|p| p.contains(MATERIAL))
            .unwrap();
        assert!(material_prompt.contains("user: I'm not sure yet"));
    }

    #[tokio::test]
    async fn test_ready_stores_block_flag_and_boundary() {
        let (log, id) = store_with_conversation();
        log.append_message(id, Role::User, "quiz me").await.unwrap();
        let oracle = ScriptedOracle::new()
            .on(READINESS, "yes")
            .on(QUESTIONS, QUESTION_BLOCK);
        let ctx = TurnContext::new(&log, &oracle, id);
        let transcript = transcript_of(&log, id).await;

        let decision = probe(&ctx, "quiz me", &transcript, 100).await.unwrap();
        assert_eq!(
            decision,
            Decision::Ready(TurnReply::new(Role::System, QUESTION_BLOCK))
        );

        let stored = contents(&log, id).await;
        assert_eq!(
            &stored[1..],
            &[
                QUESTION_BLOCK.to_string(),
                "-ASSESSMENT_STARTED-".to_string(),
                "Please answer these questions one by one.".to_string()
            ]
        );
        let phase = transcript_of(&log, id).await.phase();
        assert!(matches!(phase, PhaseState::InProgress { start_index: 3, .. }));
    }

    #[tokio::test]
    async fn test_ready_adds_missing_heading() {
        let (log, id) = store_with_conversation();
        let oracle = ScriptedOracle::new()
            .on(READINESS, "yes")
            .on(QUESTIONS, "Question 1: a\nQuestion 2: b");
        let ctx = TurnContext::new(&log, &oracle, id);

        let decision = probe(&ctx, "quiz me", &Transcript::default(), 100).await.unwrap();
        match decision {
            Decision::Ready(reply) => {
                assert!(reply.content.starts_with("-Self assessment-\nQuestion 1: a"))
            }
            other => panic!("Expected Ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_answer_is_not_applicable() {
        let (log, id) = store_with_conversation();
        let oracle = ScriptedOracle::new().on(READINESS, "maybe");
        let ctx = TurnContext::new(&log, &oracle, id);

        let decision = probe(&ctx, "hmm", &Transcript::default(), 100).await.unwrap();
        assert_eq!(decision, Decision::NotApplicable);
        assert!(contents(&log, id).await.is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_is_terminal() {
        let (log, id) = store_with_conversation();
        let oracle = ScriptedOracle::new().fail_on(READINESS);
        let ctx = TurnContext::new(&log, &oracle, id);

        let err = probe(&ctx, "quiz me", &Transcript::default(), 100).await.unwrap_err();
        assert!(matches!(err, TurnError::OracleUnavailable(_)));
        assert_eq!(oracle.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_question_generation_failure_stores_nothing() {
        let (log, id) = store_with_conversation();
        let oracle = ScriptedOracle::new().on(READINESS, "yes").fail_on(QUESTIONS);
        let ctx = TurnContext::new(&log, &oracle, id);

        let err = probe(&ctx, "quiz me", &Transcript::default(), 100).await.unwrap_err();
        assert!(matches!(err, TurnError::OracleUnavailable(_)));
        assert!(contents(&log, id).await.is_empty());
    }
}
