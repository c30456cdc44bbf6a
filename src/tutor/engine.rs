//! Per-turn dispatcher.
//!
//! A turn persists the user's message while the topic classifier runs, then
//! re-derives the phase from the full log and hands off to exactly one
//! branch. Every branch appends exactly one reply-bearing message and returns
//! its content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument};

use super::classifier::classify_topic;
use super::db::MessageLog;
use super::models::{Message, Page, Role, TurnReply};
use super::oracle::Oracle;
use super::phase::{PhaseState, Transcript};
use super::prompts;
use super::readiness::{self, Decision};
use super::reconciler;
use crate::config::DialogueSettings;
use crate::errors::TurnError;

/// Borrowed handles for one conversation during one turn.
pub struct TurnContext<'a> {
    pub log: &'a dyn MessageLog,
    pub oracle: &'a dyn Oracle,
    pub conversation_id: i64,
}

impl<'a> TurnContext<'a> {
    pub fn new(log: &'a dyn MessageLog, oracle: &'a dyn Oracle, conversation_id: i64) -> Self {
        Self {
            log,
            oracle,
            conversation_id,
        }
    }

    pub async fn append(&self, role: Role, content: &str) -> Result<Message, TurnError> {
        self.log
            .append_message(self.conversation_id, role, content)
            .await
            .map_err(TurnError::persistence)
    }

    /// Append the reply-bearing message and echo it back as the turn's reply.
    pub async fn reply(&self, role: Role, content: &str) -> Result<TurnReply, TurnError> {
        let message = self.append(role, content).await?;
        Ok(TurnReply::new(message.role, message.content))
    }
}

type LockMap = Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per conversation so phase transitions are atomic.
///
/// Entries live only while some turn holds or waits on them.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: LockMap,
}

impl ConversationLocks {
    pub async fn acquire(&self, conversation_id: i64) -> ConversationGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(conversation_id).or_default().clone()
        };
        ConversationGuard {
            guard: Some(lock.lock_owned().await),
            conversation_id,
            map: self.inner.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of a turn. Dropping it releases the conversation
/// and removes its map entry once nobody else is waiting.
pub struct ConversationGuard {
    guard: Option<OwnedMutexGuard<()>>,
    conversation_id: i64,
    map: LockMap,
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the entry under this map lock, so the count is stable here.
        drop(self.guard.take());
        let idle = map
            .get(&self.conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            map.remove(&self.conversation_id);
        }
    }
}

/// Runs user turns against a message log and an oracle.
#[derive(Clone)]
pub struct TurnEngine {
    log: Arc<dyn MessageLog>,
    oracle: Arc<dyn Oracle>,
    settings: DialogueSettings,
    locks: ConversationLocks,
}

impl TurnEngine {
    pub fn new(log: Arc<dyn MessageLog>, oracle: Arc<dyn Oracle>, settings: DialogueSettings) -> Self {
        Self {
            log,
            oracle,
            settings,
            locks: ConversationLocks::default(),
        }
    }

    pub fn locks(&self) -> &ConversationLocks {
        &self.locks
    }

    /// Handle one student message and return the single reply for it.
    ///
    /// The caller is responsible for checking that `user_id` owns the
    /// conversation; here it is only required to be present.
    #[instrument(skip(self, message), fields(phase = tracing::field::Empty))]
    pub async fn handle_user_turn(
        &self,
        conversation_id: i64,
        user_id: &str,
        message: &str,
    ) -> Result<TurnReply, TurnError> {
        if user_id.trim().is_empty() {
            return Err(TurnError::BadRequest("userId is required".into()));
        }
        if message.trim().is_empty() {
            return Err(TurnError::BadRequest("message content is required".into()));
        }

        let _guard = self.locks.acquire(conversation_id).await;
        let ctx = TurnContext::new(self.log.as_ref(), self.oracle.as_ref(), conversation_id);

        let (on_topic, stored) = tokio::join!(
            classify_topic(ctx.oracle, message),
            ctx.append(Role::User, message)
        );
        stored?;

        if !on_topic {
            info!(conversation_id, "off-topic message redirected");
            return ctx.reply(Role::System, prompts::OFF_TOPIC_REDIRECT).await;
        }

        let messages = ctx
            .log
            .list_messages(conversation_id, Page::all())
            .await
            .map_err(TurnError::persistence)?;
        let transcript = Transcript::new(messages);
        let phase = transcript.phase();
        tracing::Span::current().record("phase", phase.name());
        debug!(conversation_id, messages = transcript.len(), %phase, "phase derived");

        match phase {
            PhaseState::InProgress {
                start_index,
                assessment_text,
            } => {
                reconciler::answer_turn(&ctx, &transcript, start_index, assessment_text.as_deref())
                    .await
            }
            PhaseState::Completed if !self.settings.allow_reassessment => {
                self.fallback_chat(&ctx, message).await
            }
            PhaseState::FreeChat | PhaseState::Completed => {
                match readiness::probe(&ctx, message, &transcript, self.settings.transcript_limit)
                    .await?
                {
                    Decision::NotReady(reply) | Decision::Ready(reply) => Ok(reply),
                    Decision::NotApplicable => self.fallback_chat(&ctx, message).await,
                }
            }
        }
    }

    /// Plain study chat: answer the raw message, then nudge toward assessment.
    async fn fallback_chat(&self, ctx: &TurnContext<'_>, message: &str) -> Result<TurnReply, TurnError> {
        let answer = ctx.oracle.complete(message).await?;
        let reply = ctx.reply(Role::Chatbot, &answer).await?;
        ctx.append(Role::System, prompts::STUDY_NUDGE).await?;
        Ok(reply)
    }
}
