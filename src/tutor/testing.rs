//! Test doubles shared by the dialogue unit tests.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::db::{DbHandle, MessageLog, TutorDb};
use super::models::{Message, Page, Role};
use super::oracle::Oracle;
use crate::errors::OracleError;

/// Oracle that answers from a substring-keyed script and records every prompt.
///
/// Rules are checked in insertion order; the first whose needle occurs in the
/// prompt wins. Unmatched prompts get the default reply.
pub struct ScriptedOracle {
    rules: Vec<(String, Result<String, String>)>,
    default_reply: String,
    calls: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: "Here is an explanation.".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), Ok(reply.to_string())));
        self
    }

    pub fn fail_on(mut self, needle: &str) -> Self {
        self.rules
            .push((needle.to_string(), Err(format!("scripted failure for '{}'", needle))));
        self
    }

    pub fn with_default(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.calls.lock().unwrap().push(prompt.to_string());
        for (needle, reply) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return reply.clone().map_err(OracleError::Transport);
            }
        }
        Ok(self.default_reply.clone())
    }
}

/// Log whose appends always fail; reads see an empty conversation.
pub struct FailingLog;

#[async_trait]
impl MessageLog for FailingLog {
    async fn append_message(&self, conversation_id: i64, _role: Role, _content: &str) -> Result<Message> {
        anyhow::bail!("append to conversation {} rejected", conversation_id)
    }

    async fn list_messages(&self, _conversation_id: i64, _page: Page) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }
}

// Needles matching the fixed prompt openings in `prompts`.
pub const TOPIC: &str = "relates to STEM education";
pub const READINESS: &str = "indicate readiness for a self-assessment";
pub const MATERIAL: &str = "This student is not ready";
pub const QUESTIONS: &str = "generate 5 self-assessment questions";
pub const EXTRACTION: &str = "You are a strict grader";
pub const GRADING: &str = "Provide feedback on the student's 5 answers";

pub const QUESTION_BLOCK: &str = "-Self assessment-\n\
Question 1: What is a vector?\n\
Question 2: What is a scalar?\n\
Question 3: Define velocity.\n\
Question 4: Define acceleration.\n\
Question 5: State Newton's second law.";

/// In-memory store with one conversation; returns the handle and its id.
pub fn store_with_conversation() -> (DbHandle, i64) {
    let db = TutorDb::new_in_memory().unwrap();
    let convo = db.create_conversation("student-1", "Physics").unwrap();
    (DbHandle::new(db), convo.id)
}

/// Append an answer-collection window: question block, start flag, boundary.
pub async fn seed_assessment(log: &dyn MessageLog, conversation_id: i64) {
    for content in [
        QUESTION_BLOCK,
        "-ASSESSMENT_STARTED-",
        "Please answer these questions one by one.",
    ] {
        log.append_message(conversation_id, Role::System, content)
            .await
            .unwrap();
    }
}

pub async fn contents(log: &dyn MessageLog, conversation_id: i64) -> Vec<String> {
    log.list_messages(conversation_id, Page::all())
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect()
}
