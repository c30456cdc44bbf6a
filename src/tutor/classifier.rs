use tracing::{debug, warn};

use super::oracle::Oracle;
use super::prompts;

/// Ask the oracle whether `message` is in scope for a study session.
///
/// Fails closed: an oracle error or any answer other than a bare `yes`
/// counts as off-topic. Never returns an error.
pub async fn classify_topic(oracle: &dyn Oracle, message: &str) -> bool {
    match oracle.complete(&prompts::topic_prompt(message)).await {
        Ok(answer) => {
            let on_topic = is_yes(&answer);
            debug!(on_topic, answer = %answer.trim(), "topic classified");
            on_topic
        }
        Err(e) => {
            warn!(error = %e, "topic classification failed; treating message as off-topic");
            false
        }
    }
}

pub(crate) fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

fn is_yes(answer: &str) -> bool {
    normalize(answer) == "yes"
}
