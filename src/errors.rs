//! Typed error hierarchy for the tutoring service.
//!
//! Two top-level enums cover the two boundaries the core talks across:
//! - `OracleError` — a single call to the text-completion service failed
//! - `TurnError` — a user turn could not be completed
//!
//! Malformed oracle output from the answer extractor is not here: it is
//! recovered inside the reconciler and never leaves it.

use thiserror::Error;

/// Errors from one call to the text-completion oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle API key is not set (expected in ${var})")]
    MissingApiKey { var: String },

    #[error("Failed to reach oracle: {0}")]
    Transport(String),

    #[error("Oracle returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle response had no choices")]
    EmptyResponse,

    #[error("Failed to decode oracle response: {0}")]
    Decode(String),
}

/// Errors that end a user turn without a reply.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conversation {id} not found")]
    ConversationNotFound { id: i64 },

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(#[from] OracleError),

    #[error("Message log failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl TurnError {
    /// Wrap a store failure. Kept explicit instead of `From<anyhow::Error>` so an
    /// oracle failure can never be misfiled as a persistence one.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_error_status_carries_code_and_body() {
        let err = OracleError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        match &err {
            OracleError::Status { status, body } => {
                assert_eq!(*status, 429);
                assert_eq!(body, "rate limited");
            }
            _ => panic!("Expected Status"),
        }
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn missing_api_key_names_the_variable() {
        let err = OracleError::MissingApiKey {
            var: "OPENAI_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn turn_error_converts_from_oracle_error() {
        let inner = OracleError::Transport("connection refused".to_string());
        let turn_err: TurnError = inner.into();
        match &turn_err {
            TurnError::OracleUnavailable(OracleError::Transport(msg)) => {
                assert_eq!(msg, "connection refused");
            }
            _ => panic!("Expected TurnError::OracleUnavailable(Transport(..))"),
        }
    }

    #[test]
    fn turn_error_persistence_keeps_source() {
        let err = TurnError::persistence(anyhow::anyhow!("disk full"));
        assert!(matches!(err, TurnError::Persistence(_)));
        assert!(err.to_string().contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn conversation_not_found_carries_id() {
        let err = TurnError::ConversationNotFound { id: 42 };
        match &err {
            TurnError::ConversationNotFound { id } => assert_eq!(*id, 42),
            _ => panic!("Expected ConversationNotFound"),
        }
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&OracleError::EmptyResponse);
        assert_std_error(&TurnError::BadRequest("x".into()));
    }
}
