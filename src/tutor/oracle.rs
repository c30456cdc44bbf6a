use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OracleSettings;
use crate::errors::OracleError;

/// Stateless text completion: one prompt in, one text out.
///
/// Every call is attempted exactly once; there are no retries and no timeout.
/// Real implementation: `OpenAiOracle`. Test double: `testing::ScriptedOracle`.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
}

impl OpenAiOracle {
    /// Build a client, reading the API key from the configured variable.
    /// A missing key is reported per call, not here, so the server can still
    /// start and serve history.
    pub fn new(settings: &OracleSettings) -> Self {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self {
            client: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| OracleError::MissingApiKey {
                var: self.api_key_env.clone(),
            })?;

        debug!(
            model = %self.model,
            prompt = %prompt.chars().take(200).collect::<String>(),
            "sending completion request"
        );

        let body = CompletionRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::Decode(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(OracleError::EmptyResponse)?
            .message
            .content
            .unwrap_or_default();
        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}
