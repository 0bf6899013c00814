use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::Result;

/// System instruction sent with every improvement request
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that improves transcripts by adding proper punctuation and formatting, and correcting obvious errors.";

/// Build the user message for a transcript
pub fn user_prompt(transcript: &str) -> String {
    format!(
        "Please improve this transcript by adding proper punctuation and formatting:\n\n{}",
        transcript
    )
}

/// What to do when the completion service fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementPolicy {
    /// Propagate failures to the caller
    #[default]
    Strict,
    /// Fall back to the unimproved transcript
    Lenient,
}

impl std::str::FromStr for ImprovementPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ImprovementPolicy::Strict),
            "lenient" => Ok(ImprovementPolicy::Lenient),
            other => anyhow::bail!("Unknown improvement policy '{}' (expected strict or lenient)", other),
        }
    }
}

impl std::fmt::Display for ImprovementPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImprovementPolicy::Strict => write!(f, "strict"),
            ImprovementPolicy::Lenient => write!(f, "lenient"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ImproveError {
    #[error("rate limited by completion service")]
    RateLimited,

    #[error("{0}")]
    Failed(String),
}

/// Text-completion service used to polish transcripts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextImprover: Send + Sync {
    async fn improve(&self, system: &str, user: &str) -> std::result::Result<String, ImproveError>;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiImprover {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiImprover {
    pub fn new(api_base: &str, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build completion service client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl TextImprover for OpenAiImprover {
    async fn improve(&self, system: &str, user: &str) -> std::result::Result<String, ImproveError> {
        tracing::debug!("Requesting completion from {} with model {}", self.endpoint, self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }))
            .send()
            .await
            .map_err(|e| ImproveError::Failed(format!("Request to completion service failed: {}", e.without_url())))?;

        let status = response.status().as_u16();
        // Error pages are not always JSON
        let body: Value = response.json().await.unwrap_or(Value::Null);

        parse_completion(status, &body)
    }
}

/// Turn a chat completions response into text or a classified failure
pub(crate) fn parse_completion(status: u16, body: &Value) -> std::result::Result<String, ImproveError> {
    if status == 429 {
        return Err(ImproveError::RateLimited);
    }

    if !(200..300).contains(&status) {
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or("no details provided");
        return Err(ImproveError::Failed(format!(
            "Completion service returned HTTP {}: {}",
            status, message
        )));
    }

    body["choices"][0]["message"]["content"]
        .as_str()
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ImproveError::Failed("Completion response contained no text".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_completion_success() {
        let body = json!({ "choices": [ { "message": { "role": "assistant", "content": " Hello, world. " } } ] });
        assert_eq!(parse_completion(200, &body), Ok("Hello, world.".to_string()));
    }

    #[test]
    fn test_parse_completion_rate_limited() {
        let body = json!({ "error": { "message": "Rate limit reached", "type": "requests" } });
        assert_eq!(parse_completion(429, &body), Err(ImproveError::RateLimited));
    }

    #[test]
    fn test_parse_completion_error_message() {
        let body = json!({ "error": { "message": "Incorrect API key provided" } });
        assert_eq!(
            parse_completion(401, &body),
            Err(ImproveError::Failed(
                "Completion service returned HTTP 401: Incorrect API key provided".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_completion_missing_content() {
        assert!(matches!(parse_completion(200, &json!({ "choices": [] })), Err(ImproveError::Failed(_))));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Strict".parse::<ImprovementPolicy>().unwrap(), ImprovementPolicy::Strict);
        assert_eq!("lenient".parse::<ImprovementPolicy>().unwrap(), ImprovementPolicy::Lenient);
        assert!("maybe".parse::<ImprovementPolicy>().is_err());
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let improver = OpenAiImprover::new(
            "https://api.example.test/v1/",
            "key".to_string(),
            "gpt-4".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(improver.endpoint, "https://api.example.test/v1/chat/completions");
    }
}
