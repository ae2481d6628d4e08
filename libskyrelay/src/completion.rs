//! Text-completion API client
//!
//! Talks to an OpenAI-compatible `/completions` endpoint. Only the fields the
//! reply flow needs are modelled.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::CompletionError;

pub type CompletionResult<T> = std::result::Result<T, CompletionError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    organization: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl CompletionClient {
    /// Create a client from the `[completion]` settings and the caller's key
    pub fn new(
        config: &CompletionConfig,
        api_key: SecretString,
        organization: Option<String>,
        timeout: Duration,
    ) -> CompletionResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("skyrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            organization: organization.filter(|org| !org.is_empty()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Request a completion of `prompt`
    ///
    /// Returns every choice the API produced. An empty choice list is an
    /// error since there is nothing to reply with.
    pub async fn complete(&self, model: &str, prompt: &str) -> CompletionResult<Vec<CompletionChoice>> {
        let request = CompletionRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CompletionError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Network(format!("{}: {}", url, e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|e| CompletionError::Decode(e.to_string()))?;

        if parsed.choices.is_empty() {
            return Err(CompletionError::Empty);
        }

        tracing::debug!(model, choices = parsed.choices.len(), "Completion received");
        Ok(parsed.choices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, org: Option<&str>) -> CompletionClient {
        let config = CompletionConfig {
            base_url: format!("{}/v1", server.uri()),
            ..Default::default()
        };
        CompletionClient::new(
            &config,
            SecretString::from("sk-test".to_string()),
            org.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_sends_request_and_returns_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(header("OpenAI-Organization", "org-123"))
            .and(body_json(json!({
                "model": "text-davinci-003",
                "prompt": "Say hi",
                "temperature": 0.5,
                "max_tokens": 40
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cmpl-1",
                "object": "text_completion",
                "choices": [
                    {"text": "\n\nHi there!", "index": 0, "finish_reason": "stop"},
                    {"text": "Hello.", "index": 1, "finish_reason": "length"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let choices = client_for(&server, Some("org-123"))
            .complete("text-davinci-003", "Say hi")
            .await
            .unwrap();

        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].text, "\n\nHi there!");
        assert_eq!(choices[1].finish_reason.as_deref(), Some("length"));
    }

    #[tokio::test]
    async fn test_api_error_message_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let result = client_for(&server, None).complete("m", "p").await;
        match result {
            Err(CompletionError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let result = client_for(&server, None).complete("m", "p").await;
        assert!(matches!(result, Err(CompletionError::Empty)));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = client_for(&server, None).complete("m", "p").await;
        assert!(matches!(result, Err(CompletionError::Decode(_))));
    }
}
