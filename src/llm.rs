// coordinator-agent: Chat and embedding backend

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// One chat message in an OpenAI-compatible conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Language model backend seam.
///
/// The coordinator only needs two operations, both called at temperature 0 so
/// runs are reproducible. Tests substitute a scripted implementation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a chat completion and return the assistant message content.
    async fn chat(&self, messages: &[ChatMessage]) -> CoordinatorResult<String>;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> CoordinatorResult<Vec<Vec<f32>>>;
}

/// LM Studio client speaking the OpenAI-compatible HTTP API.
pub struct LmStudioClient {
    client: reqwest::Client,
    chat_url: String,
    embed_url: String,
    chat_model: String,
    embed_model: String,
}

impl LmStudioClient {
    pub fn new(config: &CoordinatorConfig) -> CoordinatorResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoordinatorError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            chat_url: config.chat_url(),
            embed_url: config.embed_url(),
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for LmStudioClient {
    async fn chat(&self, messages: &[ChatMessage]) -> CoordinatorResult<String> {
        let payload = json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": 0,
        });

        debug!(url = %self.chat_url, model = %self.chat_model, "Sending chat completion request");

        let response = self
            .client
            .post(&self.chat_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoordinatorError::Upstream(format!("chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoordinatorError::Upstream(format!(
                "chat endpoint returned HTTP {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Upstream(format!("chat response not JSON: {}", e)))?;

        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CoordinatorError::Upstream("chat response missing message content".to_string())
            })
    }

    async fn embed(&self, texts: &[String]) -> CoordinatorResult<Vec<Vec<f32>>> {
        let payload = json!({
            "model": self.embed_model,
            "input": texts,
        });

        debug!(url = %self.embed_url, count = texts.len(), "Sending embedding request");

        let response = self
            .client
            .post(&self.embed_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoordinatorError::Upstream(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoordinatorError::Upstream(format!(
                "embedding endpoint returned HTTP {}",
                status
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            CoordinatorError::Upstream(format!("embedding response not JSON: {}", e))
        })?;

        parse_embeddings(&body)
    }
}

/// LM Studio and OpenAI disagree on the embedding response shape; accept both
/// `{"data": [{"embedding": [..]}, ..]}` and a bare `{"embedding": [..]}`.
fn parse_embeddings(body: &Value) -> CoordinatorResult<Vec<Vec<f32>>> {
    if let Some(data) = body.get("data").and_then(Value::as_array) {
        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            vectors.push(parse_vector(item.get("embedding").unwrap_or(&Value::Null))?);
        }
        return Ok(vectors);
    }

    if let Some(embedding) = body.get("embedding") {
        return Ok(vec![parse_vector(embedding)?]);
    }

    Err(CoordinatorError::Upstream(format!(
        "no embedding in response: keys={:?}",
        body.as_object()
            .map(|o| o.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default()
    )))
}

fn parse_vector(value: &Value) -> CoordinatorResult<Vec<f32>> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_f64)
                .map(|f| f as f32)
                .collect()
        })
        .ok_or_else(|| CoordinatorError::Upstream("embedding vector is not an array".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> CoordinatorConfig {
        CoordinatorConfig {
            lmstudio_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_chat_returns_message_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"pickids\":[]}"}}]
            })))
            .mount(&mock_server)
            .await;

        let client = LmStudioClient::new(&test_config(&mock_server.uri())).unwrap();
        let content = client
            .chat(&[ChatMessage::user("hello")])
            .await
            .unwrap();
        assert_eq!(content, "{\"pickids\":[]}");
    }

    #[tokio::test]
    async fn test_chat_http_error_is_upstream() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = LmStudioClient::new(&test_config(&mock_server.uri())).unwrap();
        let err = client.chat(&[ChatMessage::user("hello")]).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_embed_handles_openai_shape() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&mock_server)
            .await;

        let client = LmStudioClient::new(&test_config(&mock_server.uri())).unwrap();
        let vectors = client.embed(&["query".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].len(), 3);
    }

    #[test]
    fn test_parse_embeddings_bare_shape() {
        let vectors = parse_embeddings(&json!({"embedding": [1.0, 2.0]})).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 2.0]]);
    }
}
