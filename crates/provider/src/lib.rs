//! OpenAI-compatible Chat Completions client.
//!
//! Works with vLLM, OpenAI, Ollama, and any endpoint exposing
//! `/chat/completions`. Non-streaming only. The client owns the model,
//! temperature and token limit; each call supplies messages and, optionally,
//! the tool catalogue for the structured-tool channel.
//!
//! Transport failures (network errors, non-200 statuses, malformed
//! envelopes) are retried once with the identical payload; a second failure
//! surfaces as `ProviderError::RetriesExhausted` and is fatal for the run.

use async_trait::async_trait;
use opsloop_core::{
    ChatOutcome, ChatProvider, ChatRequest, ChatToolCall, ProviderError, ToolDescriptor,
};
use serde::Deserialize;
use tracing::{debug, warn};

/// HTTP client for one OpenAI-compatible endpoint.
pub struct ChatClient {
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.unwrap_or_else(|| "dummy".into()),
            temperature,
            max_tokens,
            client,
        }
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": &request.messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        // `tools` is omitted entirely when no catalogue is passed
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(to_api_tools(tools));
            }
        }

        body
    }

    async fn complete_once(&self, body: &serde_json::Value) -> Result<ChatOutcome, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Endpoint returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedEnvelope(format!(
                    "failed to parse response: {e}"
                )))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedEnvelope("no choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ChatToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatOutcome {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[async_trait]
impl ChatProvider for ChatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatOutcome, ProviderError> {
        let body = self.build_body(&request);

        debug!(model = %self.model, messages = request.messages.len(), "Sending completion request");

        match self.complete_once(&body).await {
            Ok(outcome) => Ok(outcome),
            Err(first) => {
                warn!(error = %first, "LLM call failed, retrying once");
                match self.complete_once(&body).await {
                    Ok(outcome) => Ok(outcome),
                    Err(second) => {
                        let (status_code, body_prefix) = match &second {
                            ProviderError::ApiError {
                                status_code,
                                message,
                            } => (*status_code, clip(message, 200)),
                            other => (0, clip(&other.to_string(), 200)),
                        };
                        Err(ProviderError::RetriesExhausted {
                            status_code,
                            body_prefix,
                        })
                    }
                }
            }
        }
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    #[allow(dead_code)]
    #[serde(default, rename = "type")]
    kind: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    /// Arguments as a JSON-encoded string, per the OpenAI wire shape.
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsloop_core::{catalog, ChatMessage};

    fn client() -> ChatClient {
        ChatClient::new("http://localhost:8000/v1/", "test-model", None, 0.7, 2048)
    }

    #[test]
    fn base_url_is_normalised() {
        let c = client();
        assert_eq!(c.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn body_omits_tools_when_absent() {
        let c = client();
        let body = c.build_body(&ChatRequest::text_only(vec![ChatMessage::user("hi")]));
        assert!(body.get("tools").is_none());
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn body_includes_tool_catalogue() {
        let c = client();
        let body = c.build_body(&ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            tools: Some(catalog()),
        });
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 6);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "list_dir");
        assert!(tools[0]["function"]["parameters"]["properties"].is_object());
    }

    #[test]
    fn parse_text_response() {
        let raw = r#"{
            "model": "test-model",
            "choices": [{"message": {"role": "assistant", "content": "Hello there"}, "finish_reason": "stop"}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Hello there")
        );
        assert!(parsed.choices[0].message.tool_calls.is_none());
    }

    #[test]
    fn parse_structured_tool_calls() {
        let raw = r#"{
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "read_file", "arguments": "{\"path\": \"hello.txt\"}"}
                }]
            }}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let calls = parsed.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "read_file");
        assert_eq!(calls[0].function.arguments, "{\"path\": \"hello.txt\"}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_exhausts_retries() {
        // Port 9 (discard) refuses connections; both attempts fail fast
        let c = ChatClient::new("http://127.0.0.1:9", "m", None, 0.0, 16);
        let err = c
            .complete(ChatRequest::text_only(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RetriesExhausted { .. }));
    }
}
