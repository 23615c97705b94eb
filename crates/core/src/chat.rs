//! Chat provider trait — the abstraction over the LLM endpoint.
//!
//! The Planner and Responder call `complete()` without knowing which backend
//! answers; tests swap in scripted mock providers.

use crate::catalog::ToolDescriptor;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message sent to the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A completion request. Model, temperature and token limits live on the
/// provider itself; the request carries only what varies per call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,

    /// Tool descriptors for the structured-tool channel. `None` omits the
    /// `tools` key from the request body entirely.
    pub tools: Option<Vec<ToolDescriptor>>,
}

impl ChatRequest {
    pub fn text_only(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: None,
        }
    }
}

/// A structured tool call returned through the provider's function channel.
/// `arguments` is the raw JSON string, as the OpenAI wire format carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// What came back from one completion: text content, structured tool calls,
/// or both.
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_calls: Vec<ChatToolCall>,
}

/// The provider seam. Implementations: the OpenAI-compatible HTTP client,
/// and scripted mocks in tests.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    ///
    /// Transport failures are retried once internally; a second failure
    /// surfaces as `ProviderError::RetriesExhausted` and is fatal for the
    /// calling run.
    async fn complete(&self, request: ChatRequest) -> Result<ChatOutcome, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("x").role, ChatRole::System);
        assert_eq!(ChatMessage::user("x").role, ChatRole::User);
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"user\""));
    }
}
