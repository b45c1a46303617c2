use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tablevoice_core::config::LlmConfig;
use tablevoice_core::errors::ApplicationError;

use crate::tools::ToolSpec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One chat-completions message, in the OpenAI-compatible wire shape that
/// OpenRouter accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    /// The assistant turn that requested a tool call; must be echoed back to
    /// the model before its matching tool result.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(vec![WireToolCall {
                id: id.into(),
                kind: "function".to_string(),
                function: WireFunctionCall { name: name.into(), arguments: arguments.to_string() },
            }]),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, result: &Value) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(result.to_string()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

/// What the model decided to do with its turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmTurn {
    Say(String),
    CallTool { id: String, name: String, arguments: Value },
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmTurn, ApplicationError>;
}

/// Chat-completions client for OpenRouter (or any OpenAI-compatible
/// endpoint via `llm.base_url`).
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl OpenRouterClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ApplicationError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ApplicationError::Configuration("llm.api_key is not configured".to_string())
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                ApplicationError::Configuration(format!("could not build http client: {error}"))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let tools: Vec<Value> = tools
            .iter()
            .map(|spec| {
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmTurn, ApplicationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(messages, tools))
            .send()
            .await
            .map_err(|error| ApplicationError::Integration(format!("llm request failed: {error}")))?
            .error_for_status()
            .map_err(|error| {
                ApplicationError::Integration(format!("llm returned an error status: {error}"))
            })?;

        let completion: ChatCompletionResponse = response.json().await.map_err(|error| {
            ApplicationError::Integration(format!("llm response was not valid json: {error}"))
        })?;
        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ApplicationError::Integration("llm returned no choices".to_string()))?;

        if let Some(call) = message.tool_calls.and_then(|calls| calls.into_iter().next()) {
            // Malformed argument JSON is handled downstream by the tool
            // registry, which turns it into an error status for the model.
            let arguments =
                serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
            return Ok(LlmTurn::CallTool { id: call.id, name: call.function.name, arguments });
        }

        match message.content {
            Some(content) if !content.trim().is_empty() => Ok(LlmTurn::Say(content)),
            _ => Err(ApplicationError::Integration(
                "llm returned neither content nor a tool call".to_string(),
            )),
        }
    }
}

/// Deterministic stand-in used by runtime and server tests: replays a fixed
/// sequence of turns instead of calling a model.
#[derive(Default)]
pub struct ScriptedLlm {
    turns: Mutex<VecDeque<LlmTurn>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<LlmTurn>) -> Self {
        Self { turns: Mutex::new(turns.into()) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<LlmTurn, ApplicationError> {
        self.turns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| ApplicationError::Integration("script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use tablevoice_core::errors::ApplicationError;

    use super::{ChatMessage, LlmClient, LlmTurn, ScriptedLlm};

    #[test]
    fn plain_messages_omit_tool_fields() {
        let message = serde_json::to_value(ChatMessage::user("hello")).expect("serializes");
        assert_eq!(message, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn tool_exchange_round_trips_ids() {
        let arguments = json!({"date": "2999-06-01"});
        let call = serde_json::to_value(ChatMessage::tool_call("call_1", "book_table", &arguments))
            .expect("serializes");
        assert_eq!(call["role"], "assistant");
        assert_eq!(call["tool_calls"][0]["id"], "call_1");
        assert_eq!(call["tool_calls"][0]["type"], "function");
        assert_eq!(call["tool_calls"][0]["function"]["name"], "book_table");

        let result = serde_json::to_value(ChatMessage::tool_result("call_1", &json!({"status": "confirmed"})))
            .expect("serializes");
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn scripted_llm_replays_turns_in_order() {
        let script = ScriptedLlm::new(vec![
            LlmTurn::Say("first".to_string()),
            LlmTurn::Say("second".to_string()),
        ]);

        let first = script.chat(&[], &[]).await.expect("first turn");
        assert_eq!(first, LlmTurn::Say("first".to_string()));
        let second = script.chat(&[], &[]).await.expect("second turn");
        assert_eq!(second, LlmTurn::Say("second".to_string()));

        let exhausted = script.chat(&[], &[]).await.expect_err("script is exhausted");
        assert!(matches!(exhausted, ApplicationError::Integration(_)));
    }
}
