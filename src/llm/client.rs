//! Model inference over an OpenAI-compatible chat-completions endpoint.
//!
//! Supports tool-use (function calling). Tool calls coming back from the
//! model are untrusted: names and arguments pass through the resolver
//! before anything executes.

use crate::tools::ToolDefinition;
use crate::types::{ChatMessage, ChatRole, ModelReply, TokenUsage, ToolCallIntent};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Client for the model endpoint.
#[derive(Debug, Clone)]
pub struct ModelClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolPayload<'a>>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ToolPayload<'a> {
    r#type: &'a str,
    function: FunctionPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionPayload<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    id: String,
    function: FunctionCallPayload,
}

#[derive(Debug, Deserialize)]
struct FunctionCallPayload {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ModelClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// One chat-completion round. Pass an empty tool slice to force a
    /// plain-text answer.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<ModelReply> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let msg_payloads: Vec<MessagePayload> = messages
            .iter()
            .map(|m| MessagePayload {
                role: match m.role {
                    ChatRole::System => "system".into(),
                    ChatRole::User => "user".into(),
                    ChatRole::Assistant => "assistant".into(),
                    ChatRole::Tool => "tool".into(),
                },
                content: m.content.clone(),
            })
            .collect();

        let tool_payloads: Option<Vec<ToolPayload>> = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ToolPayload {
                        r#type: "function",
                        function: FunctionPayload {
                            name: &t.name,
                            description: &t.description,
                            parameters: &t.parameters,
                        },
                    })
                    .collect(),
            )
        };

        let request = ChatRequest {
            model,
            messages: msg_payloads,
            tools: tool_payloads,
            max_tokens,
            temperature: 0.2,
        };

        debug!("Model request: {} messages, {} tools", messages.len(), tools.len());

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Model request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Model request failed ({}): {}", status, body);
        }

        let body: ChatResponse = resp.json().await.context("Failed to parse model response")?;
        Ok(parse_reply(body))
    }
}

/// Flatten the wire response into a [`ModelReply`]. Argument strings that
/// are not valid JSON become `null`, which the resolver then rejects with
/// a structured error instead of a crash.
fn parse_reply(body: ChatResponse) -> ModelReply {
    let message = body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .unwrap_or(ResponseMessage { content: None, tool_calls: Vec::new() });

    let tool_calls: Vec<ToolCallIntent> = message
        .tool_calls
        .into_iter()
        .map(|tc| {
            let arguments = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                warn!("Unparseable tool arguments for '{}': {}", tc.function.name, e);
                serde_json::Value::Null
            });
            ToolCallIntent {
                id: tc.id,
                name: tc.function.name,
                arguments,
            }
        })
        .collect();

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    ModelReply { content: message.content, tool_calls, usage }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_from(value: serde_json::Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_reply_has_no_tool_calls() {
        let reply = parse_reply(response_from(json!({
            "choices": [{"message": {"content": "AAPL last traded at 150.0."}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
        })));

        assert_eq!(reply.content.as_deref(), Some("AAPL last traded at 150.0."));
        assert!(reply.tool_calls.is_empty());
        assert_eq!(reply.usage.total_tokens, 15);
    }

    #[test]
    fn tool_call_arguments_are_parsed_to_json() {
        let reply = parse_reply(response_from(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "function": {
                        "name": "get_quote",
                        "arguments": "{\"symbol\": \"AAPL\"}",
                    },
                }],
            }}],
        })));

        assert_eq!(reply.tool_calls.len(), 1);
        let call = &reply.tool_calls[0];
        assert_eq!(call.name, "get_quote");
        assert_eq!(call.arguments["symbol"], "AAPL");
    }

    #[test]
    fn malformed_arguments_become_null_not_a_crash() {
        let reply = parse_reply(response_from(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "get_quote", "arguments": "{not json"},
                }],
            }}],
        })));

        assert_eq!(reply.tool_calls[0].arguments, serde_json::Value::Null);
    }

    #[test]
    fn empty_choices_yield_an_empty_reply() {
        let reply = parse_reply(response_from(json!({"choices": []})));
        assert!(reply.content.is_none());
        assert!(reply.tool_calls.is_empty());
    }
}
