//! Shared types used across the tradedesk runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Dispatch state machine
// ---------------------------------------------------------------------------

/// Phases a conversation turn transitions through while dispatching a tool
/// call. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Waiting for the model to propose a tool call.
    AwaitingModelIntent,
    /// Validating the proposed call against the registry.
    Resolving,
    /// Applying the authorization policy.
    Authorizing,
    /// The external call is in flight.
    Executing,
    /// The call finished and produced a success payload.
    Completed,
    /// The turn ended with a failure descriptor.
    Failed,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingModelIntent => write!(f, "awaiting_model_intent"),
            Self::Resolving => write!(f, "resolving"),
            Self::Authorizing => write!(f, "authorizing"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat types
// ---------------------------------------------------------------------------

/// A chat message in the multi-turn conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call proposed by the model. Both the name and the argument
/// mapping are untrusted until they pass through the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallIntent {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Response from the model including potential tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallIntent>,
    pub usage: TokenUsage,
}

/// Token usage from a model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Invocation results
// ---------------------------------------------------------------------------

/// Outcome of executing (or failing to execute) a tool call. Fed back to
/// the model as structured text; never persisted beyond the current turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub tool: String,
    pub success: bool,
    pub payload: serde_json::Value,
}

impl InvocationResult {
    /// A success result carrying a tool-specific payload.
    pub fn success(tool: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { tool: tool.into(), success: true, payload }
    }

    /// A failure result carrying a kind tag and a human-readable message.
    pub fn failure(
        tool: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            payload: serde_json::json!({
                "kind": kind.into(),
                "message": message.into(),
            }),
        }
    }

    /// The failure kind tag, if this is a failure result.
    pub fn failure_kind(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            self.payload.get("kind").and_then(|k| k.as_str())
        }
    }

    /// Render the result as the structured text handed back to the model.
    pub fn to_model_text(&self) -> String {
        let envelope = serde_json::json!({
            "tool": self.tool,
            "result": if self.success { "success" } else { "failed" },
            "payload": self.payload,
        });
        envelope.to_string()
    }
}

// ---------------------------------------------------------------------------
// Turn records
// ---------------------------------------------------------------------------

/// Summary of one dispatched tool round within a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub phase: TurnPhase,
    pub intent: ToolCallIntent,
    pub result: InvocationResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_result_carries_kind_and_message() {
        let result = InvocationResult::failure("place_order", "session_error", "timed out");
        assert!(!result.success);
        assert_eq!(result.failure_kind(), Some("session_error"));
        assert_eq!(result.payload["message"], "timed out");
    }

    #[test]
    fn success_result_has_no_failure_kind() {
        let result = InvocationResult::success("get_quote", json!({"last": 150.0}));
        assert!(result.success);
        assert_eq!(result.failure_kind(), None);
    }

    #[test]
    fn model_text_envelope_is_parseable_json() {
        let result = InvocationResult::success("get_quote", json!({"last": 150.0}));
        let text = result.to_model_text();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["tool"], "get_quote");
        assert_eq!(parsed["result"], "success");
        assert_eq!(parsed["payload"]["last"], 150.0);
    }
}
