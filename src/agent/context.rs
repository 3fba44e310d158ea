//! Message context builder for model calls.

use crate::types::{ChatMessage, ChatRole};

/// Build the message list for a model call: system prompt plus the most
/// recent slice of the conversation history.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    window: usize,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(window + 1);
    messages.push(ChatMessage::system(system_prompt));

    let start = history.len().saturating_sub(window);
    messages.extend_from_slice(&history[start..]);
    messages
}

/// Trim the retained history so it cannot grow without bound. Keeps the
/// most recent `window` messages once it exceeds twice the window.
pub fn trim_history(history: &mut Vec<ChatMessage>, window: usize) {
    if history.len() > window * 2 {
        history.drain(..history.len() - window);
    }
}
