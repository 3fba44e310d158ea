//! System prompt builder for the conversation loop.

use crate::config::TradedeskConfig;
use tracing::debug;

/// Standing instructions for the assistant role.
const ROLE: &str = r#"
You are a financial assistant that executes trading commands and retrieves
market data through a fixed set of tools.

Rules:
- Use only the provided tools, with exactly the parameters they declare.
  Never invent tool names, never add extra fields.
- Issue at most one tool call per user request, then narrate the result.
- If a tool call fails, explain what went wrong in plain language and, if
  the request was ambiguous, ask a clarifying question instead of guessing.
- If an order outcome is reported as uncertain, tell the user to verify the
  order status manually before anything is retried.
- Never fabricate prices, positions, or order confirmations. Only report
  what a tool returned.
"#;

/// Build the complete system prompt for a model call.
pub fn build_system_prompt(config: &TradedeskConfig, session_degraded: bool) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(ROLE);

    prompt.push_str("\n# Session\n\n");
    prompt.push_str(&format!(
        "- Brokerage gateway: {}:{} (client id {})\n",
        config.gateway_host, config.gateway_port, config.client_id,
    ));
    if session_degraded {
        prompt.push_str(
            "- The session has seen a connection failure. Treat brokerage \
             results with caution and tell the user if an action fails.\n",
        );
    } else {
        prompt.push_str("- The session is connected.\n");
    }

    prompt.push_str("\n# Order limits\n\n");
    prompt.push_str(&format!(
        "- Maximum order quantity: {}\n",
        config.max_order_quantity
    ));
    prompt.push_str(&format!(
        "- Maximum order notional: {} USD\n",
        config.max_order_notional_usd
    ));
    if config.confirm_notional_usd > 0.0 {
        prompt.push_str(&format!(
            "- Orders above {} USD notional require the user's interactive confirmation.\n",
            config.confirm_notional_usd
        ));
    }

    debug!("System prompt: {} chars", prompt.len());
    prompt
}
