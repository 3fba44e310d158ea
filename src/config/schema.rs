//! Configuration schema for tradedesk.toml.

use crate::broker::SessionOptions;
use crate::resolve::OrderLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradedeskConfig {
    /// Brokerage gateway host.
    pub gateway_host: String,

    /// Brokerage gateway port.
    pub gateway_port: u16,

    /// Client id the gateway uses to partition sessions.
    pub client_id: u32,

    /// Model identifier for chat completions.
    pub model: String,

    /// Base URL of the OpenAI-compatible model endpoint.
    pub model_base_url: String,

    /// Model API credential. Overridable via TRADEDESK_MODEL_API_KEY.
    pub model_api_key: String,

    /// Maximum completion tokens per model call.
    pub max_tokens_per_turn: u32,

    /// Deadline in seconds for a mutating gateway round-trip.
    pub request_timeout_secs: u64,

    /// Additional attempts for a failed read-only gateway call.
    pub read_retry_limit: u32,

    /// Concurrent read-only gateway calls allowed in flight.
    pub read_concurrency: usize,

    /// Largest order quantity the resolver accepts.
    pub max_order_quantity: f64,

    /// Largest order notional (quantity x limit price) the resolver accepts.
    pub max_order_notional_usd: f64,

    /// Orders above this notional require interactive confirmation.
    /// Zero disables the confirmation gate entirely.
    pub confirm_notional_usd: f64,

    /// Number of past chat messages kept in the model context.
    pub history_window: usize,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for TradedeskConfig {
    fn default() -> Self {
        Self {
            gateway_host: "127.0.0.1".into(),
            gateway_port: 7497,
            client_id: 1,
            model: "gpt-4o".into(),
            model_base_url: "https://api.openai.com".into(),
            model_api_key: String::new(),
            max_tokens_per_turn: 1024,
            request_timeout_secs: 10,
            read_retry_limit: 2,
            read_concurrency: 4,
            max_order_quantity: 10_000.0,
            max_order_notional_usd: 250_000.0,
            confirm_notional_usd: 25_000.0,
            history_window: 20,
            log_level: "info".into(),
        }
    }
}

impl TradedeskConfig {
    /// Sanity bounds handed to the resolver.
    pub fn order_limits(&self) -> OrderLimits {
        OrderLimits {
            max_quantity: self.max_order_quantity,
            max_notional_usd: self.max_order_notional_usd,
        }
    }

    /// Tuning knobs handed to the session adapter.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            read_retry_limit: self.read_retry_limit,
            read_concurrency: self.read_concurrency,
        }
    }

    /// Pull the model credential from the environment when set there.
    pub fn apply_env_overrides(&mut self) {
        for var in ["TRADEDESK_MODEL_API_KEY", "MODEL_API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    self.model_api_key = key;
                    return;
                }
            }
        }
    }
}
