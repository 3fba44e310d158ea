//! Wire types shared between the gateway client and the session adapter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A contract description. Defaults mirror the gateway's smart-routing
/// conventions: stock, SMART exchange, USD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRef {
    pub symbol: String,
    pub sec_type: String,
    pub exchange: String,
    pub currency: String,
}

impl ContractRef {
    pub fn stock(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            sec_type: "STK".into(),
            exchange: "SMART".into(),
            currency: "USD".into(),
        }
    }

    pub fn with_sec_type(mut self, sec_type: &str) -> Self {
        self.sec_type = sec_type.to_uppercase();
        self
    }

    pub fn with_exchange(mut self, exchange: &str) -> Self {
        self.exchange = exchange.to_uppercase();
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_uppercase();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// A fully specified order, carrying the client-assigned order id the
/// gateway uses to correlate the acknowledgment. Ids are assigned by the
/// session adapter and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTicket {
    pub order_id: i64,
    pub contract: ContractRef,
    pub side: OrderSide,
    pub quantity: f64,
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
}

/// Market data snapshot for a contract. Fields the feed has not populated
/// yet arrive as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub volume: Option<f64>,
}

/// A qualified contract as resolved by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub con_id: i64,
    pub symbol: String,
    pub sec_type: String,
    pub exchange: String,
    pub currency: String,
    #[serde(default)]
    pub local_symbol: Option<String>,
}

/// Acknowledgment for a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: i64,
    pub status: String,
}

/// One position row for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub symbol: String,
    pub quantity: f64,
    pub avg_cost: f64,
}

/// One account value row (net liquidation, cash, margin figures).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountValue {
    pub tag: String,
    pub value: String,
    pub currency: String,
}

/// Handshake response when the session is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub account: String,
    pub next_order_id: i64,
}
