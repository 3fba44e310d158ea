pub mod gateway;
pub mod session;
pub mod types;

pub use gateway::GatewayClient;
pub use session::{SessionAdapter, SessionOptions};
pub use types::{
    AccountValue, ContractDetails, ContractRef, OrderAck, OrderSide, OrderTicket, OrderType,
    Position, QuoteSnapshot, SessionOpened,
};

use async_trait::async_trait;
use thiserror::Error;

/// Network-time failures at the brokerage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("request timed out")]
    Timeout,

    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed gateway response: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// True for failures where the request may not have reached the
    /// gateway at all. Only these are candidates for read-side retry.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Timeout | Self::Disconnected(_))
    }
}

/// The connected brokerage session, one method per wire operation.
///
/// Implemented by [`GatewayClient`] for the real gateway and by stubs in
/// tests. Callers go through [`SessionAdapter`], which owns sequencing.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn get_quote(&self, contract: &ContractRef) -> Result<QuoteSnapshot, SessionError>;

    async fn qualify_contract(
        &self,
        contract: &ContractRef,
    ) -> Result<ContractDetails, SessionError>;

    async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderAck, SessionError>;

    async fn positions(&self, account: Option<&str>) -> Result<Vec<Position>, SessionError>;

    async fn account_values(&self, account: Option<&str>)
        -> Result<Vec<AccountValue>, SessionError>;
}
