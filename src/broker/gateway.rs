//! HTTP client for the brokerage gateway.
//!
//! One method per wire operation. Sequencing, retries, and order-id
//! assignment live in the session adapter, not here.

use crate::broker::types::*;
use crate::broker::{BrokerSession, SessionError};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Client for a single gateway endpoint, identified by host, port, and
/// the client id the gateway uses to partition sessions.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    client_id: u32,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenSessionRequest {
    client_id: u32,
}

impl GatewayClient {
    pub fn new(host: &str, port: u16, client_id: u32) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            client_id,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Open the session. Called exactly once at process start; the
    /// returned `next_order_id` seeds the adapter's order-id counter.
    pub async fn open(&self) -> Result<SessionOpened, SessionError> {
        debug!("Opening gateway session (client id {})", self.client_id);
        let resp = self
            .http
            .post(self.url("sessions"))
            .json(&OpenSessionRequest { client_id: self.client_id })
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }

    /// Close the session on shutdown. Failures are reported, not retried.
    pub async fn close(&self) -> Result<(), SessionError> {
        let resp = self
            .http
            .delete(self.url("sessions"))
            .header("x-client-id", self.client_id)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp).await?;
        Ok(())
    }

    /// Liveness probe for the `status` command.
    pub async fn ping(&self) -> Result<(), SessionError> {
        let resp = self
            .http
            .get(self.url("ping"))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp).await?;
        Ok(())
    }

    fn contract_query(contract: &ContractRef) -> [(&'static str, String); 4] {
        [
            ("symbol", contract.symbol.clone()),
            ("sec_type", contract.sec_type.clone()),
            ("exchange", contract.exchange.clone()),
            ("currency", contract.currency.clone()),
        ]
    }
}

#[async_trait]
impl BrokerSession for GatewayClient {
    async fn get_quote(&self, contract: &ContractRef) -> Result<QuoteSnapshot, SessionError> {
        debug!("Gateway quote: {}", contract.symbol);
        let resp = self
            .http
            .get(self.url("marketdata/quote"))
            .header("x-client-id", self.client_id)
            .query(&Self::contract_query(contract))
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }

    async fn qualify_contract(
        &self,
        contract: &ContractRef,
    ) -> Result<ContractDetails, SessionError> {
        let resp = self
            .http
            .get(self.url("contracts/qualify"))
            .header("x-client-id", self.client_id)
            .query(&Self::contract_query(contract))
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderAck, SessionError> {
        debug!(
            "Gateway order {}: {} {} {} @ {:?}",
            ticket.order_id, ticket.side, ticket.quantity, ticket.contract.symbol,
            ticket.limit_price,
        );
        let resp = self
            .http
            .post(self.url("orders"))
            .header("x-client-id", self.client_id)
            .json(ticket)
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }

    async fn positions(&self, account: Option<&str>) -> Result<Vec<Position>, SessionError> {
        let mut req = self
            .http
            .get(self.url("positions"))
            .header("x-client-id", self.client_id);
        if let Some(account) = account {
            req = req.query(&[("account", account)]);
        }
        let resp = req.send().await.map_err(transport_error)?;
        decode(resp).await
    }

    async fn account_values(
        &self,
        account: Option<&str>,
    ) -> Result<Vec<AccountValue>, SessionError> {
        let mut req = self
            .http
            .get(self.url("accounts/values"))
            .header("x-client-id", self.client_id);
        if let Some(account) = account {
            req = req.query(&[("account", account)]);
        }
        let resp = req.send().await.map_err(transport_error)?;
        decode(resp).await
    }
}

/// Map a transport-level reqwest failure onto the session taxonomy.
fn transport_error(err: reqwest::Error) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout
    } else {
        SessionError::Disconnected(err.to_string())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SessionError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let message = resp.text().await.unwrap_or_default();
        Err(SessionError::Rejected { status: status.as_u16(), message })
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, SessionError> {
    let resp = check_status(resp).await?;
    resp.json::<T>()
        .await
        .map_err(|e| SessionError::Protocol(e.to_string()))
}
