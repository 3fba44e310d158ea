//! Session adapter — the only component holding the brokerage session.
//!
//! All mutating calls are serialized behind an exclusive gate and are
//! never retried: after a timeout the order may or may not have executed,
//! and a blind retry risks duplicate execution. Read-only calls share the
//! gate, run through a small bounded pool, and retry connection-level
//! failures a fixed number of times with backoff.

use crate::broker::types::*;
use crate::broker::{BrokerSession, SessionError};
use crate::resolve::ResolvedInvocation;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

/// Tuning knobs for the adapter, taken from the config at startup.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Deadline for a mutating round-trip.
    pub request_timeout: Duration,
    /// Additional attempts for a failed read-only call.
    pub read_retry_limit: u32,
    /// Concurrent read-only calls allowed in flight.
    pub read_concurrency: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            read_retry_limit: 2,
            read_concurrency: 4,
        }
    }
}

pub struct SessionAdapter {
    broker: Arc<dyn BrokerSession>,
    /// Readers share the gate; a mutating call takes it exclusively so its
    /// request/acknowledge round-trip is never interleaved with anything.
    gate: RwLock<()>,
    read_slots: Semaphore,
    /// Client-assigned order ids. Monotonic, consumed exactly once.
    next_order_id: AtomicI64,
    degraded: AtomicBool,
    opts: SessionOptions,
}

impl SessionAdapter {
    pub fn new(broker: Arc<dyn BrokerSession>, first_order_id: i64, opts: SessionOptions) -> Self {
        Self {
            broker,
            gate: RwLock::new(()),
            read_slots: Semaphore::new(opts.read_concurrency.max(1)),
            next_order_id: AtomicI64::new(first_order_id),
            degraded: AtomicBool::new(false),
            opts,
        }
    }

    /// Whether a connection-level failure has been observed since startup.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }

    fn take_order_id(&self) -> i64 {
        self.next_order_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Execute a resolved invocation against the session.
    pub async fn execute(
        &self,
        invocation: &ResolvedInvocation,
    ) -> Result<serde_json::Value, SessionError> {
        match invocation.tool.as_str() {
            "get_quote" => {
                let contract = contract_from(invocation)?;
                let broker = self.broker.clone();
                let snapshot = self
                    .read_call(move || {
                        let broker = broker.clone();
                        let contract = contract.clone();
                        async move { broker.get_quote(&contract).await }
                    })
                    .await?;
                to_payload(&snapshot)
            }
            "qualify_contract" => {
                let contract = contract_from(invocation)?;
                let broker = self.broker.clone();
                let details = self
                    .read_call(move || {
                        let broker = broker.clone();
                        let contract = contract.clone();
                        async move { broker.qualify_contract(&contract).await }
                    })
                    .await?;
                to_payload(&details)
            }
            "place_order" => {
                let ticket = self.ticket_from(invocation)?;
                let ack = self.mutating_call(self.broker.place_order(&ticket)).await?;
                to_payload(&ack)
            }
            "positions" => {
                let account = invocation.str_arg("account").map(str::to_string);
                let broker = self.broker.clone();
                let rows = self
                    .read_call(move || {
                        let broker = broker.clone();
                        let account = account.clone();
                        async move { broker.positions(account.as_deref()).await }
                    })
                    .await?;
                to_payload(&rows)
            }
            "account_values" => {
                let account = invocation.str_arg("account").map(str::to_string);
                let broker = self.broker.clone();
                let rows = self
                    .read_call(move || {
                        let broker = broker.clone();
                        let account = account.clone();
                        async move { broker.account_values(account.as_deref()).await }
                    })
                    .await?;
                to_payload(&rows)
            }
            other => Err(SessionError::Internal(format!(
                "no session method for tool '{}'",
                other
            ))),
        }
    }

    /// Run a read-only call: shared gate, bounded pool, bounded retry on
    /// connection-level failures.
    async fn read_call<T, F, Fut>(&self, op: F) -> Result<T, SessionError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let _shared = self.gate.read().await;
        let _permit = self
            .read_slots
            .acquire()
            .await
            .map_err(|_| SessionError::Internal("read pool closed".into()))?;

        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection_level() && attempt < self.opts.read_retry_limit => {
                    attempt += 1;
                    let delay = Duration::from_millis(250 * u64::from(1u32 << attempt.min(4)));
                    warn!(
                        "Read-only call failed ({}), retry {}/{} in {:?}",
                        e, attempt, self.opts.read_retry_limit, delay,
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_connection_level() {
                        self.mark_degraded();
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Run a mutating call: exclusive gate, single attempt, hard deadline.
    async fn mutating_call<T, Fut>(&self, fut: Fut) -> Result<T, SessionError>
    where
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let _exclusive = self.gate.write().await;
        debug!("Mutating call entering single-flight section");
        match tokio::time::timeout(self.opts.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_connection_level() {
                    self.mark_degraded();
                }
                Err(e)
            }
            Err(_) => {
                // The order may or may not have executed; the id stays
                // consumed and the caller must not retry.
                self.mark_degraded();
                Err(SessionError::Timeout)
            }
        }
    }

    fn ticket_from(&self, invocation: &ResolvedInvocation) -> Result<OrderTicket, SessionError> {
        let side = match required_str(invocation, "side")? {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            other => {
                return Err(SessionError::Internal(format!("unexpected order side '{other}'")))
            }
        };
        let order_type = match invocation.str_arg("order_type").unwrap_or("limit") {
            "market" => OrderType::Market,
            _ => OrderType::Limit,
        };
        let quantity = invocation
            .num_arg("quantity")
            .ok_or_else(|| invariant_breach("quantity"))?;

        Ok(OrderTicket {
            order_id: self.take_order_id(),
            contract: contract_from(invocation)?,
            side,
            quantity,
            order_type,
            limit_price: invocation.num_arg("limit_price"),
        })
    }
}

/// Build a contract from the invocation's validated arguments.
fn contract_from(invocation: &ResolvedInvocation) -> Result<ContractRef, SessionError> {
    let mut contract = ContractRef::stock(required_str(invocation, "symbol")?);
    if let Some(sec_type) = invocation.str_arg("sec_type") {
        contract = contract.with_sec_type(sec_type);
    }
    if let Some(exchange) = invocation.str_arg("exchange") {
        contract = contract.with_exchange(exchange);
    }
    if let Some(currency) = invocation.str_arg("currency") {
        contract = contract.with_currency(currency);
    }
    Ok(contract)
}

fn required_str<'a>(
    invocation: &'a ResolvedInvocation,
    name: &str,
) -> Result<&'a str, SessionError> {
    invocation.str_arg(name).ok_or_else(|| invariant_breach(name))
}

/// A required argument missing here means the resolver invariant was
/// bypassed, which is a bug, not a user error.
fn invariant_breach(name: &str) -> SessionError {
    SessionError::Internal(format!("resolved invocation missing argument '{name}'"))
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, SessionError> {
    serde_json::to_value(value).map_err(|e| SessionError::Internal(e.to_string()))
}
