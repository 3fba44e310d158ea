//! Dispatch engine — drives one tool round through its state machine.
//!
//! AwaitingModelIntent → Resolving → Authorizing → Executing → Completed,
//! with error edges to Failed from every state. Failures become structured
//! failure results fed back into the conversation; they never crash the
//! process or reach the user as a raw error.

pub mod policy;

pub use policy::{AuthorizePolicy, NotionalGate, Permissive, Verdict};

use crate::broker::{SessionAdapter, SessionError};
use crate::resolve::{self, OrderLimits};
use crate::tools::ToolRegistry;
use crate::types::{InvocationResult, ToolCallIntent, TurnPhase, TurnRecord};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of dispatching one model intent.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The turn reached a terminal phase (Completed or Failed).
    Finished(TurnRecord),
    /// The policy wants an explicit user confirmation before executing.
    ConfirmationRequired { reason: String },
}

pub struct DispatchEngine {
    registry: Arc<ToolRegistry>,
    session: Arc<SessionAdapter>,
    policy: Arc<dyn AuthorizePolicy>,
    limits: OrderLimits,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        session: Arc<SessionAdapter>,
        policy: Arc<dyn AuthorizePolicy>,
        limits: OrderLimits,
    ) -> Self {
        Self { registry, session, policy, limits }
    }

    /// Dispatch one model intent. `confirmed` marks an invocation the user
    /// already approved this turn. Cancellation is honored only before the
    /// Executing phase; once the external call is sent the turn runs to
    /// completion or timeout.
    pub async fn dispatch(
        &self,
        intent: &ToolCallIntent,
        confirmed: bool,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let started_at = Utc::now();
        let mut phase = TurnPhase::AwaitingModelIntent;

        advance(&mut phase, TurnPhase::Resolving);
        let invocation = match resolve::resolve(&self.registry, &self.limits, intent) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Resolution failed for '{}': {}", intent.name, e);
                return self.fail(intent, started_at, phase, e.kind(), e.to_string());
            }
        };

        advance(&mut phase, TurnPhase::Authorizing);
        match self.policy.authorize(&invocation, confirmed) {
            Verdict::Allow => {}
            Verdict::Confirm(reason) => {
                info!("Confirmation required for '{}': {}", invocation.tool, reason);
                return DispatchOutcome::ConfirmationRequired { reason };
            }
            Verdict::Deny(reason) => {
                warn!("Authorization denied for '{}': {}", invocation.tool, reason);
                return self.fail(intent, started_at, phase, "authorization_denied", reason);
            }
        }

        if cancel.is_cancelled() {
            info!("Turn cancelled before execution of '{}'", invocation.tool);
            return self.fail(
                intent,
                started_at,
                phase,
                "cancelled",
                "the user cancelled this action before it was sent",
            );
        }

        advance(&mut phase, TurnPhase::Executing);
        match self.session.execute(&invocation).await {
            Ok(payload) => {
                advance(&mut phase, TurnPhase::Completed);
                let result = InvocationResult::success(invocation.tool.as_str(), payload);
                DispatchOutcome::Finished(TurnRecord {
                    id: ulid::Ulid::new().to_string(),
                    phase,
                    intent: intent.clone(),
                    result,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(e) => {
                let message = session_failure_message(invocation.is_mutating(), &e);
                self.fail(intent, started_at, phase, "session_error", message)
            }
        }
    }

    fn fail(
        &self,
        intent: &ToolCallIntent,
        started_at: chrono::DateTime<Utc>,
        mut phase: TurnPhase,
        kind: &str,
        message: impl Into<String>,
    ) -> DispatchOutcome {
        advance(&mut phase, TurnPhase::Failed);
        DispatchOutcome::Finished(TurnRecord {
            id: ulid::Ulid::new().to_string(),
            phase,
            intent: intent.clone(),
            result: InvocationResult::failure(intent.name.as_str(), kind, message),
            started_at,
            finished_at: Utc::now(),
        })
    }
}

fn advance(phase: &mut TurnPhase, next: TurnPhase) {
    debug!("Turn phase: {} -> {}", phase, next);
    *phase = next;
}

/// Render a session failure for the model. A connection-level failure on a
/// mutating call means the outcome is unknown; the narration must tell the
/// user to verify manually instead of retrying.
fn session_failure_message(is_mutating: bool, error: &SessionError) -> String {
    if is_mutating && error.is_connection_level() {
        format!(
            "{}. The order outcome is UNCERTAIN: it may or may not have reached \
             the broker. Do not retry automatically; advise the user to verify \
             the order status manually.",
            error
        )
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::types::*;
    use crate::broker::{BrokerSession, SessionOptions};
    use crate::tools::build_registry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts every session touch so tests can assert the adapter was
    /// never reached.
    struct CountingBroker {
        calls: AtomicUsize,
        order_delay: Duration,
    }

    impl CountingBroker {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), order_delay: Duration::ZERO }
        }

        fn touches(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrokerSession for CountingBroker {
        async fn get_quote(&self, contract: &ContractRef) -> Result<QuoteSnapshot, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(QuoteSnapshot {
                symbol: contract.symbol.clone(),
                bid: None,
                ask: None,
                last: Some(150.0),
                volume: None,
            })
        }

        async fn qualify_contract(
            &self,
            contract: &ContractRef,
        ) -> Result<ContractDetails, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ContractDetails {
                con_id: 1,
                symbol: contract.symbol.clone(),
                sec_type: contract.sec_type.clone(),
                exchange: contract.exchange.clone(),
                currency: contract.currency.clone(),
                local_symbol: None,
            })
        }

        async fn place_order(&self, ticket: &OrderTicket) -> Result<OrderAck, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.order_delay).await;
            Ok(OrderAck { order_id: ticket.order_id, status: "Submitted".into() })
        }

        async fn positions(&self, _account: Option<&str>) -> Result<Vec<Position>, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn account_values(
            &self,
            _account: Option<&str>,
        ) -> Result<Vec<AccountValue>, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    fn limits() -> OrderLimits {
        OrderLimits { max_quantity: 10_000.0, max_notional_usd: 1_000_000.0 }
    }

    fn engine_with(
        broker: Arc<CountingBroker>,
        policy: Arc<dyn AuthorizePolicy>,
        opts: SessionOptions,
    ) -> DispatchEngine {
        let registry = Arc::new(build_registry().unwrap());
        let session = Arc::new(SessionAdapter::new(broker, 1, opts));
        DispatchEngine::new(registry, session, policy, limits())
    }

    fn intent(name: &str, arguments: serde_json::Value) -> ToolCallIntent {
        ToolCallIntent { id: "call_1".into(), name: name.into(), arguments }
    }

    fn finished(outcome: DispatchOutcome) -> TurnRecord {
        match outcome {
            DispatchOutcome::Finished(record) => record,
            other => panic!("expected a finished turn, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn quote_scenario_completes_with_price() {
        let broker = Arc::new(CountingBroker::new());
        let engine =
            engine_with(broker.clone(), Arc::new(Permissive), SessionOptions::default());

        let record = finished(
            engine
                .dispatch(
                    &intent("get_quote", json!({"symbol": "AAPL"})),
                    false,
                    &CancellationToken::new(),
                )
                .await,
        );

        assert_eq!(record.phase, TurnPhase::Completed);
        assert!(record.result.success);
        assert_eq!(record.result.payload["last"], 150.0);
        assert_eq!(broker.touches(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_touching_the_session() {
        let broker = Arc::new(CountingBroker::new());
        let engine =
            engine_with(broker.clone(), Arc::new(Permissive), SessionOptions::default());

        let record = finished(
            engine
                .dispatch(
                    &intent("sell_stock", json!({"symbol": "AAPL"})),
                    false,
                    &CancellationToken::new(),
                )
                .await,
        );

        assert_eq!(record.phase, TurnPhase::Failed);
        assert_eq!(record.result.failure_kind(), Some("unknown_tool"));
        assert_eq!(broker.touches(), 0);
    }

    #[tokio::test]
    async fn invalid_order_fails_before_the_session() {
        let broker = Arc::new(CountingBroker::new());
        let engine =
            engine_with(broker.clone(), Arc::new(Permissive), SessionOptions::default());

        let record = finished(
            engine
                .dispatch(
                    &intent(
                        "place_order",
                        json!({"symbol": "AAPL", "side": "buy", "quantity": -5, "limit_price": 150}),
                    ),
                    false,
                    &CancellationToken::new(),
                )
                .await,
        );

        assert_eq!(record.phase, TurnPhase::Failed);
        assert_eq!(record.result.failure_kind(), Some("validation"));
        assert_eq!(record.result.payload["message"], "quantity must be positive");
        assert_eq!(broker.touches(), 0);
    }

    #[tokio::test]
    async fn denied_invocation_fails_before_the_session() {
        struct DenyAll;
        impl AuthorizePolicy for DenyAll {
            fn authorize(&self, _: &crate::resolve::ResolvedInvocation, _: bool) -> Verdict {
                Verdict::Deny("trading disabled".into())
            }
        }

        let broker = Arc::new(CountingBroker::new());
        let engine = engine_with(broker.clone(), Arc::new(DenyAll), SessionOptions::default());

        let record = finished(
            engine
                .dispatch(
                    &intent(
                        "place_order",
                        json!({"symbol": "AAPL", "side": "buy", "quantity": 1, "limit_price": 150}),
                    ),
                    false,
                    &CancellationToken::new(),
                )
                .await,
        );

        assert_eq!(record.result.failure_kind(), Some("authorization_denied"));
        assert_eq!(broker.touches(), 0);
    }

    #[tokio::test]
    async fn notional_gate_round_trips_through_confirmation() {
        let broker = Arc::new(CountingBroker::new());
        let engine = engine_with(
            broker.clone(),
            Arc::new(NotionalGate { confirm_above_usd: 1_000.0 }),
            SessionOptions::default(),
        );
        let call = intent(
            "place_order",
            json!({"symbol": "AAPL", "side": "buy", "quantity": 100, "limit_price": 150}),
        );

        let outcome = engine.dispatch(&call, false, &CancellationToken::new()).await;
        assert!(matches!(outcome, DispatchOutcome::ConfirmationRequired { .. }));
        assert_eq!(broker.touches(), 0);

        let record = finished(engine.dispatch(&call, true, &CancellationToken::new()).await);
        assert_eq!(record.phase, TurnPhase::Completed);
        assert_eq!(broker.touches(), 1);
    }

    #[tokio::test]
    async fn cancellation_is_honored_before_executing() {
        let broker = Arc::new(CountingBroker::new());
        let engine =
            engine_with(broker.clone(), Arc::new(Permissive), SessionOptions::default());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let record = finished(
            engine
                .dispatch(
                    &intent(
                        "place_order",
                        json!({"symbol": "AAPL", "side": "buy", "quantity": 1, "limit_price": 150}),
                    ),
                    false,
                    &cancel,
                )
                .await,
        );

        assert_eq!(record.result.failure_kind(), Some("cancelled"));
        assert_eq!(broker.touches(), 0);
    }

    #[tokio::test]
    async fn mutating_timeout_fails_with_uncertain_outcome_advice() {
        let broker = Arc::new(CountingBroker {
            calls: AtomicUsize::new(0),
            order_delay: Duration::from_millis(200),
        });
        let opts = SessionOptions {
            request_timeout: Duration::from_millis(20),
            ..SessionOptions::default()
        };
        let engine = engine_with(broker.clone(), Arc::new(Permissive), opts);

        let record = finished(
            engine
                .dispatch(
                    &intent(
                        "place_order",
                        json!({"symbol": "AAPL", "side": "buy", "quantity": 1, "limit_price": 150}),
                    ),
                    false,
                    &CancellationToken::new(),
                )
                .await,
        );

        assert_eq!(record.phase, TurnPhase::Failed);
        assert_eq!(record.result.failure_kind(), Some("session_error"));
        let message = record.result.payload["message"].as_str().unwrap();
        assert!(message.contains("UNCERTAIN"));
        // Exactly one external request for the turn.
        assert_eq!(broker.touches(), 1);
    }
}
