//! Authorization policy for resolved invocations.
//!
//! Authorizing is a dedicated step even though the default policy allows
//! everything: it is the seam where confirmation-for-high-risk actions
//! lives, between resolution and execution.

use crate::resolve::ResolvedInvocation;

/// Policy decision for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Execution requires an explicit user confirmation this turn.
    Confirm(String),
    Deny(String),
}

pub trait AuthorizePolicy: Send + Sync {
    /// Judge an invocation. `confirmed` is true when the user already
    /// approved this exact invocation during the current turn.
    fn authorize(&self, invocation: &ResolvedInvocation, confirmed: bool) -> Verdict;
}

/// Pass-through policy: every resolved invocation may execute.
pub struct Permissive;

impl AuthorizePolicy for Permissive {
    fn authorize(&self, _invocation: &ResolvedInvocation, _confirmed: bool) -> Verdict {
        Verdict::Allow
    }
}

/// Require confirmation for mutating invocations above a notional
/// threshold. Market orders have no bounded notional, so they always
/// require confirmation under this policy.
pub struct NotionalGate {
    pub confirm_above_usd: f64,
}

impl AuthorizePolicy for NotionalGate {
    fn authorize(&self, invocation: &ResolvedInvocation, confirmed: bool) -> Verdict {
        if !invocation.is_mutating() || confirmed {
            return Verdict::Allow;
        }

        match order_notional(invocation) {
            Some(notional) if notional <= self.confirm_above_usd => Verdict::Allow,
            Some(notional) => Verdict::Confirm(format!(
                "order notional is {:.2} USD (threshold {:.2})",
                notional, self.confirm_above_usd
            )),
            None => Verdict::Confirm(
                "market orders have no bounded notional value".to_string(),
            ),
        }
    }
}

/// Notional value of an order invocation, when it is bounded.
pub fn order_notional(invocation: &ResolvedInvocation) -> Option<f64> {
    let quantity = invocation.num_arg("quantity")?;
    let price = invocation.num_arg("limit_price")?;
    Some(quantity * price)
}
