//! The startup tool catalog exposed to the model.
//!
//! The brokerage session itself is opened at process start and closed at
//! shutdown, so connection lifecycle is deliberately not a tool.

use crate::tools::registry::{RegistryError, ToolRegistry};
use crate::tools::spec::{ParamKind, SideEffect, ToolSpec};

/// Build the full registry of brokerage tools.
pub fn build_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolSpec::new(
            "get_quote",
            "Fetch current market data (bid, ask, last, volume) for a contract.",
            SideEffect::ReadOnly,
        )
        .param("symbol", ParamKind::String, true, "Trading symbol, e.g. AAPL")
        .param(
            "sec_type",
            ParamKind::one_of(&["stk", "opt", "fut"]),
            false,
            "Security type (defaults to stk)",
        )
        .param("exchange", ParamKind::String, false, "Exchange (defaults to SMART routing)")
        .param("currency", ParamKind::String, false, "Currency (defaults to USD)"),
    )?;

    registry.register(
        ToolSpec::new(
            "qualify_contract",
            "Resolve a contract description to its fully qualified form.",
            SideEffect::ReadOnly,
        )
        .param("symbol", ParamKind::String, true, "Trading symbol, e.g. AAPL")
        .param(
            "sec_type",
            ParamKind::one_of(&["stk", "opt", "fut"]),
            false,
            "Security type (defaults to stk)",
        )
        .param("exchange", ParamKind::String, false, "Exchange (defaults to SMART routing)")
        .param("currency", ParamKind::String, false, "Currency (defaults to USD)"),
    )?;

    registry.register(
        ToolSpec::new(
            "place_order",
            "Place an order. Limit orders require limit_price.",
            SideEffect::Mutating,
        )
        .param("symbol", ParamKind::String, true, "Trading symbol, e.g. AAPL")
        .param("side", ParamKind::one_of(&["buy", "sell"]), true, "Order side")
        .param("quantity", ParamKind::Number, true, "Number of shares, must be positive")
        .param(
            "order_type",
            ParamKind::one_of(&["limit", "market"]),
            false,
            "Order type (defaults to limit)",
        )
        .param("limit_price", ParamKind::Number, false, "Limit price in the contract currency"),
    )?;

    registry.register(
        ToolSpec::new(
            "positions",
            "List current positions (symbol, quantity, average cost).",
            SideEffect::ReadOnly,
        )
        .param("account", ParamKind::String, false, "Account id (defaults to the session account)"),
    )?;

    registry.register(
        ToolSpec::new(
            "account_values",
            "List account values (net liquidation, cash balance, margin figures).",
            SideEffect::ReadOnly,
        )
        .param("account", ParamKind::String, false, "Account id (defaults to the session account)"),
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::spec::SideEffect;

    #[test]
    fn catalog_registers_all_tools() {
        let registry = build_registry().unwrap();
        assert_eq!(registry.len(), 5);
        for name in ["get_quote", "qualify_contract", "place_order", "positions", "account_values"]
        {
            assert!(registry.lookup(name).is_some(), "missing tool {name}");
        }
    }

    #[test]
    fn only_place_order_is_mutating() {
        let registry = build_registry().unwrap();
        for spec in registry.iter() {
            let expected = spec.name == "place_order";
            assert_eq!(spec.side_effect == SideEffect::Mutating, expected, "{}", spec.name);
        }
    }

    #[test]
    fn connection_lifecycle_is_not_a_tool() {
        let registry = build_registry().unwrap();
        assert!(registry.lookup("connect").is_none());
        assert!(registry.lookup("disconnect").is_none());
    }
}
