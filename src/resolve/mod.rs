//! Invocation resolver — validates a model-proposed tool call.
//!
//! Resolution is pure: no external call happens here. A [`ToolCallIntent`]
//! either becomes a [`ResolvedInvocation`] whose arguments are complete and
//! type-correct, or fails with one of a closed set of errors that is fed
//! back to the model for self-correction.

use crate::tools::registry::ToolRegistry;
use crate::tools::spec::{ParamKind, ParamSpec, SideEffect, ToolSpec};
use crate::types::ToolCallIntent;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Resolution-time failures. All recoverable within the turn.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{name}' expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: String,
        got: String,
    },

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("{0}")]
    Validation(String),
}

impl ResolveError {
    /// Stable kind tag used in failure payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::MissingArgument(_) => "missing_argument",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnexpectedArgument(_) => "unexpected_argument",
            Self::Validation(_) => "validation",
        }
    }
}

/// A validated, typed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// A tool call bound to a registered spec with validated arguments.
///
/// Invariant: every required parameter of the bound spec is present and
/// type-correct, and no undeclared argument names remain.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInvocation {
    pub tool: String,
    pub side_effect: SideEffect,
    pub args: BTreeMap<String, ArgValue>,
}

impl ResolvedInvocation {
    pub fn is_mutating(&self) -> bool {
        self.side_effect == SideEffect::Mutating
    }

    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(ArgValue::as_str)
    }

    pub fn num_arg(&self, name: &str) -> Option<f64> {
        self.args.get(name).and_then(ArgValue::as_num)
    }

    pub fn bool_arg(&self, name: &str) -> Option<bool> {
        self.args.get(name).and_then(ArgValue::as_bool)
    }
}

/// Configured sanity bounds applied to mutating invocations.
#[derive(Debug, Clone, Copy)]
pub struct OrderLimits {
    pub max_quantity: f64,
    pub max_notional_usd: f64,
}

/// Resolve a model-proposed tool call against the registry.
pub fn resolve(
    registry: &ToolRegistry,
    limits: &OrderLimits,
    intent: &ToolCallIntent,
) -> Result<ResolvedInvocation, ResolveError> {
    let spec = registry
        .lookup(&intent.name)
        .ok_or_else(|| ResolveError::UnknownTool(intent.name.clone()))?;

    let raw_args = raw_argument_map(&intent.arguments)?;

    let mut args = BTreeMap::new();
    for param in &spec.params {
        match raw_args.get(param.name.as_str()) {
            Some(raw) => {
                args.insert(param.name.clone(), coerce(param, raw)?);
            }
            None if param.required => {
                return Err(ResolveError::MissingArgument(param.name.clone()));
            }
            None => {}
        }
    }

    // Undeclared names are rejected so injected extra fields never reach
    // the brokerage call.
    for name in raw_args.keys() {
        if spec.find_param(name).is_none() {
            return Err(ResolveError::UnexpectedArgument(name.to_string()));
        }
    }

    let invocation = ResolvedInvocation {
        tool: spec.name.clone(),
        side_effect: spec.side_effect,
        args,
    };

    if invocation.is_mutating() {
        check_domain_bounds(spec, &invocation, limits)?;
    }

    Ok(invocation)
}

/// The intent's argument mapping. Absent or null arguments count as empty.
fn raw_argument_map(arguments: &Value) -> Result<BTreeMap<&str, &Value>, ResolveError> {
    match arguments {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
        other => Err(ResolveError::Validation(format!(
            "tool arguments must be a JSON object, got {}",
            json_type_name(other)
        ))),
    }
}

/// Coerce a raw value to the parameter's declared semantic type.
fn coerce(param: &ParamSpec, raw: &Value) -> Result<ArgValue, ResolveError> {
    let mismatch = |got: &Value| ResolveError::TypeMismatch {
        name: param.name.clone(),
        expected: param.kind.type_name().to_string(),
        got: json_type_name(got).to_string(),
    };

    match &param.kind {
        ParamKind::String => match raw {
            Value::String(s) => Ok(ArgValue::Str(s.clone())),
            other => Err(mismatch(other)),
        },
        ParamKind::Number => match raw {
            Value::Number(n) => n
                .as_f64()
                .map(ArgValue::Num)
                .ok_or_else(|| mismatch(raw)),
            // Models routinely quote numbers; accept numeric strings.
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(ArgValue::Num)
                .map_err(|_| mismatch(raw)),
            other => Err(mismatch(other)),
        },
        ParamKind::Boolean => match raw {
            Value::Bool(b) => Ok(ArgValue::Bool(*b)),
            other => Err(mismatch(other)),
        },
        ParamKind::Enum(allowed) => match raw {
            Value::String(s) => {
                let normalized = s.trim().to_lowercase();
                if allowed.iter().any(|a| a.eq_ignore_ascii_case(&normalized)) {
                    Ok(ArgValue::Str(normalized))
                } else {
                    Err(ResolveError::TypeMismatch {
                        name: param.name.clone(),
                        expected: format!("one of [{}]", allowed.join(", ")),
                        got: s.clone(),
                    })
                }
            }
            other => Err(mismatch(other)),
        },
    }
}

/// Domain-level sanity bounds for mutating tools. The primary safety gate
/// against a misread instruction producing an oversized or inverted trade.
fn check_domain_bounds(
    spec: &ToolSpec,
    invocation: &ResolvedInvocation,
    limits: &OrderLimits,
) -> Result<(), ResolveError> {
    if spec.name != "place_order" {
        return Ok(());
    }

    let quantity = invocation
        .num_arg("quantity")
        .ok_or_else(|| ResolveError::MissingArgument("quantity".into()))?;

    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ResolveError::Validation("quantity must be positive".into()));
    }
    if quantity > limits.max_quantity {
        return Err(ResolveError::Validation(format!(
            "quantity {} exceeds the configured maximum of {}",
            quantity, limits.max_quantity
        )));
    }

    let order_type = invocation.str_arg("order_type").unwrap_or("limit");
    match invocation.num_arg("limit_price") {
        Some(price) => {
            if !price.is_finite() || price <= 0.0 {
                return Err(ResolveError::Validation("limit_price must be positive".into()));
            }
            let notional = quantity * price;
            if notional > limits.max_notional_usd {
                return Err(ResolveError::Validation(format!(
                    "order notional {:.2} exceeds the configured maximum of {:.2}",
                    notional, limits.max_notional_usd
                )));
            }
        }
        None if order_type == "limit" => {
            return Err(ResolveError::Validation(
                "limit orders require limit_price".into(),
            ));
        }
        None => {}
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::build_registry;
    use serde_json::json;

    fn limits() -> OrderLimits {
        OrderLimits {
            max_quantity: 10_000.0,
            max_notional_usd: 1_000_000.0,
        }
    }

    fn intent(name: &str, arguments: Value) -> ToolCallIntent {
        ToolCallIntent {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn quote_intent_resolves_with_typed_symbol() {
        let registry = build_registry().unwrap();
        let resolved = resolve(
            &registry,
            &limits(),
            &intent("get_quote", json!({"symbol": "AAPL"})),
        )
        .unwrap();

        assert_eq!(resolved.tool, "get_quote");
        assert_eq!(resolved.str_arg("symbol"), Some("AAPL"));
        assert!(!resolved.is_mutating());
    }

    #[test]
    fn unknown_tool_name_is_rejected() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent("sell_stock", json!({"symbol": "AAPL"})),
        )
        .unwrap_err();

        assert_eq!(err, ResolveError::UnknownTool("sell_stock".into()));
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let registry = build_registry().unwrap();
        let err = resolve(&registry, &limits(), &intent("get_quote", json!({}))).unwrap_err();
        assert_eq!(err, ResolveError::MissingArgument("symbol".into()));
    }

    #[test]
    fn undeclared_argument_is_rejected() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent("get_quote", json!({"symbol": "AAPL", "leverage": 50})),
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::UnexpectedArgument("leverage".into()));
    }

    #[test]
    fn numeric_strings_coerce_to_numbers() {
        let registry = build_registry().unwrap();
        let resolved = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "BUY", "quantity": "100", "limit_price": "150.5"}),
            ),
        )
        .unwrap();

        assert_eq!(resolved.num_arg("quantity"), Some(100.0));
        assert_eq!(resolved.num_arg("limit_price"), Some(150.5));
        // Enum values are normalized to lowercase.
        assert_eq!(resolved.str_arg("side"), Some("buy"));
    }

    #[test]
    fn non_numeric_quantity_is_a_type_mismatch() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "buy", "quantity": "many", "limit_price": 150}),
            ),
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::TypeMismatch { ref name, .. } if name == "quantity"));
    }

    #[test]
    fn enum_value_outside_allowed_set_is_rejected() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "hold", "quantity": 10, "limit_price": 150}),
            ),
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::TypeMismatch { ref name, .. } if name == "side"));
    }

    #[test]
    fn negative_quantity_fails_validation() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "buy", "quantity": -5, "limit_price": 150}),
            ),
        )
        .unwrap_err();

        assert_eq!(err, ResolveError::Validation("quantity must be positive".into()));
    }

    #[test]
    fn oversized_notional_fails_validation() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "buy", "quantity": 9000, "limit_price": 150}),
            ),
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::Validation(ref msg) if msg.contains("notional")));
    }

    #[test]
    fn limit_order_without_price_fails_validation() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "buy", "quantity": 10}),
            ),
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::Validation(ref msg) if msg.contains("limit_price")));
    }

    #[test]
    fn market_order_without_price_resolves() {
        let registry = build_registry().unwrap();
        let resolved = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "sell", "quantity": 10, "order_type": "market"}),
            ),
        )
        .unwrap();

        assert_eq!(resolved.str_arg("order_type"), Some("market"));
        assert_eq!(resolved.num_arg("limit_price"), None);
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let registry = build_registry().unwrap();
        let err = resolve(
            &registry,
            &limits(),
            &intent("get_quote", json!(["AAPL"])),
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::Validation(ref msg) if msg.contains("JSON object")));
    }

    #[test]
    fn resolving_twice_yields_equal_results() {
        let registry = build_registry().unwrap();
        let call = intent(
            "place_order",
            json!({"symbol": "AAPL", "side": "buy", "quantity": 100, "limit_price": 150.0}),
        );

        let first = resolve(&registry, &limits(), &call).unwrap();
        let second = resolve(&registry, &limits(), &call).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolved_invocation_revalidates_against_its_spec() {
        let registry = build_registry().unwrap();
        let resolved = resolve(
            &registry,
            &limits(),
            &intent(
                "place_order",
                json!({"symbol": "AAPL", "side": "buy", "quantity": 100, "limit_price": 150.0}),
            ),
        )
        .unwrap();

        let spec = registry.lookup(&resolved.tool).unwrap();
        for param in spec.params.iter().filter(|p| p.required) {
            assert!(resolved.args.contains_key(&param.name), "missing {}", param.name);
        }
        for name in resolved.args.keys() {
            assert!(spec.find_param(name).is_some(), "undeclared {name}");
        }
    }
}
