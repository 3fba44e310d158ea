//! Tool specification data model.
//!
//! A [`ToolSpec`] is the immutable schema of one operation the model may
//! request: its parameters, their semantic types, and whether executing it
//! has an external side effect.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Side-effect classification of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Market data and account lookups. Safe to retry.
    ReadOnly,
    /// Places or alters state at the brokerage. Never retried.
    Mutating,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::Mutating => write!(f, "mutating"),
        }
    }
}

/// Semantic type of a tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    /// Closed set of accepted values, compared case-insensitively.
    Enum(Vec<String>),
}

impl ParamKind {
    /// Build an enum kind from a slice of allowed values.
    pub fn one_of(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    /// Name of the expected type, used in mismatch errors and schemas.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Enum(_) => "enum",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn new(name: &str, kind: ParamKind, required: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        }
    }
}

/// Immutable schema of one invocable operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub side_effect: SideEffect,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, side_effect: SideEffect) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            side_effect,
            params: Vec::new(),
        }
    }

    /// Append a parameter declaration (ordered).
    pub fn param(mut self, name: &str, kind: ParamKind, required: bool, description: &str) -> Self {
        self.params.push(ParamSpec::new(name, kind, required, description));
        self
    }

    pub fn is_mutating(&self) -> bool {
        self.side_effect == SideEffect::Mutating
    }

    /// Look up a declared parameter by name.
    pub fn find_param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON Schema for the tool's parameters, in the shape the model's
    /// function-calling API expects.
    pub fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for p in &self.params {
            let mut prop = serde_json::Map::new();
            match &p.kind {
                ParamKind::String => {
                    prop.insert("type".into(), json!("string"));
                }
                ParamKind::Number => {
                    prop.insert("type".into(), json!("number"));
                }
                ParamKind::Boolean => {
                    prop.insert("type".into(), json!("boolean"));
                }
                ParamKind::Enum(values) => {
                    prop.insert("type".into(), json!("string"));
                    prop.insert("enum".into(), json!(values));
                }
            }
            prop.insert("description".into(), json!(p.description));
            properties.insert(p.name.clone(), serde_json::Value::Object(prop));

            if p.required {
                required.push(p.name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Definition of a tool as exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolSpec> for ToolDefinition {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: format!("[{}] {}", spec.side_effect, spec.description),
            parameters: spec.parameters_schema(),
        }
    }
}
