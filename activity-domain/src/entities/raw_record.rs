// Raw record entity
// The untyped row delivered by a change notification or a table fetch

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub resource: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(resource: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            resource: resource.into(),
            fields,
        }
    }

    /// Non-object values yield `None`.
    pub fn from_value(resource: impl Into<String>, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self::new(resource, fields)),
            _ => None,
        }
    }

    pub fn has(&self, field: &str) -> bool {
        match self.fields.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn number_field(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Ids may be numeric (bigserial) or textual (uuid).
    pub fn id_field(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::Number(number) => Some(number.to_string()),
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        }
    }

    /// Renders a field for interpolation into display text. Only non-blank
    /// strings and numbers qualify.
    pub fn display_field(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(_) => self.number_field(field).map(format_amount),
            _ => None,
        }
    }
}

pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
