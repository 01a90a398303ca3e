//! Attribute value model
//!
//! Attribute values are JSON values: declaration files are TOML, but TOML
//! values convert losslessly into JSON for comparison and state persistence.

use serde_json::Value;

/// A value that may not be computable until its producer has been applied
///
/// References to attributes of nodes that will be created this run resolve
/// to `Unknown` at plan time; the executor re-resolves them once the
/// producer's realized values are available.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Known(Value),
    Unknown,
}

impl Resolved {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Extract the value, if known
    pub fn known(&self) -> Option<&Value> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }
}

/// Convert a TOML value into the JSON value model
pub fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Short type name of a JSON value, for error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Render a value as the string it interpolates to inside a template
///
/// Scalars render bare (no quotes); lists and maps render as JSON.
pub fn interpolate(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_scalars_convert() {
        let v: toml::Value = toml::from_str::<toml::Table>("a = 1\nb = true\nc = \"x\"")
            .unwrap()
            .into();
        let json = toml_to_json(v);
        assert_eq!(json["a"], Value::from(1));
        assert_eq!(json["b"], Value::Bool(true));
        assert_eq!(json["c"], Value::String("x".into()));
    }

    #[test]
    fn toml_nested_convert() {
        let table: toml::Table = toml::from_str("[outer]\ninner = [1, 2]").unwrap();
        let json = toml_to_json(toml::Value::Table(table));
        assert_eq!(json["outer"]["inner"], serde_json::json!([1, 2]));
    }

    #[test]
    fn interpolation_renders_scalars_bare() {
        assert_eq!(interpolate(&Value::String("hi".into())), "hi");
        assert_eq!(interpolate(&Value::from(3)), "3");
        assert_eq!(interpolate(&serde_json::json!([1])), "[1]");
    }
}
