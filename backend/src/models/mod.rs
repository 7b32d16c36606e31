//! Domain models for rule-driven mapping.
//!
//! These are decoded straight from the configuration file:
//!
//! - [`Rule`] - one upload endpoint with its delivery target and line spec
//! - [`LineSpec`] - ordered field mappings plus validations
//! - [`Mapping`] - one column-to-field directive
//! - [`Fill`] - default value policy for absent columns
//! - [`Validation`] - per-column value check
//! - [`HttpTarget`] - outbound delivery descriptor

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fill literal that stands for the row index.
pub const ROW_NUMBER_SENTINEL: &str = "row_number";

/// Default CSV delimiter when a rule does not set one.
pub const DEFAULT_DELIMITER: char = ';';

// =============================================================================
// Rule
// =============================================================================

/// Processing contract for one upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Endpoint identifier, used as the upload path segment.
    pub id: String,

    /// Delimiter hint for the CSV parser.
    #[serde(default)]
    pub delimiter: Option<String>,

    /// Free-form rule type, passed to hooks.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Where mapped documents are sent.
    #[serde(default)]
    pub http: Option<HttpTarget>,

    /// Line specifications. Only the first one is honored.
    #[serde(default)]
    pub each_line: Vec<LineSpec>,
}

impl Rule {
    /// The active line specification.
    pub fn line_spec(&self) -> Option<&LineSpec> {
        self.each_line.first()
    }

    /// Delimiter to parse uploads with, falling back to `;`.
    pub fn delimiter(&self) -> char {
        self.delimiter
            .as_deref()
            .and_then(|d| d.chars().next())
            .unwrap_or(DEFAULT_DELIMITER)
    }

    /// Key under which the payload is nested, if any.
    pub fn payload_key(&self) -> Option<&str> {
        self.http
            .as_ref()
            .map(|h| h.payload_key.as_str())
            .filter(|k| !k.is_empty())
    }
}

/// One line-processing specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineSpec {
    #[serde(default)]
    pub map: Vec<Mapping>,

    #[serde(default)]
    pub validation: Vec<Validation>,
}

// =============================================================================
// Mapping
// =============================================================================

/// One field transformation directive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mapping {
    /// Source column name.
    pub name: String,

    /// Output key, defaults to `name`.
    #[serde(default)]
    pub to: Option<String>,

    /// The column must be present in the headers.
    #[serde(default)]
    pub required: bool,

    /// Dotted output path, e.g. `address.city`.
    #[serde(default)]
    pub nested: Option<String>,

    /// Default value when the column is absent.
    #[serde(default)]
    pub fill: Option<Fill>,

    /// Array accumulator the value is appended to.
    #[serde(default)]
    pub insert_into: Option<String>,

    /// Worker names the value is sent to.
    #[serde(default)]
    pub handlers: Vec<String>,

    /// Hook names associated with this field.
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl Mapping {
    /// Create a mapping for a source column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.to = Some(target.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nested(mut self, path: impl Into<String>) -> Self {
        self.nested = Some(path.into());
        self
    }

    pub fn fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn insert_into(mut self, target: impl Into<String>) -> Self {
        self.insert_into = Some(target.into());
        self
    }

    pub fn handlers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handlers = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn plugins<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plugins = names.into_iter().map(Into::into).collect();
        self
    }

    /// Output key: the rename target, or the source name.
    pub fn target_key(&self) -> &str {
        self.to
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.name)
    }

    /// Nested path, ignoring empty strings.
    pub fn nested_path(&self) -> Option<&str> {
        self.nested.as_deref().filter(|n| !n.is_empty())
    }

    /// Aggregation target, ignoring empty strings.
    pub fn insert_target(&self) -> Option<&str> {
        self.insert_into.as_deref().filter(|t| !t.is_empty())
    }
}

// =============================================================================
// Fill
// =============================================================================

/// Kind of value a [`Fill`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillKind {
    String,
    Array,
}

/// Default value policy for an absent column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    #[serde(rename = "type")]
    pub kind: FillKind,

    /// Literal value, or [`ROW_NUMBER_SENTINEL`].
    #[serde(default)]
    pub value: Value,

    /// Prepended to the row index for the sentinel.
    #[serde(default)]
    pub prefix: String,
}

impl Fill {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: FillKind::String,
            value: Value::String(value.into()),
            prefix: String::new(),
        }
    }

    pub fn row_number(prefix: impl Into<String>) -> Self {
        Self {
            kind: FillKind::String,
            value: Value::String(ROW_NUMBER_SENTINEL.to_string()),
            prefix: prefix.into(),
        }
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self {
            kind: FillKind::Array,
            value: Value::Array(values),
            prefix: String::new(),
        }
    }

    /// Synthesize the value for a row.
    pub fn resolve(&self, row_index: usize) -> Value {
        match self.kind {
            FillKind::String => match &self.value {
                Value::String(s) if s == ROW_NUMBER_SENTINEL => {
                    Value::String(format!("{}{}", self.prefix, row_index))
                }
                Value::String(s) => Value::String(s.clone()),
                Value::Null => Value::String(String::new()),
                other => Value::String(other.to_string()),
            },
            FillKind::Array => match &self.value {
                Value::Array(items) => Value::Array(items.clone()),
                Value::Null => Value::Array(Vec::new()),
                other => Value::Array(vec![other.clone()]),
            },
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Check applied to a column before mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub field: String,

    #[serde(rename = "type")]
    pub kind: ValidationKind,

    /// Regular expression, for [`ValidationKind::Regex`].
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Number,
    String,
    Email,
    Regex,
}

// =============================================================================
// HTTP Delivery
// =============================================================================

/// Outbound delivery descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTarget {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: Vec<HttpHeader>,

    #[serde(default)]
    pub auth: Option<HttpAuth>,

    /// Dotted key the document list is nested under.
    #[serde(default)]
    pub payload_key: String,
}

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpAuth {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_number_fill() {
        let fill = Fill::row_number("R-");
        assert_eq!(fill.resolve(2), json!("R-2"));
    }

    #[test]
    fn test_literal_and_array_fill() {
        assert_eq!(Fill::literal("n/a").resolve(7), json!("n/a"));
        assert_eq!(
            Fill::array(vec![json!("x"), json!("y")]).resolve(0),
            json!(["x", "y"])
        );
    }

    #[test]
    fn test_decode_rule() {
        let rule: Rule = serde_json::from_value(json!({
            "id": "users",
            "delimiter": ",",
            "http": { "url": "http://localhost/x", "payload_key": "data.users" },
            "each_line": [{
                "map": [
                    { "name": "id", "to": "identifier" },
                    { "name": "code", "fill": { "type": "string", "value": "row_number", "prefix": "U-" } },
                    { "name": "tag", "insert_into": "tags", "handlers": ["upper"] }
                ],
                "validation": [{ "field": "id", "type": "number" }]
            }]
        }))
        .unwrap();

        assert_eq!(rule.delimiter(), ',');
        assert_eq!(rule.payload_key(), Some("data.users"));
        assert_eq!(rule.http.as_ref().unwrap().method, "POST");

        let spec = rule.line_spec().unwrap();
        assert_eq!(spec.map[0].target_key(), "identifier");
        assert_eq!(spec.map[1].target_key(), "code");
        assert_eq!(spec.map[1].fill.as_ref().unwrap().resolve(4), json!("U-4"));
        assert_eq!(spec.map[2].insert_target(), Some("tags"));
        assert_eq!(spec.validation[0].kind, ValidationKind::Number);
    }

    #[test]
    fn test_unknown_fill_type_rejected() {
        let result: Result<Fill, _> = serde_json::from_value(json!({ "type": "number", "value": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_delimiter() {
        let rule: Rule = serde_json::from_value(json!({ "id": "r" })).unwrap();
        assert_eq!(rule.delimiter(), ';');
        assert!(rule.line_spec().is_none());
        assert!(rule.payload_key().is_none());
    }
}
