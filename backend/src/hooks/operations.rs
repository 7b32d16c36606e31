//! Value operations hook.
//!
//! Rewrites field values at `ENTER_LINE` with an ordered list of operations:
//!
//! ```json
//! { "type": "operations", "name": "clean_email",
//!   "fields": ["email"],
//!   "operations": [{"type": "trim"}, {"type": "lowercase"}] }
//! ```

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Hook, HookContext};
use crate::error::HookError;

/// A single value transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Trim,

    Uppercase,

    Lowercase,

    /// Regex replacement over the whole value.
    Replace {
        pattern: String,
        #[serde(default)]
        value: String,
        #[serde(skip)]
        compiled: Option<Regex>,
    },

    PadStart {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    PadEnd {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    EnsurePrefix { value: String },

    EnsureSuffix { value: String },

    /// Lookup table; unmapped values fall back to `default_unmapped` or stay as is.
    Map {
        mapping: HashMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default)]
        default_unmapped: Option<String>,
    },

    /// Split into an array of trimmed parts.
    Split {
        #[serde(default = "default_split_separator")]
        separator: String,
    },

    /// Parse an integer, ignoring non-digit characters. Unparsable becomes null.
    ToNumber,

    DigitsOnly,

    Alphanumeric,
}

fn default_pad_char() -> String {
    "0".to_string()
}

fn default_split_separator() -> String {
    ",".to_string()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn pad(s: String, length: usize, pad_char: &str, at_start: bool) -> String {
    let count = length.saturating_sub(s.chars().count());
    if count == 0 {
        return s;
    }
    let padding: String = std::iter::repeat(pad_char.chars().next().unwrap_or('0'))
        .take(count)
        .collect();
    if at_start {
        padding + &s
    } else {
        s + &padding
    }
}

impl Operation {
    /// Compile regex patterns ahead of time.
    pub fn prepare(&mut self) -> Result<(), regex::Error> {
        if let Operation::Replace {
            pattern, compiled, ..
        } = self
        {
            *compiled = Some(Regex::new(pattern)?);
        }
        Ok(())
    }

    /// Apply this operation. Arrays are transformed element-wise; values the
    /// operation does not understand are returned unchanged.
    pub fn apply(&self, value: &Value) -> Value {
        if let (Value::Array(items), false) = (value, matches!(self, Operation::Split { .. })) {
            return Value::Array(items.iter().map(|v| self.apply(v)).collect());
        }

        if let Operation::ToNumber = self {
            if value.is_number() {
                return value.clone();
            }
            return as_text(value)
                .and_then(|s| {
                    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
                    let signed = if s.trim().starts_with('-') {
                        format!("-{}", digits)
                    } else {
                        digits
                    };
                    signed.parse::<i64>().ok()
                })
                .map(|n| Value::Number(n.into()))
                .unwrap_or(Value::Null);
        }

        let Some(s) = as_text(value) else {
            return value.clone();
        };

        match self {
            Operation::Trim => Value::String(s.trim().to_string()),
            Operation::Uppercase => Value::String(s.to_uppercase()),
            Operation::Lowercase => Value::String(s.to_lowercase()),
            Operation::Replace {
                pattern,
                value: replacement,
                compiled,
            } => {
                let re = match compiled {
                    Some(re) => re.clone(),
                    None => match Regex::new(pattern) {
                        Ok(re) => re,
                        Err(_) => return value.clone(),
                    },
                };
                Value::String(re.replace_all(&s, replacement.as_str()).into_owned())
            }
            Operation::PadStart { length, char } => Value::String(pad(s, *length, char, true)),
            Operation::PadEnd { length, char } => Value::String(pad(s, *length, char, false)),
            Operation::EnsurePrefix { value: prefix } if !s.starts_with(prefix.as_str()) => {
                Value::String(format!("{}{}", prefix, s))
            }
            Operation::EnsureSuffix { value: suffix } if !s.ends_with(suffix.as_str()) => {
                Value::String(format!("{}{}", s, suffix))
            }
            Operation::EnsurePrefix { .. } | Operation::EnsureSuffix { .. } => Value::String(s),
            Operation::Map {
                mapping,
                case_insensitive,
                default_unmapped,
            } => {
                let found = if *case_insensitive {
                    let key = s.to_lowercase();
                    mapping
                        .iter()
                        .find(|(k, _)| k.to_lowercase() == key)
                        .map(|(_, v)| v)
                } else {
                    mapping.get(&s)
                };
                match (found, default_unmapped) {
                    (Some(v), _) => Value::String(v.clone()),
                    (None, Some(d)) => Value::String(d.clone()),
                    (None, None) => Value::String(s),
                }
            }
            Operation::Split { separator } => Value::Array(
                s.split(separator.as_str())
                    .map(|p| Value::String(p.trim().to_string()))
                    .collect(),
            ),
            Operation::DigitsOnly => {
                Value::String(s.chars().filter(|c| c.is_ascii_digit()).collect())
            }
            Operation::Alphanumeric => {
                Value::String(s.chars().filter(|c| c.is_alphanumeric()).collect())
            }
            Operation::ToNumber => unreachable!("handled above"),
        }
    }
}

/// Hook applying [`Operation`]s to field values.
pub struct OperationsHook {
    name: String,
    fields: Vec<String>,
    operations: Vec<Operation>,
}

impl OperationsHook {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<String>,
        mut operations: Vec<Operation>,
    ) -> Result<Self, HookError> {
        for op in &mut operations {
            op.prepare()
                .map_err(|e| HookError::InvalidConfig(e.to_string()))?;
        }
        Ok(Self {
            name: name.into(),
            fields,
            operations,
        })
    }

    fn applies_to(&self, field: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == field)
    }
}

impl Hook for OperationsHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_enter_line(&self, mut ctx: HookContext) -> Result<HookContext, HookError> {
        if !ctx.field.as_deref().is_some_and(|f| self.applies_to(f)) {
            return Ok(ctx);
        }
        if let Some(value) = ctx.value.take() {
            ctx.value = Some(self.operations.iter().fold(value, |v, op| op.apply(&v)));
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ops(value: Value) -> Vec<Operation> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_trim_and_case() {
        assert_eq!(Operation::Trim.apply(&json!("  hi  ")), json!("hi"));
        assert_eq!(Operation::Uppercase.apply(&json!("hi")), json!("HI"));
        assert_eq!(Operation::Lowercase.apply(&json!("HI")), json!("hi"));
    }

    #[test]
    fn test_map_falls_back() {
        let mut mapping = HashMap::new();
        mapping.insert("CA".to_string(), "Composer".to_string());

        let op = Operation::Map {
            mapping: mapping.clone(),
            case_insensitive: true,
            default_unmapped: None,
        };
        assert_eq!(op.apply(&json!("ca")), json!("Composer"));
        assert_eq!(op.apply(&json!("X")), json!("X"));

        let op = Operation::Map {
            mapping,
            case_insensitive: false,
            default_unmapped: Some("Other".into()),
        };
        assert_eq!(op.apply(&json!("ca")), json!("Other"));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Operation::ToNumber.apply(&json!("123-456")), json!(123456));
        assert_eq!(Operation::ToNumber.apply(&json!("-42")), json!(-42));
        assert_eq!(Operation::ToNumber.apply(&json!("abc")), Value::Null);
    }

    #[test]
    fn test_split_then_trim_arrays() {
        let list = ops(json!([{ "type": "split", "separator": ";" }, { "type": "uppercase" }]));
        let out = list.iter().fold(json!("a; b ;c"), |v, op| op.apply(&v));
        assert_eq!(out, json!(["A", "B", "C"]));
    }

    #[test]
    fn test_padding_and_affixes() {
        let pad = Operation::PadStart {
            length: 5,
            char: "0".into(),
        };
        assert_eq!(pad.apply(&json!("42")), json!("00042"));
        let prefix = Operation::EnsurePrefix { value: "T".into() };
        assert_eq!(prefix.apply(&json!("T1")), json!("T1"));
        assert_eq!(prefix.apply(&json!("1")), json!("T1"));
    }

    #[test]
    fn test_hook_respects_field_filter() {
        let hook = OperationsHook::new(
            "clean",
            vec!["email".into()],
            ops(json!([{ "type": "trim" }, { "type": "lowercase" }])),
        )
        .unwrap();

        let ctx = HookContext::default().with_field("email", json!(" Bob@X.COM "));
        let out = hook.on_enter_line(ctx).unwrap();
        assert_eq!(out.value, Some(json!("bob@x.com")));

        let ctx = HookContext::default().with_field("name", json!(" Bob "));
        let out = hook.on_enter_line(ctx).unwrap();
        assert_eq!(out.value, Some(json!(" Bob ")));
    }

    #[test]
    fn test_replace_with_compiled_pattern() {
        let hook = OperationsHook::new(
            "digits",
            Vec::new(),
            ops(json!([{ "type": "replace", "pattern": "[-. ]", "value": "" }])),
        )
        .unwrap();

        let ctx = HookContext::default().with_field("phone", json!("01-23.45 67"));
        let out = hook.on_enter_line(ctx).unwrap();
        assert_eq!(out.value, Some(json!("01234567")));
    }
}
