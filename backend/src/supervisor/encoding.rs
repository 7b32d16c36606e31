//! Wire encoding of values sent to workers.
//!
//! Persistent workers speak a line protocol, so a request must fit on one
//! line:
//!
//! | Value                     | Request line                  |
//! |---------------------------|-------------------------------|
//! | string without CR/LF      | the string, verbatim          |
//! | string with CR/LF         | JSON string literal (escaped) |
//! | number / bool             | JSON text                     |
//! | null                      | empty line                    |
//! | array / object            | compact JSON                  |
//!
//! One-shot workers receive the whole input on stdin, so strings are sent raw
//! and everything else as compact JSON.

use serde_json::Value;

/// Encode a value as a single request line, without the trailing newline.
pub fn request_line(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains(['\n', '\r']) => Value::String(s.clone()).to_string(),
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Encode a value as the full stdin payload of a one-shot worker.
pub fn one_shot_input(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Null => Vec::new(),
        other => other.to_string().into_bytes(),
    }
}
