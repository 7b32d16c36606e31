//! Outbound delivery of mapped documents.

use reqwest::Method;
use serde_json::{Map, Value};

use crate::api::logs::log_info;
use crate::error::DeliveryError;
use crate::models::Rule;

/// Wrap `documents` under a dotted `payload_key`, or return the bare array.
///
/// `"data.items"` gives `{"data": {"items": [...]}}`.
pub fn shape_payload(payload_key: Option<&str>, documents: Vec<Value>) -> Value {
    let list = Value::Array(documents);
    let Some(key) = payload_key.filter(|k| !k.is_empty()) else {
        return list;
    };

    key.rsplit('.').fold(list, |inner, part| {
        let mut wrapper = Map::new();
        wrapper.insert(part.to_string(), inner);
        Value::Object(wrapper)
    })
}

/// Send `payload` to the rule's HTTP target.
///
/// A response status of 400 or above is an error carrying the body.
pub async fn send_payload(client: &reqwest::Client, rule: &Rule, payload: &Value) -> Result<(), DeliveryError> {
    let http = rule
        .http
        .as_ref()
        .ok_or_else(|| DeliveryError::MissingHttp(rule.id.clone()))?;

    let method = Method::from_bytes(http.method.to_uppercase().as_bytes())
        .map_err(|_| DeliveryError::InvalidMethod(http.method.clone()))?;

    let mut request = client.request(method, &http.url).json(payload);
    for header in &http.headers {
        request = request.header(&header.name, &header.value);
    }

    if let Some(auth) = &http.auth {
        request = match auth.kind.as_str() {
            "bearer" => request.bearer_auth(&auth.value),
            "basic" => request.basic_auth(&auth.value, None::<&str>),
            other => return Err(DeliveryError::UnsupportedAuth(other.to_string())),
        };
    }

    let response = request
        .send()
        .await
        .map_err(|e| DeliveryError::Request(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| DeliveryError::Request(e.to_string()))?;

    log_info(format!("Response from {}: {} {}", http.url, status.as_u16(), body));

    if status.as_u16() >= 400 {
        return Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}
