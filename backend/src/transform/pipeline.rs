//! Upload pipeline: parse, validate, map, shape and deliver one file.
//!
//! # Example
//!
//! ```rust,ignore
//! use linemap::transform::pipeline::{UploadPipeline, UploadOptions};
//!
//! let pipeline = UploadPipeline::new(engine);
//! let outcome = pipeline.run(&rule, &bytes, UploadOptions { dry: true }).await?;
//! println!("{}", outcome.payload);
//! ```

use serde::Serialize;
use serde_json::Value;

use super::engine::MappingEngine;
use crate::api::logs::{log_info, log_success, log_warning};
use crate::delivery::{send_payload, shape_payload};
use crate::error::{UploadError, UploadResult};
use crate::models::Rule;
use crate::parser::parse_bytes;
use crate::validation::validate_rows;

/// Options for one upload.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Return the payload instead of delivering it.
    pub dry: bool,
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of a processed upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub processed_rows: usize,
    /// Shaped payload, as sent (or as it would have been sent).
    pub payload: Value,
    pub delivered: bool,
    pub csv_info: CsvInfo,
}

/// Runs uploads against a shared [`MappingEngine`].
#[derive(Clone)]
pub struct UploadPipeline {
    engine: MappingEngine,
    client: reqwest::Client,
}

impl UploadPipeline {
    pub fn new(engine: MappingEngine) -> Self {
        Self {
            engine,
            client: reqwest::Client::new(),
        }
    }

    /// Parse, validate and map `bytes`, then shape the payload.
    pub async fn prepare(&self, rule: &Rule, bytes: &[u8]) -> UploadResult<(Value, usize, CsvInfo)> {
        let parsed = parse_bytes(bytes, rule.delimiter())?;
        log_success(format!("Detected encoding: {}", parsed.encoding));
        log_success(format!("Read {} rows", parsed.rows.len()));

        let csv_info = CsvInfo {
            encoding: parsed.encoding.clone(),
            delimiter: parsed.delimiter,
            headers: parsed.headers.clone(),
            row_count: parsed.rows.len(),
        };

        let validations = rule
            .line_spec()
            .map(|spec| spec.validation.as_slice())
            .unwrap_or_default();
        if let Err((row, err)) = validate_rows(&parsed.rows, &parsed.headers, validations) {
            log_warning(format!("Row {} failed validation: {}", row, err));
            return Err(err.into());
        }

        let batch = self
            .engine
            .map_rows(&parsed.rows, &parsed.headers, rule)
            .await?;
        log_success(format!(
            "Mapped {} rows into {} documents",
            batch.processed_rows,
            batch.documents.len()
        ));

        let payload = shape_payload(rule.payload_key(), batch.documents);
        Ok((payload, batch.processed_rows, csv_info))
    }

    /// Process one upload end to end.
    pub async fn run(&self, rule: &Rule, bytes: &[u8], options: UploadOptions) -> UploadResult<UploadOutcome> {
        log_info(format!("Processing upload for rule {}", rule.id));
        let (payload, processed_rows, csv_info) = self.prepare(rule, bytes).await?;

        if !options.dry {
            send_payload(&self.client, rule, &payload)
                .await
                .map_err(UploadError::from)?;
            log_success(format!("Delivered {} rows for rule {}", processed_rows, rule.id));
        }

        Ok(UploadOutcome {
            processed_rows,
            payload,
            delivered: !options.dry,
            csv_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeliveryError, MappingError};
    use crate::hooks::HookPipeline;
    use crate::supervisor::ProcessSupervisor;
    use serde_json::json;
    use std::sync::Arc;

    fn pipeline() -> UploadPipeline {
        UploadPipeline::new(MappingEngine::new(
            Arc::new(ProcessSupervisor::new("./no-such-handlers")),
            Arc::new(HookPipeline::new()),
        ))
    }

    fn rule(extra: Value) -> Rule {
        let mut base = json!({
            "id": "people",
            "each_line": [{
                "map": [
                    { "name": "id", "to": "identifier" },
                    { "name": "name" },
                    { "name": "email", "required": true }
                ],
                "validation": [{ "field": "id", "type": "number" }]
            }]
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    const CSV: &[u8] = b"id;name;email\n1;Alice;alice@x.com\n2;Bob;bob@x.com\n";

    #[tokio::test]
    async fn test_dry_run_shapes_payload() {
        let rule = rule(json!({ "http": { "url": "http://127.0.0.1:9", "payload_key": "data.people" } }));
        let outcome = pipeline()
            .run(&rule, CSV, UploadOptions { dry: true })
            .await
            .unwrap();

        assert_eq!(outcome.processed_rows, 2);
        assert!(!outcome.delivered);
        assert_eq!(outcome.csv_info.headers, vec!["id", "name", "email"]);
        assert_eq!(
            outcome.payload,
            json!({ "data": { "people": [
                { "identifier": "1", "name": "Alice", "email": "alice@x.com" },
                { "identifier": "2", "name": "Bob", "email": "bob@x.com" }
            ] } })
        );
    }

    #[tokio::test]
    async fn test_validation_failure_is_bad_request() {
        let err = pipeline()
            .run(&rule(json!({})), b"id;name;email\nx;Alice;a@x\n", UploadOptions { dry: true })
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_mapping_failure_is_bad_request() {
        let err = pipeline()
            .run(&rule(json!({})), b"id;name\n1;Alice\n", UploadOptions { dry: true })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Mapping(MappingError::MissingRequiredHeader(_))
        ));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_rule_delimiter_is_used() {
        let rule = rule(json!({ "delimiter": "," }));
        let outcome = pipeline()
            .run(&rule, b"id,name,email\n7,Eve,eve@x.com\n", UploadOptions { dry: true })
            .await
            .unwrap();
        assert_eq!(outcome.payload[0]["identifier"], "7");
    }

    #[tokio::test]
    async fn test_delivery_without_http_fails() {
        let err = pipeline()
            .run(&rule(json!({})), CSV, UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Delivery(DeliveryError::MissingHttp(_))));
        assert_eq!(err.status_code(), 500);
    }
}
