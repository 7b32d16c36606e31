//! REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::transform::pipeline::UploadOutcome;

/// Response sent after an upload was mapped and delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Always "success"; failures use [`error_response`].
    pub status: String,

    pub processed_rows: usize,

    /// Unique job identifier, for correlating logs.
    pub job_id: String,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        UploadResponse {
            status: "success".to_string(),
            processed_rows: outcome.processed_rows,
            job_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({ "error": error })
}
