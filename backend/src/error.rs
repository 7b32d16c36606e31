//! Error types for the linemap service.
//!
//! One error type per layer:
//!
//! - [`SupervisorError`] - worker process spawning and IPC
//! - [`HookError`] / [`HookExecutionError`] - lifecycle hook failures
//! - [`MappingError`] - rule-driven row mapping
//! - [`ValidationError`] - per-field value validation
//! - [`DeliveryError`] - outbound HTTP delivery
//! - [`ConfigError`] - configuration loading
//! - [`UploadError`] - top-level upload orchestration
//! - [`ServerError`] - server startup
//!
//! Conversion between layers is done through `From` implementations so `?`
//! works across boundaries.

use std::time::Duration;

use thiserror::Error;

use crate::hooks::HookPoint;
use crate::parser::CsvError;

// =============================================================================
// Worker Process Errors
// =============================================================================

/// Errors raised by the [`crate::supervisor::ProcessSupervisor`].
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The executable could not be started.
    #[error("Failed to start worker '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// stdin or stdout could not be attached to the child.
    #[error("Failed to attach {pipe} pipe to worker '{name}'")]
    PipeAttachFailed { name: String, pipe: &'static str },

    /// Writing the request failed.
    #[error("Failed to write to worker '{name}': {source}")]
    WriteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the reply failed.
    #[error("Failed to read from worker '{name}': {source}")]
    ReadFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The output stream closed before a reply line arrived.
    #[error("No output received from worker '{0}'")]
    NoOutput(String),

    /// Waiting for the process failed or it exited unsuccessfully.
    #[error("Failed waiting for worker '{name}': {message}")]
    WaitFailed { name: String, message: String },

    /// No worker is registered under this name.
    #[error("Worker '{0}' does not exist")]
    UnknownWorker(String),

    /// The worker did not reply in time and was shut down.
    #[error("Worker '{name}' did not reply within {after:?}")]
    Timeout { name: String, after: Duration },
}

// =============================================================================
// Hook Errors
// =============================================================================

/// Error returned by a single hook implementation.
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook rejected the context.
    #[error("{0}")]
    Failed(String),

    /// The hook is misconfigured.
    #[error("Invalid hook configuration: {0}")]
    InvalidConfig(String),
}

/// A hook failure as seen by callers of the pipeline.
#[derive(Debug, Error)]
#[error("Hook '{hook}' failed at {point}: {source}")]
pub struct HookExecutionError {
    pub hook: String,
    pub point: HookPoint,
    #[source]
    pub source: HookError,
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Fatal errors while mapping a row or a batch.
///
/// Field-scoped worker and hook failures never surface here; they are logged
/// and the field keeps its previous value.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A required mapping names a column absent from the headers.
    #[error("Required header not found: {0}")]
    MissingRequiredHeader(String),

    /// A required column exists but the row has no cell for it.
    #[error("Required field not found: {0}")]
    MissingRequiredField(String),

    /// The aggregation target already holds a non-array value.
    #[error("Cannot insert into '{target}': existing value is {found}, not an array")]
    InsertIntoTypeConflict { target: String, found: &'static str },

    /// A nested path runs through a scalar, or would replace an object.
    #[error("Nested path '{path}' conflicts with existing value at '{segment}'")]
    NestedPathConflict { path: String, segment: String },

    /// The rule has no line-processing specification.
    #[error("Rule '{0}' has no each_line specification")]
    NoLineSpec(String),

    /// A top-level hook invocation failed.
    #[error("Plugin execution failed: {0}")]
    Hook(#[from] HookExecutionError),
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A row value that does not satisfy its validation entry.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("field {field} must be a number, got: {value}")]
    NotANumber { field: String, value: String },

    #[error("field {field} must be a non-empty string")]
    EmptyString { field: String },

    #[error("field {field} must be a valid email, got: {value}")]
    InvalidEmail { field: String, value: String },

    #[error("field {field} does not match pattern {pattern}, got: {value}")]
    PatternMismatch {
        field: String,
        pattern: String,
        value: String,
    },

    #[error("field {field} has an invalid pattern {pattern}: {message}")]
    InvalidPattern {
        field: String,
        pattern: String,
        message: String,
    },
}

// =============================================================================
// Delivery Errors
// =============================================================================

/// Errors while forwarding a payload to the rule's endpoint.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no HTTP configuration provided in rule '{0}'")]
    MissingHttp(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("unsupported auth type: {0}")]
    UnsupportedAuth(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("HTTP request failed with status {status}: {body}")]
    Status { status: u16, body: String },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("Invalid plugin '{name}': {source}")]
    Plugin {
        name: String,
        #[source]
        source: HookError,
    },
}

// =============================================================================
// Upload Errors (top-level)
// =============================================================================

/// Errors while processing one upload end to end.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to parse CSV: {0}")]
    Parse(#[from] CsvError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("HTTP Failed: {0}")]
    Delivery(#[from] DeliveryError),
}

impl UploadError {
    /// HTTP status code reported to the uploading client.
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::Parse(_) | UploadError::Validation(_) => 400,
            UploadError::Mapping(MappingError::Hook(e))
                if matches!(e.point, HookPoint::EnterRule | HookPoint::ExitRule) =>
            {
                500
            }
            UploadError::Mapping(_) => 400,
            UploadError::Delivery(_) => 500,
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// Errors while starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type SupervisorResult<T> = Result<T, SupervisorError>;

pub type MappingResult<T> = Result<T, MappingError>;

pub type UploadResult<T> = Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let mapping_err = MappingError::MissingRequiredHeader("email".into());
        let upload_err: UploadError = mapping_err.into();
        assert!(upload_err.to_string().contains("email"));
        assert_eq!(upload_err.status_code(), 400);

        let hook_err = MappingError::Hook(HookExecutionError {
            hook: "logger".into(),
            point: HookPoint::EnterRule,
            source: HookError::Failed("boom".into()),
        });
        let upload_err: UploadError = hook_err.into();
        assert_eq!(upload_err.status_code(), 500);
        assert!(upload_err.to_string().contains("logger"));

        let line_err: UploadError = MappingError::Hook(HookExecutionError {
            hook: "logger".into(),
            point: HookPoint::ExitLine,
            source: HookError::Failed("boom".into()),
        })
        .into();
        assert_eq!(line_err.status_code(), 400);
    }

    #[test]
    fn test_insert_into_conflict_format() {
        let err = MappingError::InsertIntoTypeConflict {
            target: "tags".into(),
            found: "a string",
        };
        let msg = err.to_string();
        assert!(msg.contains("tags"));
        assert!(msg.contains("a string"));
    }
}
