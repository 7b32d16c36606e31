//! # linemap - rule-driven CSV to JSON mapping
//!
//! linemap receives delimited text uploads, maps every row to a JSON document
//! following a per-endpoint rule, and forwards the documents over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌───────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Parser  │──▶│ Validation │──▶│ MappingEngine │──▶│ Delivery │
//! │ (bytes)  │   │(encoding)│   │  (per row) │   │ hooks+workers │   │ (reqwest)│
//! └──────────┘   └──────────┘   └────────────┘   └───────────────┘   └──────────┘
//!                                                   │         │
//!                                          HookPipeline   ProcessSupervisor
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use linemap::{Config, MappingEngine};
//!
//! let config = Config::load("linemap.json")?;
//! let supervisor = Arc::new(config.build_supervisor());
//! supervisor.spawn_persistent(&config.handlers).await?;
//!
//! let engine = MappingEngine::new(supervisor, Arc::new(config.build_hooks()?));
//! let rule = config.rule("people").unwrap();
//! let batch = engine.map_rows(&rows, &headers, rule).await?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types, one per layer
//! - [`models`] - Rule, mapping and delivery models
//! - [`config`] - Configuration file and environment settings
//! - [`supervisor`] - External worker processes
//! - [`hooks`] - Lifecycle hook pipeline and compiled-in hooks
//! - [`transform`] - Mapping engine and upload pipeline
//! - [`parser`] - CSV parsing with encoding detection
//! - [`validation`] - Per-column value checks
//! - [`delivery`] - Payload shaping and HTTP delivery
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Workers and hooks
pub mod hooks;
pub mod supervisor;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Delivery
pub mod delivery;

// HTTP API
pub mod api;

#[cfg(all(test, unix))]
mod test_support;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, DeliveryError, HookError, HookExecutionError, MappingError, ServerError,
    SupervisorError, UploadError, ValidationError,
};

// =============================================================================
// Re-exports - Models and configuration
// =============================================================================

pub use config::{Config, HandlerConfig, Settings};
pub use models::{Fill, FillKind, HttpTarget, LineSpec, Mapping, Rule, Validation, ValidationKind};

// =============================================================================
// Re-exports - Core
// =============================================================================

pub use hooks::{Hook, HookContext, HookPipeline, HookPoint, PluginConfig};
pub use supervisor::ProcessSupervisor;
pub use transform::{Batch, MappingEngine, UploadOptions, UploadOutcome, UploadPipeline};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{decode_content, detect_encoding, parse_bytes, parse_file, CsvError, ParsedCsv};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, UploadResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
