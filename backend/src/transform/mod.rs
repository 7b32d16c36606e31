//! Row transformation.
//!
//! - [`engine`]: rule-driven mapping of rows into documents
//! - [`document`]: nested assignment and array aggregation
//! - [`pipeline`]: upload orchestration around the engine

pub mod document;
pub mod engine;
pub mod pipeline;

pub use engine::{Batch, MappingEngine};
pub use pipeline::{CsvInfo, UploadOptions, UploadOutcome, UploadPipeline};
