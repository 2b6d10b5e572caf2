//! # bw-observability
//!
//! Logging and metrics infrastructure for Breakwater.
//!
//! This crate provides structured logging with tracing and the pipeline
//! metrics collector. The collector is an explicitly passed handle, not a
//! process-wide singleton: components receive an `Arc<PipelineMetrics>`
//! and record through it.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::{PipelineMetrics, SeverityBucket};
