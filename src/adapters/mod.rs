//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, file I/O, HTTP servers). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `connectors`: Currency node bridges over HTTP
//! - `exchange`: REST ticker feeding the exchange price source
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: Atomic order records and the JSONL audit log

pub mod connectors;
pub mod exchange;
pub mod metrics;
pub mod persistence;
