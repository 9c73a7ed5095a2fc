//! Logging, tracing and metric helpers shared by the CVI gateway binaries.
//!
//! Binaries call [`install`] (or [`init_telemetry`] with an explicit
//! [`TelemetryConfig`]) once at startup. Libraries only emit `tracing` events
//! and record metrics through the helpers re-exported here.

mod config;
mod context;
mod recorders;
mod tracing_init;

pub use config::{LogFormat, OtlpExport, OtlpProtocol, TelemetryConfig};
pub use context::TelemetryLabels;
pub use recorders::{record_counter, record_gauge, record_histogram, with_common_fields};
pub use tracing_init::{init_telemetry, install};

