//! Tracing setup for hub-gateway: fmt logging with optional OTLP export,
//! plus span builders shared by the request path.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
