//! Observability subsystem.
//!
//! Structured logs are the only observability output: request traces from
//! `tower-http` and circuit transitions from the resilience subsystem.

pub mod logging;
