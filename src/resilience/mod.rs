//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → circuit_breaker.rs (admission check per METHOD:url endpoint)
//!     → executor.rs (perform the request under the breaker's timeout)
//!     → circuit_breaker.rs (record success/failure, open circuit past threshold)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every guarded call has a deadline
//! - No retries: one attempt per call, rejected calls are not queued
//! - The time source is injected (clock.rs) so cooldowns are testable

pub mod circuit_breaker;
pub mod clock;
pub mod executor;

pub use circuit_breaker::{BreakerError, BreakerResult, CircuitBreaker, CircuitStatus, EndpointState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{ExecutorError, OutboundExecutor, OutboundRequest, ReqwestExecutor};
