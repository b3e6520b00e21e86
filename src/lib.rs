//! Minimal HTTP microservice template with a per-endpoint circuit breaker
//! for outbound calls.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::CircuitBreaker;
