//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (optional) → process environment
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, apply env overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{
    AppConfig, BreakerConfig, ListenerConfig, ObservabilityConfig, ServiceConfig, TimeoutConfig,
    UpstreamConfig,
};
pub use validation::ValidationError;
