//! `mnemo-runtime` – configuration, logging and the engine facade.
//!
//! - [`config`] – `~/.mnemo/config.toml` with `MNEMO_*` environment
//!   overrides.
//! - [`telemetry`] – `tracing` subscriber initialisation.
//! - [`engine`] – [`MemoryEngine`], the operations external command layers
//!   call.

pub mod config;
pub mod engine;
pub mod telemetry;

pub use config::{Config, ConfigError, DecayConfig, ScorerConfig};
pub use engine::{EngineError, MemoryEngine};
pub use telemetry::init_tracing;
