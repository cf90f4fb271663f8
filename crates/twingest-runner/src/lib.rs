//! Twingest Runner
//!
//! Lifecycle around the ingestion engine:
//! - Configuration loading from the environment
//! - Background twin cache refresh with cooperative shutdown
//! - Tracing subscriber setup

pub mod refresh;
pub mod runner;
pub mod telemetry;

pub use refresh::spawn_twin_refresh;
pub use runner::Runner;
pub use telemetry::init_tracing;
