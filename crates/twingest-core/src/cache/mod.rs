//! Side caches over the twin store

pub mod model_cache;
pub mod twin_cache;

pub use model_cache::{ModelCache, ModelIndex, DEFAULT_MODEL_TTL};
pub use twin_cache::{CachedTwin, TwinCache, TwinWrite, DEFAULT_TWIN_REFRESH};
