//! Ingestion configuration
//!
//! Read once at startup, normally from the process environment.

use crate::cache::{DEFAULT_MODEL_TTL, DEFAULT_TWIN_REFRESH};
use crate::identity::DEFAULT_TWIN_IDENTIFIER;
use crate::value::{JsonPath, PathError};
use std::time::Duration;
use thiserror::Error;

pub const TWIN_URL_KEY: &str = "INGESTION_TWIN_URL";
pub const TWIN_IDENTIFIERS_KEY: &str = "INGESTION_TWIN_IDENTIFIERS";
pub const MODEL_IDENTIFIERS_KEY: &str = "INGESTION_MODEL_IDENTIFIERS";
pub const TIMESTAMP_IDENTIFIERS_KEY: &str = "INGESTION_TIMESTAMP_IDENTIFIERS";
pub const GENERIC_ENABLED_KEY: &str = "INGESTION_GENERIC_ENABLED";
pub const OPC_ENABLED_KEY: &str = "INGESTION_OPC_ENABLED";
pub const TIQ_ENABLED_KEY: &str = "INGESTION_TIQ_ENABLED";
pub const EVENT_SOURCE_KEY: &str = "INGESTION_EVENTHUB_NAME";
pub const MODEL_NAMESPACE_KEY: &str = "INGESTION_MODEL_NAMESPACE";
pub const MODEL_CACHE_TTL_KEY: &str = "INGESTION_MODEL_CACHE_TTL_SECS";
pub const TWIN_REFRESH_KEY: &str = "INGESTION_TWIN_REFRESH_SECS";

/// DTMI prefix of auto-provisioned models
pub const DEFAULT_MODEL_NAMESPACE: &str = "dtmi:com:microsoft:autoingest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is missing")]
    Missing(&'static str),

    #[error("setting {key} has invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("setting {key} contains an invalid path")]
    InvalidPath {
        key: &'static str,
        #[source]
        source: PathError,
    },
}

/// Which message families are ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnabledFamilies {
    pub generic: bool,
    pub opc: bool,
    pub twin_iq: bool,
}

impl EnabledFamilies {
    pub fn all() -> Self {
        Self {
            generic: true,
            opc: true,
            twin_iq: true,
        }
    }
}

/// Ingestion engine configuration
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Twin store endpoint
    pub twin_store_url: String,

    /// Paths tried in order to find a generic message's twin id
    pub twin_identifiers: Vec<JsonPath>,

    /// Paths tried in order to find a generic message's model family
    pub model_identifiers: Vec<JsonPath>,

    /// Paths tried in order to find a generic message's source timestamp
    pub timestamp_identifiers: Vec<JsonPath>,

    pub families: EnabledFamilies,

    /// Name of the event source, used in fallback model family names
    pub event_source_name: Option<String>,

    /// Prefix of auto-provisioned model ids
    pub model_namespace: String,

    /// How long a model catalogue listing stays authoritative
    pub model_cache_ttl: Duration,

    /// How often the twin cache re-reads tracked twins
    pub twin_refresh_interval: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            twin_store_url: String::new(),
            twin_identifiers: vec![JsonPath::from_keys(["message", "DeviceId"])],
            model_identifiers: Vec::new(),
            timestamp_identifiers: Vec::new(),
            families: EnabledFamilies::default(),
            event_source_name: None,
            model_namespace: DEFAULT_MODEL_NAMESPACE.to_string(),
            model_cache_ttl: DEFAULT_MODEL_TTL,
            twin_refresh_interval: DEFAULT_TWIN_REFRESH,
        }
    }
}

impl IngestionConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let twin_store_url = get(TWIN_URL_KEY).ok_or(ConfigError::Missing(TWIN_URL_KEY))?;

        let twin_identifiers = match paths(TWIN_IDENTIFIERS_KEY, get(TWIN_IDENTIFIERS_KEY))? {
            list if list.is_empty() => {
                vec![parse_path(TWIN_IDENTIFIERS_KEY, DEFAULT_TWIN_IDENTIFIER)?]
            }
            list => list,
        };

        Ok(Self {
            twin_store_url: twin_store_url.trim().to_string(),
            twin_identifiers,
            model_identifiers: paths(MODEL_IDENTIFIERS_KEY, get(MODEL_IDENTIFIERS_KEY))?,
            timestamp_identifiers: paths(
                TIMESTAMP_IDENTIFIERS_KEY,
                get(TIMESTAMP_IDENTIFIERS_KEY),
            )?,
            families: EnabledFamilies {
                generic: flag(GENERIC_ENABLED_KEY, get(GENERIC_ENABLED_KEY))?,
                opc: flag(OPC_ENABLED_KEY, get(OPC_ENABLED_KEY))?,
                twin_iq: flag(TIQ_ENABLED_KEY, get(TIQ_ENABLED_KEY))?,
            },
            event_source_name: get(EVENT_SOURCE_KEY).map(|v| v.trim().to_string()),
            model_namespace: get(MODEL_NAMESPACE_KEY)
                .map(|v| v.trim().trim_end_matches(':').to_string())
                .unwrap_or(defaults.model_namespace),
            model_cache_ttl: match get(MODEL_CACHE_TTL_KEY) {
                Some(v) => seconds(MODEL_CACHE_TTL_KEY, v, false)?,
                None => defaults.model_cache_ttl,
            },
            twin_refresh_interval: match get(TWIN_REFRESH_KEY) {
                Some(v) => seconds(TWIN_REFRESH_KEY, v, true)?,
                None => defaults.twin_refresh_interval,
            },
        })
    }
}

fn parse_path(key: &'static str, text: &str) -> Result<JsonPath, ConfigError> {
    JsonPath::parse(text).map_err(|source| ConfigError::InvalidPath { key, source })
}

fn paths(key: &'static str, value: Option<String>) -> Result<Vec<JsonPath>, ConfigError> {
    match value {
        Some(v) => {
            JsonPath::parse_list(&v).map_err(|source| ConfigError::InvalidPath { key, source })
        }
        None => Ok(Vec::new()),
    }
}

fn flag(key: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

fn seconds(key: &'static str, value: String, non_zero: bool) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if !(non_zero && secs == 0) => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
