//! Configuration
//!
//! - `DocTypeOptions`: the per-type option block (index, connection alias,
//!   type name, bulk settings, read-only flag).
//! - `RetryConfig`: the retry policy used for each class of remote call.
//!
//! Both deserialize from TOML; durations are written in milliseconds.

use crate::error::DocumentError;
use crate::mapping::Mapping;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bulk threshold used when no type in the chain sets one
pub const DEFAULT_BULK_SIZE: usize = 100;

/// Option block of a document type declaration
///
/// Every entry is optional so that unset entries can be inherited from base
/// types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocTypeOptions {
    /// Destination index
    pub index: Option<String>,
    /// Connection alias
    pub using: Option<String>,
    /// Type name; derived from the declared name when unset
    pub doc_type: Option<String>,
    /// Pre-built mapping to start from
    #[serde(skip)]
    pub mapping: Option<Mapping>,
    /// Route every save through the bulk queue
    pub bulk: Option<bool>,
    /// Pending documents per index before an automatic flush
    pub bulk_size: Option<usize>,
    /// Refuse saves unless forced
    pub read_only: Option<bool>,
}

impl DocTypeOptions {
    pub fn from_toml_str(raw: &str) -> Result<Self, DocumentError> {
        toml::from_str(raw).map_err(|e| DocumentError::Configuration(e.to_string()))
    }
}

/// Retry policies per call class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Single-document index/get/delete
    pub document: RetryPolicy,
    /// Index creation/deletion, mapping sync, count
    pub structural: RetryPolicy,
    /// Bulk queue flushes
    pub bulk: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            document: RetryPolicy::document_default(),
            structural: RetryPolicy::structural_default(),
            bulk: RetryPolicy::bulk_default(),
        }
    }
}

impl RetryConfig {
    /// Configuration for tests (millisecond waits, bounded attempts)
    pub fn test() -> Self {
        RetryConfig {
            document: RetryPolicy::fixed(3, Duration::from_millis(1)),
            structural: RetryPolicy::exponential(Duration::from_millis(1), Duration::from_millis(4))
                .with_max_attempts(5),
            bulk: RetryPolicy::fixed(3, Duration::from_millis(1)),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, DocumentError> {
        toml::from_str(raw).map_err(|e| DocumentError::Configuration(e.to_string()))
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
