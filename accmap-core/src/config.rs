//! Configuration types

use crate::error::{AccmapResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Highest number of bound parameters SQLite accepts in one statement.
pub const MAX_SQL_PARAMETERS: usize = 32_766;

/// How the first line of a classification source file is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderPolicy {
    /// Skip line 1 only when its value field is not an integer
    #[default]
    Auto,
    /// Always skip line 1
    Skip,
    /// Never skip anything
    None,
}

impl HeaderPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Some(HeaderPolicy::Auto),
            "skip" => Some(HeaderPolicy::Skip),
            "none" => Some(HeaderPolicy::None),
            _ => None,
        }
    }
}

/// Tuning knobs shared by writers and readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTuning {
    /// SQLite page cache size in KiB
    pub cache_size_kib: i64,
    /// Maximum accessions bound into a single `IN (...)` lookup
    pub max_batch_size: usize,
    /// Header handling for classification source files
    pub header: HeaderPolicy,
}

impl Default for StoreTuning {
    fn default() -> Self {
        Self {
            cache_size_kib: 64 * 1024,
            max_batch_size: 10_000,
            header: HeaderPolicy::Auto,
        }
    }
}

impl StoreTuning {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ACCMAP_CACHE_SIZE_KIB`: page cache size in KiB (default: 65536)
    /// - `ACCMAP_MAX_BATCH_SIZE`: accessions per batched query (default: 10000)
    /// - `ACCMAP_SOURCE_HEADER`: `auto`, `skip` or `none` (default: auto)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_size_kib: std::env::var("ACCMAP_CACHE_SIZE_KIB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_size_kib),
            max_batch_size: std::env::var("ACCMAP_MAX_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_batch_size),
            header: std::env::var("ACCMAP_SOURCE_HEADER")
                .ok()
                .and_then(|s| HeaderPolicy::parse(&s))
                .unwrap_or(defaults.header),
        }
    }

    /// Validate the tuning values.
    pub fn validate(&self) -> AccmapResult<()> {
        if self.cache_size_kib <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_size_kib".to_string(),
                value: self.cache_size_kib.to_string(),
                reason: "cache_size_kib must be greater than 0".to_string(),
            }
            .into());
        }

        if self.max_batch_size == 0 || self.max_batch_size > MAX_SQL_PARAMETERS {
            return Err(ConfigError::InvalidValue {
                field: "max_batch_size".to_string(),
                value: self.max_batch_size.to_string(),
                reason: format!("max_batch_size must be between 1 and {}", MAX_SQL_PARAMETERS),
            }
            .into());
        }

        Ok(())
    }
}

/// Post-processing applied to every raw value before a lookup returns it.
#[derive(Clone)]
pub struct ValueFilter(Arc<dyn Fn(i64) -> i64 + Send + Sync>);

impl ValueFilter {
    pub fn new(f: impl Fn(i64) -> i64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Returns raw values unchanged.
    pub fn identity() -> Self {
        Self::new(|value| value)
    }

    /// Maps negative raw values to the absence sentinel.
    pub fn non_negative() -> Self {
        Self::new(|value| value.max(0))
    }

    pub fn apply(&self, value: i64) -> i64 {
        (self.0)(value)
    }
}

impl Default for ValueFilter {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueFilter(..)")
    }
}

/// Predicate over a store's general info string, deciding whether this
/// reader may open the store.
#[derive(Clone)]
pub struct CompatibilityFilter(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl CompatibilityFilter {
    pub fn new(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn accept_all() -> Self {
        Self::new(|_| true)
    }

    /// Accepts only stores whose info names the given edition marker.
    pub fn require_edition(marker: impl Into<String>) -> Self {
        let line = edition_line(&marker.into());
        Self::new(move |info| info.lines().any(|l| l == line))
    }

    /// Rejects stores whose info names the given edition marker.
    pub fn reject_edition(marker: impl Into<String>) -> Self {
        let line = edition_line(&marker.into());
        Self::new(move |info| !info.lines().any(|l| l == line))
    }

    pub fn accepts(&self, info: &str) -> bool {
        (self.0)(info)
    }
}

/// Line used for the edition marker inside the synthesized info string.
pub fn edition_line(marker: &str) -> String {
    format!("edition: {}", marker)
}

impl Default for CompatibilityFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl fmt::Debug for CompatibilityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompatibilityFilter(..)")
    }
}

/// Everything a writer or reader needs, passed explicitly at construction.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub tuning: StoreTuning,
    pub value_filter: ValueFilter,
    pub compatibility: CompatibilityFilter,
}

impl StoreConfig {
    pub fn with_tuning(mut self, tuning: StoreTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_value_filter(mut self, filter: ValueFilter) -> Self {
        self.value_filter = filter;
        self
    }

    pub fn with_compatibility(mut self, filter: CompatibilityFilter) -> Self {
        self.compatibility = filter;
        self
    }

    pub fn validate(&self) -> AccmapResult<()> {
        self.tuning.validate()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccmapError;

    #[test]
    fn test_default_tuning_is_valid() {
        assert!(StoreTuning::default().validate().is_ok());
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        let zero = StoreTuning {
            max_batch_size: 0,
            ..StoreTuning::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(AccmapError::Config(ConfigError::InvalidValue { .. }))
        ));

        let too_large = StoreTuning {
            max_batch_size: MAX_SQL_PARAMETERS + 1,
            ..StoreTuning::default()
        };
        assert!(too_large.validate().is_err());

        let at_limit = StoreTuning {
            max_batch_size: MAX_SQL_PARAMETERS,
            ..StoreTuning::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_cache_size_must_be_positive() {
        let tuning = StoreTuning {
            cache_size_kib: 0,
            ..StoreTuning::default()
        };
        let err = tuning.validate().expect_err("zero cache must fail");
        assert!(format!("{}", err).contains("cache_size_kib"));
    }

    #[test]
    fn test_tuning_serde_roundtrip() {
        let tuning = StoreTuning {
            cache_size_kib: 2048,
            max_batch_size: 500,
            header: HeaderPolicy::Skip,
        };
        let json = serde_json::to_string(&tuning).expect("serialize");
        assert!(json.contains("\"skip\""));
        let back: StoreTuning = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, tuning);
    }

    #[test]
    fn test_header_policy_parse() {
        assert_eq!(HeaderPolicy::parse("AUTO"), Some(HeaderPolicy::Auto));
        assert_eq!(HeaderPolicy::parse("skip"), Some(HeaderPolicy::Skip));
        assert_eq!(HeaderPolicy::parse("none"), Some(HeaderPolicy::None));
        assert_eq!(HeaderPolicy::parse("sometimes"), None);
    }

    #[test]
    fn test_value_filters() {
        assert_eq!(ValueFilter::identity().apply(-5), -5);
        assert_eq!(ValueFilter::non_negative().apply(-5), 0);
        assert_eq!(ValueFilter::non_negative().apply(42), 42);

        let capped = ValueFilter::new(|v| if v > 1000 { 0 } else { v });
        assert_eq!(capped.apply(1001), 0);
        assert_eq!(capped.apply(7), 7);
    }

    #[test]
    fn test_compatibility_filters() {
        let info = "Prokaryotic mappings\nedition: ultimate\nTaxonomy: NCBI taxonomy, 12";
        assert!(CompatibilityFilter::accept_all().accepts(info));
        assert!(CompatibilityFilter::require_edition("ultimate").accepts(info));
        assert!(!CompatibilityFilter::require_edition("community").accepts(info));
        assert!(!CompatibilityFilter::reject_edition("ultimate").accepts(info));
        assert!(CompatibilityFilter::reject_edition("community").accepts(info));
    }

    #[test]
    fn test_edition_marker_matches_whole_line() {
        let info = "edition: ultimate-preview";
        assert!(!CompatibilityFilter::require_edition("ultimate").accepts(info));
    }
}
