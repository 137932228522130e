//! Engine configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "duplicates": { "cosine_threshold": 0.85 }, "sync": { "batch_size": 50 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Thresholds for duplicate candidate detection and result sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Pairs with cosine similarity at or above this are candidates.
    pub cosine_threshold: f64,
    /// Pairs with trigram distance at or below this are candidates.
    pub trigram_distance_threshold: f64,
    /// Upper bound on candidates returned and on seriation input.
    pub max_results: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            cosine_threshold: 0.8,
            trigram_distance_threshold: 0.75,
            max_results: 64,
        }
    }
}

/// Sync runner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Staging rows fetched and mapped per batch.
    pub batch_size: usize,
    /// Sources the scheduler runs at the same time.
    pub max_concurrent_sources: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrent_sources: 2,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Duplicate detection thresholds.
    pub duplicates: DuplicateConfig,
    /// Sync runner settings.
    pub sync: SyncConfig,
}

impl EngineConfig {
    const MAX_BATCH_SIZE: usize = 10_000;

    /// Checks ranges.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let d = &self.duplicates;
        if !(-1.0..=1.0).contains(&d.cosine_threshold) {
            return Err(invalid(format!(
                "cosine_threshold must be within [-1, 1] (got {})",
                d.cosine_threshold
            )));
        }
        if !(0.0..=1.0).contains(&d.trigram_distance_threshold) {
            return Err(invalid(format!(
                "trigram_distance_threshold must be within [0, 1] (got {})",
                d.trigram_distance_threshold
            )));
        }
        if d.max_results == 0 {
            return Err(invalid("max_results must be at least 1".to_string()));
        }

        let s = &self.sync;
        if s.batch_size == 0 || s.batch_size > Self::MAX_BATCH_SIZE {
            return Err(invalid(format!(
                "batch_size must be within [1, {}] (got {})",
                Self::MAX_BATCH_SIZE,
                s.batch_size
            )));
        }
        if s.max_concurrent_sources == 0 {
            return Err(invalid("max_concurrent_sources must be at least 1".to_string()));
        }
        Ok(self)
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        config.validate()
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}

fn invalid(reason: String) -> ValidationError {
    ValidationError::InvalidConfig { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default().validate().unwrap();
        assert!((config.duplicates.cosine_threshold - 0.8).abs() < f64::EPSILON);
        assert!((config.duplicates.trigram_distance_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.sync.max_concurrent_sources, 2);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = EngineConfig::from_json_str(r#"{"sync": {"batch_size": 10}}"#).unwrap();
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.max_concurrent_sources, 2);
        assert_eq!(config.duplicates, DuplicateConfig::default());

        let empty = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(empty, EngineConfig::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for json in [
            r#"{"duplicates": {"cosine_threshold": 1.5}}"#,
            r#"{"duplicates": {"trigram_distance_threshold": -0.1}}"#,
            r#"{"duplicates": {"max_results": 0}}"#,
            r#"{"sync": {"batch_size": 0}}"#,
            r#"{"sync": {"max_concurrent_sources": 0}}"#,
            r#"{"sync": "#,
        ] {
            let err = EngineConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidConfig { .. }), "{json}");
        }
    }
}
