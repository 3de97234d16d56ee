use crate::errors::{ShelfError, ShelfResult};
use crate::models::DEFAULT_COLUMN_COUNT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SLOT_SEARCH_LIMIT: usize = 100;
pub const DEFAULT_MAX_COLUMN_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShelfConfig {
    /// Positions probed per column before the allocator falls back.
    pub slot_search_limit: usize,
    pub default_column_count: usize,
    pub max_column_count: usize,
    pub database_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            slot_search_limit: DEFAULT_SLOT_SEARCH_LIMIT,
            default_column_count: DEFAULT_COLUMN_COUNT,
            max_column_count: DEFAULT_MAX_COLUMN_COUNT,
            database_path: None,
            log_dir: None,
        }
    }
}

impl ShelfConfig {
    pub fn load(path: &Path) -> ShelfResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.to_string_lossy(), "no shelf config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|error| ShelfError::Validation(format!("malformed config {}: {}", path.display(), error)))?;
        config.validate()?;
        Ok(config)
    }

    /// Deep-merges a partial JSON patch over this config.
    pub fn merged(&self, update: serde_json::Value) -> ShelfResult<Self> {
        let mut merged = serde_json::to_value(self)?;
        merge_json(&mut merged, update);
        let config: Self = serde_json::from_value(merged)
            .map_err(|error| ShelfError::Validation(format!("invalid config patch: {}", error)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ShelfResult<()> {
        if self.slot_search_limit == 0 {
            return Err(ShelfError::Validation("slotSearchLimit must be at least 1".to_string()));
        }
        if self.max_column_count == 0 {
            return Err(ShelfError::Validation("maxColumnCount must be at least 1".to_string()));
        }
        if self.default_column_count == 0 || self.default_column_count > self.max_column_count {
            return Err(ShelfError::Validation(format!(
                "defaultColumnCount must be between 1 and {}",
                self.max_column_count
            )));
        }
        Ok(())
    }
}

pub(crate) fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ShelfConfig::load(&dir.path().join("absent.json")).expect("config");
        assert_eq!(config, ShelfConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shelf.json");
        fs::write(&path, r#"{"slotSearchLimit": 12}"#).expect("write config");
        let config = ShelfConfig::load(&path).expect("config");
        assert_eq!(config.slot_search_limit, 12);
        assert_eq!(config.default_column_count, DEFAULT_COLUMN_COUNT);
    }

    #[test]
    fn malformed_file_is_a_validation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shelf.json");
        fs::write(&path, "{not json").expect("write config");
        assert!(matches!(ShelfConfig::load(&path), Err(ShelfError::Validation(_))));
    }

    #[test]
    fn merged_rejects_out_of_range_column_defaults() {
        let config = ShelfConfig::default();
        let updated = config.merged(json!({"defaultColumnCount": 6})).expect("merge");
        assert_eq!(updated.default_column_count, 6);
        assert!(config.merged(json!({"defaultColumnCount": 11})).is_err());
        assert!(config.merged(json!({"slotSearchLimit": 0})).is_err());
    }
}
