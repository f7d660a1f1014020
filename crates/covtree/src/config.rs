//! View configuration
//!
//! Config is a small YAML document:
//!
//! ```yaml
//! sort_order: coverage
//! fold_uncovered_declarations: true
//! row_height: 22
//! ```

use eyre::{Result, WrapErr};
use facet::Facet;
use std::path::Path;
use tracing::{info, warn};

use crate::sort::SortOrder;

/// Height of every row, in pixels
pub const DEFAULT_ROW_HEIGHT: u32 = 22;

fn default_row_height() -> u32 {
    DEFAULT_ROW_HEIGHT
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct ViewConfig {
    /// Initial sort order of the tree
    #[facet(default)]
    pub sort_order: SortOrder,

    /// Fold declarations that were never hit into a single expandable row
    #[facet(default)]
    pub fold_uncovered_declarations: bool,

    #[facet(default = default_row_height())]
    pub row_height: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::default(),
            fold_uncovered_declarations: false,
            row_height: DEFAULT_ROW_HEIGHT,
        }
    }
}

impl ViewConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        facet_yaml::from_str(content).wrap_err("Failed to parse view config")
    }
}

/// A config together with the problem that forced a fallback to defaults, if any
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: ViewConfig,
    pub error: Option<String>,
}

/// Load config from `path`.
///
/// Never fails: a missing file yields the defaults, and an unreadable or
/// invalid one yields the defaults plus the recorded error.
pub async fn load(path: &Path) -> LoadedConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match ViewConfig::from_yaml(&content) {
            Ok(config) => LoadedConfig {
                config,
                error: None,
            },
            Err(e) => {
                let error_msg = format!("Config file {} has errors: {:#}", path.display(), e);
                warn!("{}", error_msg);
                LoadedConfig {
                    config: ViewConfig::default(),
                    error: Some(error_msg),
                }
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(
                "Config file {} not found, using default view config",
                path.display()
            );
            LoadedConfig::default()
        }
        Err(e) => {
            let error_msg = format!("Config file {} not readable: {}", path.display(), e);
            warn!("{}", error_msg);
            LoadedConfig {
                config: ViewConfig::default(),
                error: Some(error_msg),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_every_field() {
        let config = ViewConfig::from_yaml(
            "sort_order: coverage\nfold_uncovered_declarations: true\nrow_height: 30\n",
        )
        .expect("valid config");
        assert_eq!(config.sort_order, SortOrder::Coverage);
        assert!(config.fold_uncovered_declarations);
        assert_eq!(config.row_height, 30);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = ViewConfig::from_yaml("sort_order: name\n").expect("valid config");
        assert_eq!(config.sort_order, SortOrder::Name);
        assert!(!config.fold_uncovered_declarations);
        assert_eq!(config.row_height, DEFAULT_ROW_HEIGHT);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults_without_error() {
        let dir = TempDir::new().unwrap();
        let loaded = load(&dir.path().join("covtree.yaml")).await;
        assert_eq!(loaded.config, ViewConfig::default());
        assert!(loaded.error.is_none());
    }

    #[tokio::test]
    async fn invalid_file_records_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("covtree.yaml");
        std::fs::write(&path, "sort_order: sideways\n").unwrap();

        let loaded = load(&path).await;
        assert_eq!(loaded.config, ViewConfig::default());
        let error = loaded.error.expect("error recorded");
        assert!(error.contains("has errors"), "{error}");
    }

    #[tokio::test]
    async fn valid_file_is_used() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("covtree.yaml");
        std::fs::write(&path, "fold_uncovered_declarations: true\n").unwrap();

        let loaded = load(&path).await;
        assert!(loaded.config.fold_uncovered_declarations);
        assert!(loaded.error.is_none());
    }
}
