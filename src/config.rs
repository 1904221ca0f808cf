//! Repository configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root directory for resource payload files
    pub resources_dir: PathBuf,

    /// Directory for metadata records (one JSON file per resource)
    pub metadata_dir: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let base = PathBuf::from("resources");
        Self {
            metadata_dir: base.join("metadata"),
            resources_dir: base,
        }
    }
}

impl RepositoryConfig {
    /// Configuration rooted at the given base directory
    pub fn at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            metadata_dir: base.join("metadata"),
            resources_dir: base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepositoryConfig::default();
        assert_eq!(config.resources_dir, PathBuf::from("resources"));
        assert_eq!(config.metadata_dir, PathBuf::from("resources/metadata"));
    }

    #[test]
    fn test_config_at_base() {
        let config = RepositoryConfig::at("/var/lib/repo");
        assert_eq!(config.resources_dir, PathBuf::from("/var/lib/repo"));
        assert_eq!(config.metadata_dir, PathBuf::from("/var/lib/repo/metadata"));
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = RepositoryConfig::at("/data");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RepositoryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.resources_dir, config.resources_dir);
        assert_eq!(parsed.metadata_dir, config.metadata_dir);
    }
}
