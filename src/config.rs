//! Configuration loading and management
//!
//! Handles parsing of `.tasktree.toml` configuration files.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::store::DEFAULT_MAX_DEPTH;

/// File name looked up by [`Config::load_from_dir`].
pub const CONFIG_FILE: &str = ".tasktree.toml";

const MAX_DEPTH_LIMIT: usize = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tree shape limits
    #[serde(default)]
    pub tree: TreeConfig,

    /// Access control configuration
    #[serde(default)]
    pub access: AccessConfig,

    /// Snapshot file handling
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Tree-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum parent-link hops from any task to the root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

/// Access control configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Members of these groups bypass access rules
    #[serde(default)]
    pub admin_groups: Vec<String>,
}

/// Snapshot file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// How long to wait for the snapshot lock file
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `.tasktree.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.tree.validate()?;
        self.access.validate()?;
        self.snapshot.validate()?;
        Ok(())
    }
}

impl TreeConfig {
    fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::InvalidConfig(
                "tree.max_depth must be >= 1".to_string(),
            ));
        }
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "tree.max_depth must be <= {MAX_DEPTH_LIMIT}"
            )));
        }
        Ok(())
    }
}

impl AccessConfig {
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for group in &self.admin_groups {
            let trimmed = group.trim();
            if trimmed.is_empty() {
                return Err(Error::InvalidConfig(
                    "access.admin_groups cannot include empty entries".to_string(),
                ));
            }
            if !seen.insert(trimmed) {
                return Err(Error::InvalidConfig(format!(
                    "access.admin_groups has duplicate entry '{trimmed}'"
                )));
            }
        }
        Ok(())
    }
}

impl SnapshotConfig {
    fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "snapshot.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.tree.max_depth, 50);
        assert!(cfg.access.admin_groups.is_empty());
        assert_eq!(cfg.snapshot.lock_timeout_ms, 5000);
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[tree]
max_depth = 12

[access]
admin_groups = ["admins", "controlling"]

[snapshot]
lock_timeout_ms = 250
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.tree.max_depth, 12);
        assert_eq!(
            cfg.access.admin_groups,
            vec!["admins".to_string(), "controlling".to_string()]
        );
        assert_eq!(cfg.snapshot.lock_timeout_ms, 250);
    }

    #[test]
    fn zero_depth_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[tree]\nmax_depth = 0").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_admin_groups_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[access]\nadmin_groups = [\"a\", \" a\"]").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            Error::InvalidConfig(message) => assert!(message.contains("duplicate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_from_dir_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_dir(dir.path());
        assert_eq!(cfg.tree.max_depth, 50);
    }

    #[test]
    fn load_from_dir_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "[tree]\nmax_depth = 7").expect("write config");

        let cfg = Config::load_from_dir(dir.path());
        assert_eq!(cfg.tree.max_depth, 7);
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("max_depth = 50"));
    }
}
