//! Configuration file loading for the `docvault` binary.
//!
//! ```toml
//! [store]
//! root = "/var/lib/docvault"
//! recovery_tier = "recent"
//!
//! [store.lock]
//! max_attempts = 50
//! retry_delay = 100
//!
//! [[store.tiers]]
//! name = "recent"
//! cap = 1
//! strategy = { kind = "single" }
//!
//! [editing]
//! ttl = 30000
//! ```
//!
//! Every key is optional. Durations are milliseconds.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use dv_editlock::EditLockConfig;
use dv_store::StoreConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub store: StoreConfig,
    pub editing: EditLockConfig,
}

impl FileConfig {
    pub fn parse(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read `path` if given, then apply the `--root` override.
    pub fn load(path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let source = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse(&source).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        if let Some(root) = root {
            config.store.root = root;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.editing, EditLockConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = FileConfig::parse(
            r#"
            [store]
            root = "/srv/docs"
            recovery_tier = "session"
            durable = false

            [store.lock]
            max_attempts = 5
            retry_delay = 20

            [[store.tiers]]
            name = "session"
            cap = 3
            strategy = { kind = "round_robin" }

            [editing]
            ttl = 1500
            "#,
        )
        .unwrap();
        assert_eq!(config.store.root, PathBuf::from("/srv/docs"));
        assert_eq!(config.store.lock.retry_delay, Duration::from_millis(20));
        assert_eq!(config.store.tiers.len(), 1);
        assert!(!config.store.durable);
        assert_eq!(config.editing.ttl, Duration::from_millis(1500));
        config.store.retention_policy().unwrap();
    }

    #[test]
    fn root_flag_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docvault.toml");
        fs::write(&path, "[store]\nroot = \"/from/file\"\n").unwrap();

        let config = FileConfig::load(Some(&path), Some(PathBuf::from("/from/flag"))).unwrap();
        assert_eq!(config.store.root, PathBuf::from("/from/flag"));
        let config = FileConfig::load(Some(&path), None).unwrap();
        assert_eq!(config.store.root, PathBuf::from("/from/file"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = FileConfig::load(Some(Path::new("/definitely/not/here.toml")), None).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
