//! Migrator configuration stored in `billing-migrator.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::label::{DEFAULT_LABEL_KEY, validate_label_key};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "billing-migrator.toml";

/// Migrator configuration (TOML).
///
/// Missing fields fall back to defaults. CLI flags take precedence over
/// values loaded from the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigratorConfig {
    /// Label key that stores the original billing account id.
    pub label_key: String,

    /// Directory where live migrations write their operation logs.
    pub log_dir: PathBuf,

    /// JSON document backing the cloud state.
    pub state_file: Option<PathBuf>,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            label_key: DEFAULT_LABEL_KEY.to_string(),
            log_dir: PathBuf::from("."),
            state_file: None,
        }
    }
}

impl MigratorConfig {
    pub fn validate(&self) -> Result<()> {
        let errors = validate_label_key(&self.label_key);
        if !errors.is_empty() {
            return Err(anyhow!("invalid label_key: {}", errors.join("; ")));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(anyhow!("log_dir must not be empty"));
        }
        if let Some(state_file) = &self.state_file {
            if state_file.as_os_str().is_empty() {
                return Err(anyhow!("state_file must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MigratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<MigratorConfig> {
    if !path.exists() {
        let cfg = MigratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MigratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, MigratorConfig::default());
        assert_eq!(cfg.label_key, "original-billing-account-id");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("billing-migrator.toml");
        fs::write(&path, "log_dir = \"logs\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.log_dir, PathBuf::from("logs"));
        assert_eq!(cfg.label_key, DEFAULT_LABEL_KEY);
        assert_eq!(cfg.state_file, None);
    }

    #[test]
    fn rejects_invalid_label_key() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("billing-migrator.toml");
        fs::write(&path, "label_key = \"Not Valid\"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("invalid label_key"));
    }
}
