use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixLayout {
    prefix: PathBuf,
}

impl PrefixLayout {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.prefix.join("packages")
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(name)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.prefix.join("state")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.state_dir().join("installed_packages.json")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.state_dir().join("packages.json")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.prefix.join("tmp")
    }

    pub fn path_dir(&self) -> PathBuf {
        self.prefix.join("path")
    }

    pub fn config_path(&self) -> PathBuf {
        self.prefix.join("config.toml")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.packages_dir(), self.state_dir(), self.tmp_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// `$CONE_PREFIX`, else the per-user default location.
pub fn default_user_prefix() -> Result<PathBuf> {
    if let Some(prefix) = std::env::var_os("CONE_PREFIX").filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(prefix));
    }

    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows user prefix")?;
        return Ok(PathBuf::from(app_data).join("Cone"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user prefix")?;
    Ok(PathBuf::from(home).join(".cone"))
}
