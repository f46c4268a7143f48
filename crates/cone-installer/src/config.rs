use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cone_core::HostOs;
use serde::{Deserialize, Serialize};

use crate::PrefixLayout;

/// What happens when a package that was pulled in as a dependency is
/// requested directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManualFlagPolicy {
    /// Flip the record to manual so garbage collection keeps it.
    #[default]
    #[serde(rename = "promote")]
    PromoteOnRequest,
    /// Leave the record as it was installed.
    #[serde(rename = "preserve")]
    Preserve,
}

/// Contents of `<prefix>/config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConeConfig {
    pub launcher_dir: Option<PathBuf>,
    pub applications_dir: Option<PathBuf>,
    pub start_menu_dir: Option<PathBuf>,
    pub environment_file: Option<PathBuf>,
    pub php_ini: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub manual_flag_policy: ManualFlagPolicy,
}

/// Where OS integration points are written on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationPaths {
    pub launcher_dir: PathBuf,
    pub applications_dir: Option<PathBuf>,
    pub start_menu_dir: Option<PathBuf>,
    pub environment_file: PathBuf,
}

impl ConeConfig {
    pub fn load(layout: &PrefixLayout) -> Result<Self> {
        let path = layout.config_path();
        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content)
                .with_context(|| format!("failed parsing config: {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("failed reading config: {}", path.display()))
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("config.toml is invalid")
    }

    pub fn catalog_path(&self, layout: &PrefixLayout) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| layout.catalog_path())
    }

    pub fn integration_paths(&self, layout: &PrefixLayout, os: HostOs) -> IntegrationPaths {
        let launcher_dir = self.launcher_dir.clone().unwrap_or_else(|| {
            if os.is_windows() {
                layout.path_dir()
            } else {
                PathBuf::from("/usr/bin")
            }
        });

        let applications_dir = self.applications_dir.clone().or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .map(|home| project_linux_user_applications_dir(&home))
        });

        let start_menu_dir = self.start_menu_dir.clone().or_else(|| {
            std::env::var_os("PROGRAMDATA")
                .map(PathBuf::from)
                .map(|program_data| project_windows_start_menu_dir(&program_data))
        });

        IntegrationPaths {
            launcher_dir,
            applications_dir,
            start_menu_dir,
            environment_file: self
                .environment_file
                .clone()
                .unwrap_or_else(|| PathBuf::from("/etc/environment")),
        }
    }
}

pub(crate) fn project_linux_user_applications_dir(home: &Path) -> PathBuf {
    home.join(".local").join("share").join("applications")
}

pub(crate) fn project_windows_start_menu_dir(program_data: &Path) -> PathBuf {
    program_data
        .join("Microsoft")
        .join("Windows")
        .join("Start Menu")
        .join("Programs")
        .join("Cone")
}
