use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use cone_core::PackageManifest;
use serde_json::Value;
use tracing::warn;

/// Local package catalog (`packages.json`), loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    packages: Vec<PackageManifest>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(anyhow!(
                    "catalog not found at {}; fetch a catalog first",
                    path.display()
                ));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading catalog: {}", path.display()));
            }
        };
        Self::from_json_str(&content)
            .with_context(|| format!("failed parsing catalog: {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: Value =
            serde_json::from_str(content).context("catalog is not valid JSON")?;
        let Value::Array(entries) = document else {
            return Err(anyhow!("catalog document must be a JSON array of packages"));
        };

        let manifests = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                PackageManifest::from_value(entry)
                    .with_context(|| format!("invalid catalog entry #{index}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_manifests(manifests))
    }

    /// Builds a catalog; the first manifest with a given name wins.
    pub fn from_manifests(manifests: impl IntoIterator<Item = PackageManifest>) -> Self {
        let mut catalog = Self::default();
        for manifest in manifests {
            if catalog.by_name.contains_key(&manifest.name) {
                warn!(package = %manifest.name, "ignoring duplicate catalog entry");
                continue;
            }
            catalog
                .by_name
                .insert(manifest.name.clone(), catalog.packages.len());
            catalog.packages.push(manifest);
        }
        catalog
    }

    pub fn packages(&self) -> &[PackageManifest] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PackageManifest> {
        self.by_name.get(name).map(|index| &self.packages[*index])
    }

    /// Exact name first, then declared aliases in catalog order.
    pub fn find(&self, name: &str, try_aliases: bool) -> Option<&PackageManifest> {
        if let Some(manifest) = self.get(name) {
            return Some(manifest);
        }
        if !try_aliases {
            return None;
        }
        self.packages
            .iter()
            .find(|manifest| manifest.aliases.iter().any(|alias| alias == name))
    }

    /// Matches `risky_aliases` only; callers decide whether to honor it.
    pub fn find_risky(&self, name: &str) -> Option<&PackageManifest> {
        self.packages
            .iter()
            .find(|manifest| manifest.risky_aliases.iter().any(|alias| alias == name))
    }

    pub fn search(&self, needle: &str) -> Vec<&PackageManifest> {
        let needle = needle.to_ascii_lowercase();
        let mut matches = self
            .packages
            .iter()
            .filter(|manifest| {
                manifest.name.to_ascii_lowercase().contains(&needle)
                    || manifest
                        .aliases
                        .iter()
                        .any(|alias| alias.to_ascii_lowercase().contains(&needle))
            })
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches
    }

    /// Installed-package names whose current manifest lists `name` as a dependency.
    pub fn dependents_of<'a>(
        &self,
        name: &str,
        installed: impl IntoIterator<Item = &'a str>,
    ) -> Vec<&'a str> {
        installed
            .into_iter()
            .filter(|candidate| {
                *candidate != name
                    && self
                        .get(candidate)
                        .is_some_and(|manifest| manifest.depends_on(name))
            })
            .collect()
    }
}
