use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use cone_catalog::Catalog;
use cone_core::{
    is_newer_version, HostPlatform, PackageManifest, Prerequisite, ShortcutSpec, VariableSpec,
};
use tracing::{info, warn};

use crate::fs_utils::remove_path_if_exists;
use crate::integration::{native_path_string, Integrator, ShortcutCommand};
use crate::{
    ConeConfig, EngineError, HostServices, InstalledPackageRecord, InstalledPackageRegistry,
    IntegrationPaths, ManualFlagPolicy, PrefixLayout, StepContext, StepInterpreter,
};

/// Whether an operation is the outermost call. Only top-level calls sweep
/// unneeded dependencies and write the registry back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    TopLevel,
    Nested,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Skip prerequisite checks.
    pub force: bool,
    /// Display name of the package that pulled this one in.
    pub dependency_of: Option<String>,
}

impl InstallOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            dependency_of: None,
        }
    }

    pub fn dependency_of(requester: impl Into<String>) -> Self {
        Self {
            force: false,
            dependency_of: Some(requester.into()),
        }
    }

    fn is_manual(&self) -> bool {
        self.dependency_of.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
    /// Already installed as a dependency; now recorded as requested.
    PromotedToManual,
    PrerequisitesUnmet { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Uninstalled,
    NotInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    RanUpdateSteps,
    Reinstalled { from: Option<String>, to: String },
    UpToDate,
    NotInstalled,
}

/// One engine run: the catalog, the host, and the installed-package
/// registry, loaded on first use.
pub struct Session {
    layout: PrefixLayout,
    config: ConeConfig,
    catalog: Catalog,
    platform: HostPlatform,
    paths: IntegrationPaths,
    host: HostServices,
    working_dir: PathBuf,
    registry: Option<InstalledPackageRegistry>,
    install_stack: Vec<String>,
}

impl Session {
    pub fn new(
        layout: PrefixLayout,
        config: ConeConfig,
        catalog: Catalog,
        platform: HostPlatform,
        host: HostServices,
    ) -> Self {
        let paths = config.integration_paths(&layout, platform.os);
        let working_dir = layout.tmp_dir();
        Self {
            layout,
            config,
            catalog,
            platform,
            paths,
            host,
            working_dir,
            registry: None,
            install_stack: Vec::new(),
        }
    }

    pub fn layout(&self) -> &PrefixLayout {
        &self.layout
    }

    pub fn config(&self) -> &ConeConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn platform(&self) -> HostPlatform {
        self.platform
    }

    pub fn integration_paths(&self) -> &IntegrationPaths {
        &self.paths
    }

    pub fn host(&self) -> &HostServices {
        &self.host
    }

    pub fn registry(&mut self) -> Result<&InstalledPackageRegistry, EngineError> {
        self.registry_mut().map(|registry| &*registry)
    }

    pub fn is_installed(&mut self, name: &str) -> Result<bool, EngineError> {
        Ok(self.registry()?.contains(name))
    }

    /// Catalog name for `name`, trying declared aliases when no package
    /// has that exact name.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        self.catalog
            .find(name, true)
            .map(|manifest| manifest.name.as_str())
    }

    /// Writes the registry snapshot if it was loaded.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        match &self.registry {
            Some(registry) => registry.save(),
            None => Ok(()),
        }
    }

    pub fn install(
        &mut self,
        name: &str,
        options: InstallOptions,
        flow: Flow,
    ) -> Result<InstallOutcome, EngineError> {
        if let Some(position) = self.install_stack.iter().position(|entry| entry == name) {
            let mut chain = self.install_stack[position..].to_vec();
            chain.push(name.to_string());
            return Err(EngineError::CyclicDependency {
                chain: chain.join(" -> "),
            });
        }

        self.install_stack.push(name.to_string());
        let result = self.install_package(name, &options);
        self.install_stack.pop();
        let outcome = result?;

        if flow == Flow::TopLevel {
            self.finish_top_level()?;
        }
        Ok(outcome)
    }

    pub fn uninstall(&mut self, name: &str, flow: Flow) -> Result<UninstallOutcome, EngineError> {
        let Some(record) = self.registry_mut()?.get(name).cloned() else {
            return Ok(UninstallOutcome::NotInstalled);
        };
        info!(package = name, "uninstalling");

        self.remove_package_artifacts(name, &record);

        self.layout.ensure_base_dirs()?;
        let package_dir = self.layout.package_dir(name);
        let context = StepContext {
            package: name,
            version: record.version.as_deref().unwrap_or(""),
            package_dir: &package_dir,
        };
        self.interpreter()
            .perform_steps(&context, &record.uninstall)?;

        self.registry_mut()?.remove(name);
        info!(package = name, "uninstalled");

        if flow == Flow::TopLevel {
            self.finish_top_level()?;
        }
        Ok(UninstallOutcome::Uninstalled)
    }

    pub fn update(&mut self, name: &str, flow: Flow) -> Result<UpdateOutcome, EngineError> {
        let Some(record) = self.registry_mut()?.get(name).cloned() else {
            return Ok(UpdateOutcome::NotInstalled);
        };
        let manifest = self.manifest(name)?;

        let outcome = if let Some(update_steps) = &manifest.update {
            info!(package = name, "running update steps");
            self.layout.ensure_base_dirs()?;
            let package_dir = self.layout.package_dir(name);
            let context = StepContext {
                package: name,
                version: manifest.version_str(),
                package_dir: &package_dir,
            };
            self.interpreter().perform_steps(&context, update_steps)?;
            UpdateOutcome::RanUpdateSteps
        } else if let Some(version) = manifest
            .version
            .as_deref()
            .filter(|version| is_newer_version(version, record.version.as_deref()))
        {
            let display_name = display_name_for(&manifest, Some(&record));
            self.host
                .reporter
                .message(&format!("Updating {display_name}..."));
            info!(
                package = name,
                from = record.version.as_deref().unwrap_or(""),
                to = version,
                "reinstalling newer version"
            );

            self.uninstall(name, Flow::Nested)?;
            self.install(name, InstallOptions::forced(), Flow::Nested)?;
            if let Some(updated) = self.registry_mut()?.get_mut(name) {
                updated.manual = record.manual;
            }
            UpdateOutcome::Reinstalled {
                from: record.version.clone(),
                to: version.to_string(),
            }
        } else {
            UpdateOutcome::UpToDate
        };

        if flow == Flow::TopLevel {
            self.finish_top_level()?;
        }
        Ok(outcome)
    }

    /// Uninstalls dependency-only packages that no installed package's
    /// current manifest depends on, repeating until nothing else becomes
    /// unneeded. A package whose removal fails is reported and left alone.
    pub fn remove_unneeded_dependencies(
        &mut self,
        flow: Flow,
    ) -> Result<Vec<String>, EngineError> {
        let mut removed = Vec::new();
        let mut failed = BTreeSet::new();

        loop {
            let unneeded = self.unneeded_dependencies(&failed)?;
            if unneeded.is_empty() {
                break;
            }

            for (name, label) in unneeded {
                self.host
                    .reporter
                    .message(&format!("Removing unneeded dependency {label}..."));
                match self.uninstall(&name, Flow::Nested) {
                    Ok(_) => removed.push(name),
                    Err(err) => {
                        warn!(package = %name, error = %err, "failed to remove unneeded dependency");
                        self.host
                            .reporter
                            .warning(&format!("failed to remove {label}: {err}"));
                        failed.insert(name);
                    }
                }
            }
        }

        if flow == Flow::TopLevel {
            self.flush()?;
        }
        Ok(removed)
    }

    pub fn install_all(
        &mut self,
        names: &[String],
        force: bool,
    ) -> Result<Vec<(String, InstallOutcome)>, EngineError> {
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let options = InstallOptions {
                force,
                dependency_of: None,
            };
            let outcome = self.install(name, options, Flow::Nested)?;
            outcomes.push((name.clone(), outcome));
        }
        self.finish_top_level()?;
        Ok(outcomes)
    }

    pub fn uninstall_all(
        &mut self,
        names: &[String],
    ) -> Result<Vec<(String, UninstallOutcome)>, EngineError> {
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.uninstall(name, Flow::Nested)?;
            outcomes.push((name.clone(), outcome));
        }
        self.finish_top_level()?;
        Ok(outcomes)
    }

    /// Updates every installed package in name order. Packages no longer in
    /// the catalog are skipped.
    pub fn update_all(&mut self) -> Result<Vec<(String, UpdateOutcome)>, EngineError> {
        let names = self.registry()?.names();
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            if self.catalog.get(&name).is_none() {
                warn!(package = %name, "installed package is not in the catalog; skipping update");
                continue;
            }
            let outcome = self.update(&name, Flow::Nested)?;
            outcomes.push((name, outcome));
        }
        self.finish_top_level()?;
        Ok(outcomes)
    }

    fn install_package(
        &mut self,
        name: &str,
        options: &InstallOptions,
    ) -> Result<InstallOutcome, EngineError> {
        let policy = self.config.manual_flag_policy;
        if let Some(record) = self.registry_mut()?.get_mut(name) {
            if options.is_manual() && !record.manual && policy == ManualFlagPolicy::PromoteOnRequest
            {
                record.manual = true;
                info!(package = name, "promoted dependency to manual install");
                return Ok(InstallOutcome::PromotedToManual);
            }
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let manifest = self.manifest(name)?;
        if !options.force {
            if let Some(reason) = self.unmet_prerequisite(&manifest) {
                if options.is_manual() {
                    self.host.reporter.message(&reason);
                }
                info!(package = name, reason = %reason, "prerequisites unmet");
                return Ok(InstallOutcome::PrerequisitesUnmet { reason });
            }
        }

        let display_name = display_name_for(&manifest, None);
        for dependency in &manifest.dependencies {
            self.install(
                dependency,
                InstallOptions::dependency_of(display_name.clone()),
                Flow::Nested,
            )?;
        }

        let label = manifest.labelled(&display_name);
        let announcement = match &options.dependency_of {
            Some(requester) => format!("Installing {label} (required by {requester})..."),
            None => format!("Installing {label}..."),
        };
        self.host.reporter.message(&announcement);
        info!(
            package = name,
            version = manifest.version_str(),
            manual = options.is_manual(),
            "installing"
        );

        self.layout.ensure_base_dirs()?;
        let package_dir = self.layout.package_dir(name);
        let context = StepContext {
            package: name,
            version: manifest.version_str(),
            package_dir: &package_dir,
        };
        let mut uninstall = self
            .interpreter()
            .perform_steps(&context, &manifest.install)?;

        let mut record = InstalledPackageRecord {
            display_name: Some(display_name),
            version: manifest.version.clone(),
            manual: options.is_manual(),
            ..InstalledPackageRecord::default()
        };
        self.create_integration_points(&manifest, &package_dir, &mut record)?;

        uninstall.extend(manifest.uninstall.iter().cloned());
        record.uninstall = uninstall;
        self.registry_mut()?.insert(name, record);
        info!(package = name, "installed");
        Ok(InstallOutcome::Installed)
    }

    fn unmet_prerequisite(&self, manifest: &PackageManifest) -> Option<String> {
        let display_name = display_name_for(manifest, None);
        for prerequisite in &manifest.prerequisites {
            match prerequisite {
                Prerequisite::CommandNotFound { command } => {
                    if self.host.commands.locate(command).is_some() {
                        return Some(format!(
                            "Not installing {display_name} because '{command}' is a registered command."
                        ));
                    }
                }
                Prerequisite::Os { .. } => {
                    if !prerequisite.os_allows(&self.platform) {
                        return Some(format!(
                            "{display_name} is not available for this platform."
                        ));
                    }
                }
            }
        }
        None
    }

    fn create_integration_points(
        &self,
        manifest: &PackageManifest,
        package_dir: &Path,
        record: &mut InstalledPackageRecord,
    ) -> Result<(), EngineError> {
        let integrator = self.integrator();
        let has_package_dir = package_dir.is_dir();
        let require_package_dir = |kind: &'static str| {
            if has_package_dir {
                Ok(())
            } else {
                Err(EngineError::MissingInstallDirectory {
                    package: manifest.name.clone(),
                    kind,
                })
            }
        };

        if !manifest.shortcuts.is_empty() {
            require_package_dir("shortcuts")?;
            for (entry, spec) in &manifest.shortcuts {
                let command = self.shortcut_command(manifest, package_dir, "shortcut", entry, spec)?;
                integrator.create_launcher(entry, &command)?;
                record.shortcuts.push(entry.clone());
            }
        }

        if !manifest.startmenu.is_empty() {
            require_package_dir("start menu entries")?;
            for (entry, spec) in &manifest.startmenu {
                let command =
                    self.shortcut_command(manifest, package_dir, "start menu", entry, spec)?;
                integrator.create_menu_entry(entry, &command)?;
                record.startmenu.push(entry.clone());
            }
        }

        for (variable, spec) in &manifest.variables {
            let value = match spec {
                VariableSpec::Path { path } => {
                    require_package_dir("variables")?;
                    let joined = package_dir.join(path);
                    native_path_string(&fs::canonicalize(&joined).unwrap_or(joined))
                }
                VariableSpec::Value { value } => value.clone(),
            };
            integrator.set_variable(variable, &value)?;
            record.variables.push(variable.clone());
        }

        if self.platform.os.is_windows() && !manifest.file_associations.is_empty() {
            require_package_dir("file associations")?;
            for (extension, command) in &manifest.file_associations {
                integrator.associate(extension, package_dir, command)?;
                record.file_associations.push(extension.clone());
            }
        }
        Ok(())
    }

    fn shortcut_command(
        &self,
        manifest: &PackageManifest,
        package_dir: &Path,
        kind: &'static str,
        entry: &str,
        spec: &ShortcutSpec,
    ) -> Result<ShortcutCommand, EngineError> {
        let target = spec
            .target
            .as_deref()
            .ok_or_else(|| EngineError::MissingShortcutTarget {
                package: manifest.name.clone(),
                kind,
                entry: entry.to_string(),
            })?;
        Ok(ShortcutCommand::resolve(
            package_dir,
            target,
            spec,
            self.platform.os,
        ))
    }

    /// Best-effort removal of everything the record says was created.
    fn remove_package_artifacts(&self, name: &str, record: &InstalledPackageRecord) {
        let integrator = self.integrator();
        let package_dir = self.layout.package_dir(name);
        if let Err(err) = remove_path_if_exists(&package_dir) {
            warn!(package = name, path = %package_dir.display(), error = %err, "failed to remove package directory");
        }

        for entry in &record.shortcuts {
            if let Err(err) = integrator.remove_launcher(entry) {
                warn!(package = name, entry = %entry, error = %err, "failed to remove launcher");
            }
        }
        for entry in &record.startmenu {
            if let Err(err) = integrator.remove_menu_entry(entry) {
                warn!(package = name, entry = %entry, error = %err, "failed to remove menu entry");
            }
        }
        for variable in &record.variables {
            if let Err(err) = integrator.remove_variable(variable) {
                warn!(package = name, variable = %variable, error = %err, "failed to remove environment variable");
            }
        }
        if self.platform.os.is_windows() {
            for extension in &record.file_associations {
                if let Err(err) = integrator.dissociate(extension) {
                    warn!(package = name, extension = %extension, error = %err, "failed to remove file association");
                }
            }
        }
    }

    fn unneeded_dependencies(
        &mut self,
        skip: &BTreeSet<String>,
    ) -> Result<Vec<(String, String)>, EngineError> {
        self.registry_mut()?;
        let Some(registry) = self.registry.as_ref() else {
            return Ok(Vec::new());
        };
        let catalog = &self.catalog;

        let installed = registry.iter().map(|(name, _)| name).collect::<Vec<_>>();
        Ok(registry
            .iter()
            .filter(|(name, record)| {
                !record.manual
                    && !skip.contains(*name)
                    && catalog
                        .dependents_of(name, installed.iter().copied())
                        .is_empty()
            })
            .map(|(name, record)| (name.to_string(), record.label(name).to_string()))
            .collect())
    }

    fn finish_top_level(&mut self) -> Result<(), EngineError> {
        self.remove_unneeded_dependencies(Flow::Nested)?;
        self.flush()
    }

    fn manifest(&self, name: &str) -> Result<PackageManifest, EngineError> {
        self.catalog
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownPackage(name.to_string()))
    }

    fn registry_mut(&mut self) -> Result<&mut InstalledPackageRegistry, EngineError> {
        let registry = match self.registry.take() {
            Some(registry) => registry,
            None => InstalledPackageRegistry::load(self.layout.registry_path())?,
        };
        Ok(self.registry.insert(registry))
    }

    fn interpreter(&self) -> StepInterpreter<'_> {
        StepInterpreter::new(
            self.platform,
            &self.working_dir,
            &self.host,
            self.config.php_ini.as_deref(),
        )
    }

    fn integrator(&self) -> Integrator<'_> {
        Integrator {
            os: self.platform.os,
            paths: &self.paths,
            host: &self.host,
            working_dir: &self.working_dir,
        }
    }
}

/// Manifest display name, then the recorded one, then the capitalized name.
fn display_name_for(manifest: &PackageManifest, record: Option<&InstalledPackageRecord>) -> String {
    if let Some(display_name) = &manifest.display_name {
        return display_name.clone();
    }
    if let Some(display_name) = record.and_then(|record| record.display_name.as_ref()) {
        return display_name.clone();
    }
    manifest.default_display_name()
}
