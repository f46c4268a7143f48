use std::fs;
use std::path::{Path, PathBuf};

use cone_core::{DownloadStep, HostPlatform, Step};
use cone_security::{verify_digest_file, HashAlgorithm};
use tracing::{debug, warn};

use crate::fs_utils::{move_path_or_copy, remove_file_if_exists, remove_path_if_exists};
use crate::php_ini::{locate_php_ini, toggle_extension_in_file};
use crate::{EngineError, HostServices};

/// Package facts a step list is interpreted against.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub package: &'a str,
    /// Substituted for `{version}`; empty when the package is unversioned.
    pub version: &'a str,
    /// Destination of `keep` steps.
    pub package_dir: &'a Path,
}

/// Executes step lists against the host and collects the steps that undo
/// them.
pub struct StepInterpreter<'a> {
    platform: HostPlatform,
    working_dir: &'a Path,
    host: &'a HostServices,
    php_ini: Option<&'a Path>,
}

impl<'a> StepInterpreter<'a> {
    pub fn new(
        platform: HostPlatform,
        working_dir: &'a Path,
        host: &'a HostServices,
        php_ini: Option<&'a Path>,
    ) -> Self {
        Self {
            platform,
            working_dir,
            host,
            php_ini,
        }
    }

    /// Runs `steps` in order and returns the synthesized inverse steps in the
    /// order they were produced. The first failing step aborts the list;
    /// earlier effects are left in place.
    pub fn perform_steps(
        &self,
        context: &StepContext<'_>,
        steps: &[Step],
    ) -> Result<Vec<Step>, EngineError> {
        let mut inverses = Vec::new();
        self.perform_into(context, steps, &mut inverses)?;
        Ok(inverses)
    }

    fn perform_into(
        &self,
        context: &StepContext<'_>,
        steps: &[Step],
        inverses: &mut Vec<Step>,
    ) -> Result<(), EngineError> {
        for step in steps {
            debug!(package = context.package, step = step.type_name(), "performing step");
            self.perform_step(context, step, inverses)?;
        }
        Ok(())
    }

    fn perform_step(
        &self,
        context: &StepContext<'_>,
        step: &Step,
        inverses: &mut Vec<Step>,
    ) -> Result<(), EngineError> {
        match step {
            Step::PlatformSwitch { variants } => {
                for (key, nested) in self.platform.select(variants) {
                    debug!(package = context.package, platform = key, "platform variant selected");
                    self.perform_into(context, nested, inverses)?;
                }
            }
            Step::PlatformDownloadAndExtract { target, variants } => {
                for (key, source) in self.platform.select(variants) {
                    let expanded = Step::download_and_extract_steps(target, key, source);
                    self.perform_into(context, &expanded, inverses)?;
                }
            }
            Step::Echo { value } => self.host.reporter.message(value),
            Step::ShellExec { value } => {
                let code = self.host.processes.shell(value, self.working_dir)?;
                debug!(command = %value, exit_code = ?code, "shell command finished");
            }
            Step::EnablePhpExtension { name } | Step::DisablePhpExtension { name } => {
                if let Some(inverse) = step.inverse() {
                    inverses.push(inverse);
                }
                let enable = matches!(step, Step::EnablePhpExtension { .. });
                self.toggle_php_extension(name, enable)?;
            }
            Step::InstallUnixPackage { name } | Step::RemoveUnixPackage { name } => {
                if !self.platform.os.is_unix() {
                    debug!(package = %name, "skipping native package step on non-unix host");
                    return Ok(());
                }
                if let Some(inverse) = step.inverse() {
                    inverses.push(inverse);
                }
                if matches!(step, Step::InstallUnixPackage { .. }) {
                    self.host.native_packages.install(name)?;
                } else {
                    self.host.native_packages.remove(name)?;
                }
            }
            Step::Download(download) => self.download(context, download)?,
            Step::Extract { file, target } => {
                let file = self.resolve_path(file);
                if !file.is_file() {
                    return Err(EngineError::NotFound {
                        action: "extracted",
                        path: file,
                    });
                }
                self.host
                    .extractor
                    .extract(&file, &self.resolve_path(target))?;
            }
            Step::Delete { file } => {
                let file = self.resolve_path(file);
                if fs::symlink_metadata(&file).is_err() {
                    return Err(EngineError::NotFound {
                        action: "deleted",
                        path: file,
                    });
                }
                remove_path_if_exists(&file).map_err(|err| {
                    EngineError::io(format!("delete {}", file.display()), err)
                })?;
            }
            Step::Keep { file, as_name } => self.keep(context, file, as_name)?,
        }
        Ok(())
    }

    fn download(
        &self,
        context: &StepContext<'_>,
        download: &DownloadStep,
    ) -> Result<(), EngineError> {
        let url = substitute_version(&download.url, context.version);
        let target = self.resolve_path(&download.target);
        self.host.downloader.download(&url, &target)?;

        for (algorithm_name, expected) in &download.hash {
            let Some(algorithm) = HashAlgorithm::parse(algorithm_name) else {
                discard(&target);
                return Err(EngineError::UnsupportedHashAlgorithm {
                    algorithm: algorithm_name.clone(),
                    path: target,
                });
            };
            match verify_digest_file(algorithm, &target, expected) {
                Ok(Ok(())) => {}
                Ok(Err(actual)) => {
                    discard(&target);
                    return Err(EngineError::IntegrityError {
                        path: target,
                        algorithm: algorithm.as_str().to_string(),
                        expected: expected.clone(),
                        actual,
                    });
                }
                Err(err) => {
                    discard(&target);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    fn keep(&self, context: &StepContext<'_>, file: &str, as_name: &str) -> Result<(), EngineError> {
        let source = self.resolve_path(&substitute_version(file, context.version));
        if fs::symlink_metadata(&source).is_err() {
            return Err(EngineError::NotFound {
                action: "kept",
                path: source,
            });
        }

        let destination = if as_name.is_empty() {
            context.package_dir.to_path_buf()
        } else {
            fs::create_dir_all(context.package_dir).map_err(|err| {
                EngineError::io(format!("create {}", context.package_dir.display()), err)
            })?;
            context.package_dir.join(as_name)
        };

        remove_path_if_exists(&destination).map_err(|err| {
            EngineError::io(format!("replace {}", destination.display()), err)
        })?;
        move_path_or_copy(&source, &destination)?;
        debug!(from = %source.display(), to = %destination.display(), "kept file");
        Ok(())
    }

    fn toggle_php_extension(&self, name: &str, enable: bool) -> Result<(), EngineError> {
        let located = locate_php_ini(
            self.php_ini,
            &*self.host.processes,
            &*self.host.commands,
        )?;
        let Some(php_ini) = located else {
            debug!(extension = name, "no php.ini found; extension toggle skipped");
            return Ok(());
        };
        let changed = toggle_extension_in_file(&php_ini, name, enable)?;
        debug!(extension = name, enable, changed, path = %php_ini.display(), "toggled php extension");
        Ok(())
    }

    /// Relative paths are taken from the working directory.
    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}

fn substitute_version(template: &str, version: &str) -> String {
    template.replace("{version}", version)
}

fn discard(path: &Path) {
    if let Err(err) = remove_file_if_exists(path) {
        warn!(path = %path.display(), error = %err, "failed to delete rejected download");
    }
}
