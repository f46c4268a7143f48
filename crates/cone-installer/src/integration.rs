use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use cone_core::{HostOs, ShortcutSpec, TargetArgument};
use tracing::{debug, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::{HostServices, IntegrationPaths};

/// Command line a launcher or menu entry starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutCommand {
    /// Absolute path inside the package directory, or a bare command name
    /// when the declared target does not exist there.
    pub program: String,
    pub resolved: bool,
    pub arguments: String,
}

impl ShortcutCommand {
    pub fn resolve(package_dir: &Path, target: &str, spec: &ShortcutSpec, os: HostOs) -> Self {
        let mut target_path = package_dir.join(target).into_os_string();
        if os.is_windows() {
            if let Some(extension) = &spec.target_winext {
                target_path.push(extension);
            }
        }

        let (program, resolved) = match fs::canonicalize(PathBuf::from(target_path)) {
            Ok(path) => (native_path_string(&path), true),
            Err(_) => (target.to_string(), false),
        };

        let arguments = spec
            .target_arguments
            .iter()
            .map(|argument| match argument {
                TargetArgument::Path { path } => {
                    let joined = package_dir.join(path);
                    let resolved = fs::canonicalize(&joined).unwrap_or(joined);
                    format!("\"{}\"", native_path_string(&resolved))
                }
                TargetArgument::Value { value } => value.clone(),
            })
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            program,
            resolved,
            arguments,
        }
    }

    /// The program, quoted when it is a resolved path.
    pub fn target(&self) -> String {
        if self.resolved {
            format!("\"{}\"", self.program)
        } else {
            self.program.clone()
        }
    }

    pub fn command_line(&self) -> String {
        if self.arguments.is_empty() {
            self.target()
        } else {
            format!("{} {}", self.target(), self.arguments)
        }
    }
}

pub fn render_launcher(command: &ShortcutCommand, batch: bool) -> String {
    if batch {
        format!("@ECHO OFF\r\n{} %*\r\n", command.command_line())
    } else {
        format!("#!/bin/bash\n{} \"$@\"\n", command.command_line())
    }
}

pub fn render_desktop_entry(name: &str, command: &ShortcutCommand) -> String {
    let mut desktop = String::new();
    desktop.push_str("[Desktop Entry]\n");
    desktop.push_str("Type=Application\n");
    desktop.push_str(&format!("Name={}\n", sanitize_entry_value(name)));
    desktop.push_str(&format!(
        "Exec={}\n",
        sanitize_entry_value(&command.command_line())
    ));
    desktop
}

fn render_shortcut_script(link_path: &Path, command: &ShortcutCommand) -> String {
    format!(
        "Set s = WScript.CreateObject(\"WScript.Shell\")\r\nSet l = s.CreateShortcut(\"{}\")\r\nl.TargetPath = \"{}\"\r\nl.Arguments = \"{}\"\r\nl.Save\r\n",
        link_path.display(),
        command.program,
        command.arguments.replace('"', "\"\"")
    )
}

fn sanitize_entry_value(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `canonicalize` yields verbatim `\\?\` paths on Windows, which `cmd` and
/// shortcuts do not accept.
pub(crate) fn native_path_string(path: &Path) -> String {
    let rendered = path.display().to_string();
    match rendered.strip_prefix(r"\\?\") {
        Some(stripped) => stripped.to_string(),
        None => rendered,
    }
}

/// Creates and removes the OS integration points a manifest declares.
pub(crate) struct Integrator<'a> {
    pub os: HostOs,
    pub paths: &'a IntegrationPaths,
    pub host: &'a HostServices,
    pub working_dir: &'a Path,
}

impl Integrator<'_> {
    fn launcher_path(&self, name: &str) -> PathBuf {
        self.paths.launcher_dir.join(name)
    }

    fn batch_launcher_path(&self, name: &str) -> PathBuf {
        self.paths.launcher_dir.join(format!("{name}.bat"))
    }

    pub fn create_launcher(&self, name: &str, command: &ShortcutCommand) -> Result<()> {
        fs::create_dir_all(&self.paths.launcher_dir).with_context(|| {
            format!(
                "failed to create launcher directory {}",
                self.paths.launcher_dir.display()
            )
        })?;

        let path = self.launcher_path(name);
        fs::write(&path, render_launcher(command, false))
            .with_context(|| format!("failed to write launcher {}", path.display()))?;
        make_executable(&path)?;

        if self.os.is_windows() {
            let batch = self.batch_launcher_path(name);
            fs::write(&batch, render_launcher(command, true))
                .with_context(|| format!("failed to write launcher {}", batch.display()))?;
        }
        debug!(launcher = %path.display(), "created launcher");
        Ok(())
    }

    pub fn remove_launcher(&self, name: &str) -> Result<()> {
        let path = self.launcher_path(name);
        remove_file_if_exists(&path)
            .with_context(|| format!("failed to remove launcher {}", path.display()))?;
        if self.os.is_windows() {
            let batch = self.batch_launcher_path(name);
            remove_file_if_exists(&batch)
                .with_context(|| format!("failed to remove launcher {}", batch.display()))?;
        }
        Ok(())
    }

    pub fn create_menu_entry(&self, name: &str, command: &ShortcutCommand) -> Result<()> {
        match self.os {
            HostOs::Windows => {
                let Some(start_menu_dir) = &self.paths.start_menu_dir else {
                    self.host
                        .reporter
                        .warning(&format!("no start menu directory; skipped entry '{name}'"));
                    return Ok(());
                };
                fs::create_dir_all(start_menu_dir).with_context(|| {
                    format!("failed to create {}", start_menu_dir.display())
                })?;

                let link_path = start_menu_dir.join(format!("{name}.lnk"));
                let script_path = self.working_dir.join(format!("cone-startmenu-{name}.vbs"));
                fs::write(&script_path, render_shortcut_script(&link_path, command))
                    .with_context(|| format!("failed to write {}", script_path.display()))?;
                let result = self.host.processes.run(
                    Command::new("cscript").arg("//nologo").arg(&script_path),
                    &format!("failed to create start menu entry {}", link_path.display()),
                );
                if let Err(err) = remove_file_if_exists(&script_path) {
                    warn!(path = %script_path.display(), error = %err, "failed to delete shortcut script");
                }
                result
            }
            HostOs::Linux | HostOs::OtherUnix => {
                let Some(applications_dir) = self
                    .paths
                    .applications_dir
                    .as_ref()
                    .filter(|dir| dir.is_dir())
                else {
                    debug!(entry = name, "no applications directory; desktop entry skipped");
                    return Ok(());
                };
                let path = applications_dir.join(format!("{name}.desktop"));
                fs::write(&path, render_desktop_entry(name, command))
                    .with_context(|| format!("failed to write desktop entry {}", path.display()))
            }
            HostOs::MacOs => {
                debug!(entry = name, "menu entries are not created on macOS");
                Ok(())
            }
        }
    }

    pub fn remove_menu_entry(&self, name: &str) -> Result<()> {
        let path = match self.os {
            HostOs::Windows => self
                .paths
                .start_menu_dir
                .as_ref()
                .map(|dir| dir.join(format!("{name}.lnk"))),
            HostOs::Linux | HostOs::OtherUnix => self
                .paths
                .applications_dir
                .as_ref()
                .map(|dir| dir.join(format!("{name}.desktop"))),
            HostOs::MacOs => None,
        };
        if let Some(path) = path {
            remove_file_if_exists(&path)
                .with_context(|| format!("failed to remove menu entry {}", path.display()))?;
        }
        Ok(())
    }

    pub fn set_variable(&self, name: &str, value: &str) -> Result<()> {
        self.host.environment.set(name, value)
    }

    pub fn remove_variable(&self, name: &str) -> Result<()> {
        self.host.environment.remove(name)
    }

    pub fn associate(&self, extension: &str, package_dir: &Path, command: &str) -> Result<()> {
        let handler = format!("{}\\{command}", native_path_string(package_dir));
        self.run_cmd_builtin(
            &format!("ftype {extension}file={handler}"),
            &format!("failed to register file type {extension}file"),
        )?;
        self.run_cmd_builtin(
            &format!("assoc .{extension}={extension}file"),
            &format!("failed to associate .{extension}"),
        )
    }

    pub fn dissociate(&self, extension: &str) -> Result<()> {
        self.run_cmd_builtin(
            &format!("ftype {extension}file="),
            &format!("failed to unregister file type {extension}file"),
        )?;
        self.run_cmd_builtin(
            &format!("assoc .{extension}="),
            &format!("failed to remove association for .{extension}"),
        )
    }

    fn run_cmd_builtin(&self, line: &str, context: &str) -> Result<()> {
        self.host
            .processes
            .run(Command::new("cmd").arg("/C").arg(line), context)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("failed to make {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
