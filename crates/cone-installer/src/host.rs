//! Collaborators the engine drives but does not implement itself.
//!
//! Each concern is a small trait so orchestration can run against fakes; the
//! `System*` types are the implementations used by the `cone` binary.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use cone_core::HostOs;
use tracing::debug;

use crate::fs_utils::remove_file_if_exists;
use crate::IntegrationPaths;

pub trait Downloader {
    /// Fetches `url` to `destination`, replacing any existing file.
    fn download(&self, url: &str, destination: &Path) -> Result<()>;
}

pub trait ArchiveExtractor {
    /// Unpacks `archive` into `target`, creating the directory.
    fn extract(&self, archive: &Path, target: &Path) -> Result<()>;
}

pub trait NativePackageManager {
    fn install(&self, name: &str) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}

pub trait ProcessRunner {
    /// Runs `command_line` through the platform shell with inherited output.
    /// The exit code is returned, not checked.
    fn shell(&self, command_line: &str, working_dir: &Path) -> Result<Option<i32>>;

    /// Runs a command and fails unless it exits successfully.
    fn run(&self, command: &mut Command, context: &str) -> Result<()>;

    /// Runs a command and returns its stdout.
    fn capture(&self, command: &mut Command, context: &str) -> Result<String>;
}

pub trait CommandLocator {
    fn locate(&self, command: &str) -> Option<PathBuf>;
}

/// Persistent machine environment variables.
pub trait EnvironmentStore {
    fn set(&self, name: &str, value: &str) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}

/// User-facing messages. Diagnostics go through `tracing` instead.
pub trait Reporter {
    fn message(&self, text: &str);

    fn warning(&self, text: &str) {
        self.message(text);
    }
}

pub struct HostServices {
    pub downloader: Box<dyn Downloader>,
    pub extractor: Box<dyn ArchiveExtractor>,
    pub native_packages: Box<dyn NativePackageManager>,
    pub processes: Box<dyn ProcessRunner>,
    pub commands: Box<dyn CommandLocator>,
    pub environment: Box<dyn EnvironmentStore>,
    pub reporter: Box<dyn Reporter>,
}

impl HostServices {
    pub fn system(os: HostOs, paths: &IntegrationPaths) -> Result<Self> {
        let environment: Box<dyn EnvironmentStore> = if os.is_windows() {
            Box::new(WindowsMachineEnvironment)
        } else {
            Box::new(EnvironmentFile::new(paths.environment_file.clone()))
        };

        Ok(Self {
            downloader: Box::new(HttpDownloader::new()?),
            extractor: Box::new(CommandExtractor),
            native_packages: Box::new(SystemPackageManager::detect()),
            processes: Box::new(SystemProcessRunner),
            commands: Box::new(SystemCommandLocator),
            environment,
            reporter: Box::new(StdoutReporter),
        })
    }
}

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("cone/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn fetch(&self, url: &str, out_path: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("download failed: {url}"))?;
        let mut file = File::create(out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        response
            .copy_to(&mut file)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        Ok(())
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let part_path = destination.with_file_name(format!(
            "{}.part",
            destination
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("download")
        ));

        debug!(url, path = %destination.display(), "downloading");
        if let Err(err) = self.fetch(url, &part_path) {
            let _ = fs::remove_file(&part_path);
            return Err(err);
        }

        remove_file_if_exists(destination)
            .with_context(|| format!("failed to replace {}", destination.display()))?;
        fs::rename(&part_path, destination)
            .with_context(|| format!("failed to move download into {}", destination.display()))
    }
}

/// Unpacks archives with the host's own tools (`tar`, `unzip`, PowerShell).
pub struct CommandExtractor;

impl ArchiveExtractor for CommandExtractor {
    fn extract(&self, archive: &Path, target: &Path) -> Result<()> {
        fs::create_dir_all(target)
            .with_context(|| format!("failed to create {}", target.display()))?;
        let is_zip = archive
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if is_zip {
            extract_zip(archive, target)
        } else {
            extract_tar(archive, target)
        }
    }
}

fn extract_tar(archive_path: &Path, dst: &Path) -> Result<()> {
    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract tar archive",
    )
}

fn extract_zip(archive_path: &Path, dst: &Path) -> Result<()> {
    if cfg!(windows) {
        let mut command = Command::new("powershell");
        command.arg("-NoProfile").arg("-Command").arg(format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            escape_ps_single_quote(archive_path),
            escape_ps_single_quote(dst)
        ));
        if run_command(&mut command, "failed to extract zip archive with powershell").is_ok() {
            return Ok(());
        }
    }

    let mut unzip_command = Command::new("unzip");
    unzip_command.arg("-q").arg(archive_path).arg("-d").arg(dst);
    if run_command(&mut unzip_command, "failed to extract zip archive with unzip").is_ok() {
        return Ok(());
    }

    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract zip archive with tar fallback",
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeTool {
    AptGet,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
    Brew,
}

impl NativeTool {
    const DETECTION_ORDER: [NativeTool; 7] = [
        Self::AptGet,
        Self::Dnf,
        Self::Yum,
        Self::Pacman,
        Self::Zypper,
        Self::Apk,
        Self::Brew,
    ];

    fn program(self) -> &'static str {
        match self {
            Self::AptGet => "apt-get",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Apk => "apk",
            Self::Brew => "brew",
        }
    }

    fn install_args(self) -> &'static [&'static str] {
        match self {
            Self::AptGet | Self::Dnf | Self::Yum | Self::Zypper => &["install", "-y"],
            Self::Pacman => &["-S", "--noconfirm"],
            Self::Apk => &["add"],
            Self::Brew => &["install"],
        }
    }

    fn remove_args(self) -> &'static [&'static str] {
        match self {
            Self::AptGet | Self::Dnf | Self::Yum | Self::Zypper => &["remove", "-y"],
            Self::Pacman => &["-R", "--noconfirm"],
            Self::Apk => &["del"],
            Self::Brew => &["uninstall"],
        }
    }
}

/// Delegates to the first package manager found on `PATH`.
pub struct SystemPackageManager {
    tool: Option<NativeTool>,
}

impl SystemPackageManager {
    pub fn detect() -> Self {
        let tool = NativeTool::DETECTION_ORDER
            .into_iter()
            .find(|tool| which::which(tool.program()).is_ok());
        debug!(tool = ?tool, "detected native package manager");
        Self { tool }
    }

    fn invoke(&self, args: fn(NativeTool) -> &'static [&'static str], name: &str) -> Result<()> {
        let tool = self
            .tool
            .ok_or_else(|| anyhow!("no supported native package manager found on PATH"))?;
        let mut command = Command::new(tool.program());
        command.args(args(tool)).arg(name);
        run_command(
            &mut command,
            &format!("{} failed for package '{name}'", tool.program()),
        )
    }
}

impl NativePackageManager for SystemPackageManager {
    fn install(&self, name: &str) -> Result<()> {
        self.invoke(NativeTool::install_args, name)
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.invoke(NativeTool::remove_args, name)
    }
}

pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn shell(&self, command_line: &str, working_dir: &Path) -> Result<Option<i32>> {
        let mut command = if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(command_line);
            command
        } else {
            let mut command = Command::new("sh");
            command.arg("-c").arg(command_line);
            command
        };
        let status = command
            .current_dir(working_dir)
            .status()
            .with_context(|| format!("failed to start shell for '{command_line}'"))?;
        Ok(status.code())
    }

    fn run(&self, command: &mut Command, context: &str) -> Result<()> {
        run_command(command, context)
    }

    fn capture(&self, command: &mut Command, context: &str) -> Result<String> {
        let output = command
            .output()
            .with_context(|| format!("{context}: command failed to start"))?;
        if !output.status.success() {
            return Err(anyhow!("{context}: status={}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub struct SystemCommandLocator;

impl CommandLocator for SystemCommandLocator {
    fn locate(&self, command: &str) -> Option<PathBuf> {
        which::which(command).ok()
    }
}

/// `KEY=value` lines in a file such as `/etc/environment`.
pub struct EnvironmentFile {
    path: PathBuf,
}

impl EnvironmentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        }
    }

    fn write(&self, content: &str) -> Result<()> {
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

impl EnvironmentStore for EnvironmentFile {
    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut content = self.read()?;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("{name}={value}\n"));
        self.write(&content)?;
        std::env::set_var(name, value);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let content = self.read()?;
        let kept = content
            .lines()
            .filter(|line| {
                line.split_once('=')
                    .map_or(true, |(key, _)| key.trim() != name)
            })
            .collect::<Vec<_>>();
        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        if rewritten != content {
            self.write(&rewritten)?;
        }
        std::env::remove_var(name);
        Ok(())
    }
}

const WINDOWS_MACHINE_ENVIRONMENT_KEY: &str =
    r"HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

/// Machine-wide variables through `SETX /m` and the registry.
pub struct WindowsMachineEnvironment;

impl EnvironmentStore for WindowsMachineEnvironment {
    fn set(&self, name: &str, value: &str) -> Result<()> {
        run_command(
            Command::new("SETX").arg("/m").arg(name).arg(value),
            &format!("failed to set environment variable {name}"),
        )?;
        std::env::set_var(name, value);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        run_command(
            Command::new("REG")
                .arg("DELETE")
                .arg(WINDOWS_MACHINE_ENVIRONMENT_KEY)
                .arg("/F")
                .arg("/V")
                .arg(name),
            &format!("failed to remove environment variable {name}"),
        )?;
        std::env::remove_var(name);
        Ok(())
    }
}

pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn message(&self, text: &str) {
        println!("{text}");
    }

    fn warning(&self, text: &str) {
        eprintln!("warning: {text}");
    }
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

fn escape_ps_single_quote(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}
