use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use anyhow::Result;
use cone_core::PackageManifest;
use cone_installer::{
    Downloader, InstallOutcome, InstalledPackageRecord, InstalledPackageRegistry,
    IntegrationPaths, PrefixLayout, Reporter, UninstallOutcome, UpdateOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    let no_color = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
    let dumb = std::env::var("TERM").is_ok_and(|term| term == "dumb");
    if std::io::stdout().is_terminal() && !no_color && !dumb {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn warning_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Yellow.into()))
        .effects(Effects::BOLD)
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

pub(crate) fn print_lines(lines: impl IntoIterator<Item = String>) {
    for line in lines {
        println!("{line}");
    }
}

/// Engine messages on stdout, warnings on stderr.
pub(crate) struct TerminalReporter {
    style: OutputStyle,
}

impl TerminalReporter {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self { style }
    }
}

impl Reporter for TerminalReporter {
    fn message(&self, text: &str) {
        println!("{text}");
    }

    fn warning(&self, text: &str) {
        match self.style {
            OutputStyle::Plain => eprintln!("warning: {text}"),
            OutputStyle::Rich => eprintln!(
                "{}",
                colorize(warning_style(), &render_status_line(self.style, "warn", text))
            ),
        }
    }
}

/// Shows a spinner while the wrapped downloader runs.
pub(crate) struct ProgressDownloader {
    inner: Box<dyn Downloader>,
    style: OutputStyle,
}

impl ProgressDownloader {
    pub(crate) fn new(inner: Box<dyn Downloader>, style: OutputStyle) -> Self {
        Self { inner, style }
    }
}

impl Downloader for ProgressDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<()> {
        let spinner = start_spinner(self.style, &format!("downloading {}", download_label(url)));
        let result = self.inner.download(url, destination);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        result
    }
}

fn start_spinner(style: OutputStyle, message: &str) -> Option<ProgressBar> {
    if style != OutputStyle::Rich {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed}") {
        spinner.set_style(template.tick_chars(".oO@* "));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Some(spinner)
}

/// Last path segment of a URL, without any query string.
pub(crate) fn download_label(url: &str) -> &str {
    let path = url.split(|ch| ch == '?' || ch == '#').next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
}

pub(crate) fn format_install_outcome(
    style: OutputStyle,
    name: &str,
    outcome: &InstallOutcome,
) -> String {
    match outcome {
        InstallOutcome::Installed => render_status_line(style, "ok", &format!("installed {name}")),
        InstallOutcome::AlreadyInstalled => {
            render_status_line(style, "skip", &format!("{name} is already installed"))
        }
        InstallOutcome::PromotedToManual => render_status_line(
            style,
            "ok",
            &format!("{name} is now marked as explicitly installed"),
        ),
        InstallOutcome::PrerequisitesUnmet { .. } => {
            render_status_line(style, "warn", &format!("{name} was not installed"))
        }
    }
}

pub(crate) fn format_uninstall_outcome(
    style: OutputStyle,
    name: &str,
    outcome: UninstallOutcome,
) -> String {
    match outcome {
        UninstallOutcome::Uninstalled => {
            render_status_line(style, "ok", &format!("uninstalled {name}"))
        }
        UninstallOutcome::NotInstalled => {
            render_status_line(style, "warn", &format!("{name} is not installed"))
        }
    }
}

pub(crate) fn format_update_outcome(
    style: OutputStyle,
    name: &str,
    outcome: &UpdateOutcome,
) -> String {
    match outcome {
        UpdateOutcome::RanUpdateSteps => {
            render_status_line(style, "ok", &format!("updated {name}"))
        }
        UpdateOutcome::Reinstalled { from, to } => {
            let message = match from {
                Some(from) => format!("updated {name} {from} -> {to}"),
                None => format!("updated {name} to {to}"),
            };
            render_status_line(style, "ok", &message)
        }
        UpdateOutcome::UpToDate => {
            render_status_line(style, "skip", &format!("{name} is up to date"))
        }
        UpdateOutcome::NotInstalled => {
            render_status_line(style, "warn", &format!("{name} is not installed"))
        }
    }
}

pub(crate) fn format_gc_lines(style: OutputStyle, removed: &[String]) -> Vec<String> {
    if removed.is_empty() {
        return vec![render_status_line(style, "skip", "no unneeded dependencies")];
    }
    removed
        .iter()
        .map(|name| render_status_line(style, "ok", &format!("removed {name}")))
        .collect()
}

pub(crate) fn format_list_lines(registry: &InstalledPackageRegistry) -> Vec<String> {
    registry
        .iter()
        .map(|(name, record)| {
            let mut line = match &record.version {
                Some(version) => format!("{name} {version}"),
                None => name.to_string(),
            };
            if !record.manual {
                line.push_str(" (dependency)");
            }
            line
        })
        .collect()
}

pub(crate) fn format_search_lines(matches: &[&PackageManifest]) -> Vec<String> {
    matches
        .iter()
        .map(|manifest| {
            let mut line = match &manifest.version {
                Some(version) => format!("{} {version}", manifest.name),
                None => manifest.name.clone(),
            };
            if !manifest.aliases.is_empty() {
                line.push_str(&format!(" (aliases: {})", manifest.aliases.join(", ")));
            }
            line
        })
        .collect()
}

pub(crate) fn format_info_lines(
    style: OutputStyle,
    manifest: &PackageManifest,
    record: Option<&InstalledPackageRecord>,
) -> Vec<String> {
    let display_name = manifest.default_display_name();
    let mut lines = Vec::new();
    if let Some(header) = render_section_header(style, &display_name) {
        lines.push(header);
    }

    lines.push(format!("Package: {}", manifest.name));
    lines.push(format!("Name: {display_name}"));
    if let Some(version) = &manifest.version {
        lines.push(format!("Version: {version}"));
    }
    if let Some(source) = &manifest.source {
        lines.push(format!("Source: {source}"));
    }
    if !manifest.aliases.is_empty() {
        lines.push(format!("Aliases: {}", manifest.aliases.join(", ")));
    }
    if !manifest.dependencies.is_empty() {
        lines.push(format!("Dependencies: {}", manifest.dependencies.join(", ")));
    }
    if !manifest.shortcuts.is_empty() {
        let names = manifest.shortcuts.keys().cloned().collect::<Vec<_>>();
        lines.push(format!("Commands: {}", names.join(", ")));
    }

    let installed = match record {
        Some(record) => {
            let how = if record.manual { "explicit" } else { "dependency" };
            match &record.version {
                Some(version) => format!("Installed: {version} ({how})"),
                None => format!("Installed: yes ({how})"),
            }
        }
        None => "Installed: no".to_string(),
    };
    lines.push(installed);
    lines
}

pub(crate) fn format_path_lines(
    layout: &PrefixLayout,
    catalog_path: &Path,
    paths: &IntegrationPaths,
) -> Vec<String> {
    let optional = |path: &Option<PathBuf>| {
        path.as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    };
    vec![
        format!("prefix: {}", layout.prefix().display()),
        format!("packages: {}", layout.packages_dir().display()),
        format!("registry: {}", layout.registry_path().display()),
        format!("catalog: {}", catalog_path.display()),
        format!("config: {}", layout.config_path().display()),
        format!("launchers: {}", paths.launcher_dir.display()),
        format!("applications: {}", optional(&paths.applications_dir)),
        format!("start menu: {}", optional(&paths.start_menu_dir)),
        format!("environment: {}", paths.environment_file.display()),
    ]
}
