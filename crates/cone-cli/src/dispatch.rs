use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use cone_catalog::Catalog;
use cone_core::HostPlatform;
use cone_installer::{
    default_user_prefix, ConeConfig, Flow, HostServices, InstalledPackageRegistry, PrefixLayout,
    Session,
};
use tracing::debug;

use crate::completion::write_completions_script;
use crate::render::{
    current_output_style, format_gc_lines, format_info_lines, format_install_outcome,
    format_list_lines, format_path_lines, format_search_lines, format_uninstall_outcome,
    format_update_outcome, print_lines, OutputStyle, ProgressDownloader, TerminalReporter,
};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let style = current_output_style();
    let prefix = cli.prefix.as_deref();
    let catalog_override = cli.catalog.as_deref();

    match cli.command {
        Commands::Install { names, force } => {
            let mut session = open_session(prefix, catalog_override, style)?;
            let names = resolve_package_names(session.catalog(), &names)?;
            let outcomes = session.install_all(&names, force)?;
            print_lines(
                outcomes
                    .iter()
                    .map(|(name, outcome)| format_install_outcome(style, name, outcome)),
            );
        }
        Commands::Uninstall { names } => {
            let mut session = open_session(prefix, catalog_override, style)?;
            let names = installed_names(&mut session, &names)?;
            let outcomes = session.uninstall_all(&names)?;
            print_lines(
                outcomes
                    .iter()
                    .map(|(name, outcome)| format_uninstall_outcome(style, name, *outcome)),
            );
        }
        Commands::Update { names } => {
            let mut session = open_session(prefix, catalog_override, style)?;
            let outcomes = if names.is_empty() {
                session.update_all()?
            } else {
                let names = installed_names(&mut session, &names)?;
                let mut outcomes = Vec::with_capacity(names.len());
                for name in names {
                    let outcome = session.update(&name, Flow::Nested)?;
                    outcomes.push((name, outcome));
                }
                session.remove_unneeded_dependencies(Flow::TopLevel)?;
                outcomes
            };
            print_lines(
                outcomes
                    .iter()
                    .map(|(name, outcome)| format_update_outcome(style, name, outcome)),
            );
        }
        Commands::List => {
            let layout = resolve_layout(prefix)?;
            let registry = InstalledPackageRegistry::load(layout.registry_path())?;
            if registry.is_empty() {
                println!("No packages installed");
            } else {
                print_lines(format_list_lines(&registry));
            }
        }
        Commands::Info { name } => {
            let layout = resolve_layout(prefix)?;
            let config = ConeConfig::load(&layout)?;
            let catalog = load_catalog(&layout, &config, catalog_override)?;
            let Some(manifest) = catalog.find(&name, true) else {
                println!("No package found: {name}");
                return Ok(());
            };
            let registry = InstalledPackageRegistry::load(layout.registry_path())?;
            print_lines(format_info_lines(
                style,
                manifest,
                registry.get(&manifest.name),
            ));
        }
        Commands::Search { query } => {
            let layout = resolve_layout(prefix)?;
            let config = ConeConfig::load(&layout)?;
            let catalog = load_catalog(&layout, &config, catalog_override)?;
            let matches = catalog.search(&query);
            if matches.is_empty() {
                println!("No packages match '{query}'");
            } else {
                print_lines(format_search_lines(&matches));
            }
        }
        Commands::Gc => {
            let mut session = open_session(prefix, catalog_override, style)?;
            let removed = session.remove_unneeded_dependencies(Flow::TopLevel)?;
            print_lines(format_gc_lines(style, &removed));
        }
        Commands::Paths => {
            let layout = resolve_layout(prefix)?;
            let config = ConeConfig::load(&layout)?;
            let catalog_path = catalog_path(&layout, &config, catalog_override);
            let paths = config.integration_paths(&layout, HostPlatform::current().os);
            print_lines(format_path_lines(&layout, &catalog_path, &paths));
        }
        Commands::Completions { shell } => {
            let mut stdout = io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}

fn resolve_layout(prefix: Option<&Path>) -> Result<PrefixLayout> {
    let prefix = match prefix {
        Some(prefix) => prefix.to_path_buf(),
        None => default_user_prefix()?,
    };
    Ok(PrefixLayout::new(prefix))
}

fn catalog_path(layout: &PrefixLayout, config: &ConeConfig, catalog: Option<&Path>) -> PathBuf {
    catalog
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.catalog_path(layout))
}

fn load_catalog(
    layout: &PrefixLayout,
    config: &ConeConfig,
    catalog: Option<&Path>,
) -> Result<Catalog> {
    Catalog::load(&catalog_path(layout, config, catalog))
}

fn open_session(
    prefix: Option<&Path>,
    catalog: Option<&Path>,
    style: OutputStyle,
) -> Result<Session> {
    let layout = resolve_layout(prefix)?;
    layout.ensure_base_dirs()?;
    let config = ConeConfig::load(&layout)?;
    let catalog = load_catalog(&layout, &config, catalog)?;
    let platform = HostPlatform::current();
    let paths = config.integration_paths(&layout, platform.os);
    debug!(prefix = %layout.prefix().display(), os = platform.os.as_str(), "opening session");

    let mut host = HostServices::system(platform.os, &paths)?;
    host.reporter = Box::new(TerminalReporter::new(style));
    host.downloader = Box::new(ProgressDownloader::new(host.downloader, style));
    Ok(Session::new(layout, config, catalog, platform, host))
}

/// Catalog names for the requested packages. Risky aliases are never
/// followed; they only produce a hint.
pub(crate) fn resolve_package_names(catalog: &Catalog, names: &[String]) -> Result<Vec<String>> {
    names
        .iter()
        .map(|name| {
            if let Some(manifest) = catalog.find(name, true) {
                return Ok(manifest.name.clone());
            }
            match catalog.find_risky(name) {
                Some(manifest) => Err(anyhow!(
                    "unknown package '{name}'; did you mean '{}'?",
                    manifest.name
                )),
                None => Err(anyhow!("unknown package '{name}'")),
            }
        })
        .collect()
}

/// Installed names win over catalog aliases so packages removed from the
/// catalog can still be addressed.
fn installed_names(session: &mut Session, names: &[String]) -> Result<Vec<String>> {
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        if session.is_installed(name)? {
            resolved.push(name.clone());
            continue;
        }
        let name = session.resolve_name(name).unwrap_or(name).to_string();
        resolved.push(name);
    }
    Ok(resolved)
}
