use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use cone_catalog::Catalog;
use cone_installer::{
    InstallOutcome, InstalledPackageRecord, InstalledPackageRegistry, IntegrationPaths,
    PrefixLayout, UninstallOutcome, UpdateOutcome,
};

use crate::completion::{write_completions_script, CliCompletionShell};
use crate::dispatch::resolve_package_names;
use crate::render::{
    download_label, format_gc_lines, format_info_lines, format_install_outcome,
    format_list_lines, format_path_lines, format_search_lines, format_uninstall_outcome,
    format_update_outcome, render_status_line, OutputStyle,
};
use crate::{Cli, Commands};

fn sample_catalog() -> Catalog {
    Catalog::from_json_str(
        r#"[
            {"name": "nodejs", "version": "20.11.0", "aliases": ["node"], "risky_aliases": ["js"],
             "dependencies": ["openssl"], "shortcuts": {"node": {"target": "bin/node"}}},
            {"name": "openssl", "version": "3.2.1"},
            {"name": "php", "display_name": "PHP", "version": "8.4-dev", "source": "nightly"}
        ]"#,
    )
    .expect("catalog must parse")
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn install_accepts_many_names_and_force() {
    let cli = Cli::try_parse_from(["cone", "install", "php", "composer", "--force"])
        .expect("install must parse");
    match cli.command {
        Commands::Install { names, force } => {
            assert_eq!(names, vec!["php", "composer"]);
            assert!(force);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn install_requires_a_name() {
    assert!(Cli::try_parse_from(["cone", "install"]).is_err());
}

#[test]
fn global_overrides_parse_after_the_subcommand() {
    let cli = Cli::try_parse_from([
        "cone",
        "list",
        "--prefix",
        "/opt/cone",
        "--catalog",
        "/srv/packages.json",
    ])
    .expect("list must parse");
    assert_eq!(cli.prefix, Some(PathBuf::from("/opt/cone")));
    assert_eq!(cli.catalog, Some(PathBuf::from("/srv/packages.json")));
    assert!(matches!(cli.command, Commands::List));
}

#[test]
fn update_without_names_means_everything() {
    let cli = Cli::try_parse_from(["cone", "update"]).expect("update must parse");
    assert!(matches!(&cli.command, Commands::Update { names } if names.is_empty()));
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed php"),
        "installed php"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "installed php"),
        "[OK] installed php"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "php is not installed"),
        "[WARN] php is not installed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "skip", "php is up to date"),
        "[..] php is up to date"
    );
}

#[test]
fn outcome_lines_describe_what_happened() {
    assert_eq!(
        format_install_outcome(OutputStyle::Plain, "php", &InstallOutcome::Installed),
        "installed php"
    );
    assert_eq!(
        format_install_outcome(
            OutputStyle::Rich,
            "php",
            &InstallOutcome::PrerequisitesUnmet {
                reason: "PHP is not available for this platform.".to_string()
            }
        ),
        "[WARN] php was not installed"
    );
    assert_eq!(
        format_uninstall_outcome(OutputStyle::Plain, "php", UninstallOutcome::NotInstalled),
        "php is not installed"
    );
    assert_eq!(
        format_update_outcome(
            OutputStyle::Rich,
            "php",
            &UpdateOutcome::Reinstalled {
                from: Some("8.3.1".to_string()),
                to: "8.3.2".to_string()
            }
        ),
        "[OK] updated php 8.3.1 -> 8.3.2"
    );
    assert_eq!(
        format_gc_lines(OutputStyle::Plain, &[]),
        vec!["no unneeded dependencies"]
    );
    assert_eq!(
        format_gc_lines(OutputStyle::Plain, &["openssl".to_string()]),
        vec!["removed openssl"]
    );
}

#[test]
fn list_marks_dependencies() {
    let mut registry = InstalledPackageRegistry::empty("/nonexistent/installed_packages.json");
    registry.insert(
        "nodejs",
        InstalledPackageRecord {
            version: Some("20.11.0".to_string()),
            manual: true,
            ..InstalledPackageRecord::default()
        },
    );
    registry.insert(
        "openssl",
        InstalledPackageRecord {
            version: Some("3.2.1".to_string()),
            manual: false,
            ..InstalledPackageRecord::default()
        },
    );
    registry.insert(
        "legacy",
        InstalledPackageRecord {
            manual: true,
            ..InstalledPackageRecord::default()
        },
    );

    assert_eq!(
        format_list_lines(&registry),
        vec!["legacy", "nodejs 20.11.0", "openssl 3.2.1 (dependency)"]
    );
}

#[test]
fn search_and_info_lines() {
    let catalog = sample_catalog();
    assert_eq!(
        format_search_lines(&catalog.search("o")),
        vec!["nodejs 20.11.0 (aliases: node)", "openssl 3.2.1"]
    );

    let nodejs = catalog.find("node", true).expect("alias must resolve");
    let record = InstalledPackageRecord {
        version: Some("20.11.0".to_string()),
        manual: false,
        ..InstalledPackageRecord::default()
    };
    assert_eq!(
        format_info_lines(OutputStyle::Plain, nodejs, Some(&record)),
        vec![
            "Package: nodejs",
            "Name: Nodejs",
            "Version: 20.11.0",
            "Aliases: node",
            "Dependencies: openssl",
            "Commands: node",
            "Installed: 20.11.0 (dependency)",
        ]
    );

    let php = catalog.get("php").expect("php must exist");
    let lines = format_info_lines(OutputStyle::Rich, php, None);
    assert!(lines[0].contains("== PHP =="));
    assert_eq!(lines.last().map(String::as_str), Some("Installed: no"));
    assert!(lines.contains(&"Source: nightly".to_string()));
}

#[test]
fn package_names_resolve_through_aliases_but_not_risky_ones() {
    let catalog = sample_catalog();
    assert_eq!(
        resolve_package_names(&catalog, &["node".to_string(), "php".to_string()])
            .expect("names must resolve"),
        vec!["nodejs", "php"]
    );

    let err = resolve_package_names(&catalog, &["js".to_string()])
        .expect_err("risky alias must not resolve");
    assert_eq!(err.to_string(), "unknown package 'js'; did you mean 'nodejs'?");

    let err = resolve_package_names(&catalog, &["ruby".to_string()])
        .expect_err("unknown name must fail");
    assert_eq!(err.to_string(), "unknown package 'ruby'");
}

#[test]
fn path_lines_list_every_location() {
    let layout = PrefixLayout::new("/opt/cone");
    let paths = IntegrationPaths {
        launcher_dir: PathBuf::from("/usr/bin"),
        applications_dir: None,
        start_menu_dir: None,
        environment_file: PathBuf::from("/etc/environment"),
    };
    let lines = format_path_lines(&layout, &layout.catalog_path(), &paths);
    assert_eq!(lines[0], "prefix: /opt/cone");
    assert!(lines.contains(&"launchers: /usr/bin".to_string()));
    assert!(lines.contains(&"applications: (none)".to_string()));
    assert_eq!(lines.len(), 9);
}

#[test]
fn download_label_is_the_file_name() {
    assert_eq!(
        download_label("https://example.test/php/php-8.3.1.tar.gz?mirror=eu"),
        "php-8.3.1.tar.gz"
    );
    assert_eq!(download_label("https://example.test/dist/"), "dist");
}

#[test]
fn completions_are_generated_for_cone() {
    let mut script = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut script)
        .expect("completion script must render");
    let script = String::from_utf8(script).expect("script must be utf-8");
    assert!(script.contains("cone"));
    assert!(script.contains("install"));
}
