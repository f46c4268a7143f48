use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::json;

use super::*;

fn windows_x64() -> HostPlatform {
    HostPlatform::new(HostOs::Windows, HostArch::X64)
}

fn linux_x64() -> HostPlatform {
    HostPlatform::new(HostOs::Linux, HostArch::X64)
}

fn variants(keys: &[&str]) -> BTreeMap<String, u32> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| (key.to_string(), index as u32))
        .collect()
}

#[test]
fn parse_manifest() {
    let content = r#"{
        "name": "composer",
        "aliases": ["composer-php"],
        "risky_aliases": ["comp"],
        "version": "2.7.1",
        "source": "main",
        "dependencies": ["php"],
        "prerequisites": [
            {"type": "command_not_found", "value": "composer"},
            {"type": "os", "windows": true, "linux": true}
        ],
        "install": [
            {"type": "download", "url": "https://example.test/composer-{version}.phar", "target": "composer.phar",
             "hash": {"sha256": "abc"}},
            {"type": "keep", "file": "composer.phar", "as": "composer.phar"}
        ],
        "uninstall": [{"type": "echo", "value": "bye"}],
        "shortcuts": {
            "composer": {"target": "composer.phar", "target_arguments": [{"path": "lib"}, {"value": "--ansi"}]}
        },
        "variables": {"COMPOSER_HOME": {"path": "home"}, "COMPOSER_NO_INTERACTION": {"value": "1"}}
    }"#;

    let manifest = PackageManifest::from_json_str(content).expect("manifest should parse");
    assert_eq!(manifest.name, "composer");
    assert_eq!(manifest.aliases, vec!["composer-php"]);
    assert_eq!(manifest.risky_aliases, vec!["comp"]);
    assert_eq!(manifest.version.as_deref(), Some("2.7.1"));
    assert_eq!(manifest.dependencies, vec!["php"]);
    assert_eq!(manifest.prerequisites.len(), 2);
    assert_eq!(
        manifest.prerequisites[0],
        Prerequisite::CommandNotFound {
            command: "composer".to_string()
        }
    );
    assert_eq!(manifest.install.len(), 2);
    assert_eq!(
        manifest.install[1],
        Step::Keep {
            file: "composer.phar".to_string(),
            as_name: "composer.phar".to_string()
        }
    );
    let shortcut = &manifest.shortcuts["composer"];
    assert_eq!(shortcut.target.as_deref(), Some("composer.phar"));
    assert_eq!(
        shortcut.target_arguments,
        vec![
            TargetArgument::Path {
                path: "lib".to_string()
            },
            TargetArgument::Value {
                value: "--ansi".to_string()
            }
        ]
    );
    assert_eq!(
        manifest.variables["COMPOSER_NO_INTERACTION"],
        VariableSpec::Value {
            value: "1".to_string()
        }
    );
    assert!(manifest.update.is_none());
    assert!(manifest.has_integration_points());
}

#[test]
fn manifest_rejects_unknown_step_type_at_parse_time() {
    let err = PackageManifest::from_value(json!({
        "name": "broken",
        "install": [{"type": "echo", "value": "ok"}, {"type": "format_disk"}]
    }))
    .expect_err("unknown step type must be rejected");

    assert!(matches!(
        err.kind(),
        ManifestError::UnknownStepType(step_type) if step_type == "format_disk"
    ));
    assert!(err.to_string().contains("broken"), "unexpected error: {err}");
}

#[test]
fn manifest_rejects_unknown_step_type_nested_in_platform_switch() {
    let err = PackageManifest::from_value(json!({
        "name": "nested",
        "install": [{"type": "platform_switch", "linux": [{"type": "reboot"}]}]
    }))
    .expect_err("nested unknown step type must be rejected");

    assert!(matches!(err.kind(), ManifestError::UnknownStepType(_)));
}

#[test]
fn manifest_rejects_unknown_prerequisite_type() {
    let err = PackageManifest::from_value(json!({
        "name": "gated",
        "prerequisites": [{"type": "ram_at_least", "value": "4G"}]
    }))
    .expect_err("unknown prerequisite type must be rejected");

    assert!(matches!(
        err.kind(),
        ManifestError::UnknownPrerequisiteType(prerequisite) if prerequisite == "ram_at_least"
    ));
}

#[test]
fn step_missing_required_field_is_invalid() {
    let err = Step::from_value(json!({"type": "extract", "file": "a.zip"}))
        .expect_err("extract without target must be rejected");
    assert!(
        matches!(&err, ManifestError::InvalidStep { step_type, reason } if step_type == "extract" && reason.contains("target")),
        "unexpected error: {err}"
    );
}

#[test]
fn uninstall_unix_package_is_an_alias_of_remove() {
    let step = Step::from_value(json!({"type": "uninstall_unix_package", "name": "nginx"}))
        .expect("alias must parse");
    assert_eq!(
        step,
        Step::RemoveUnixPackage {
            name: "nginx".to_string()
        }
    );
    assert_eq!(step.to_value()["type"], "remove_unix_package");
}

#[test]
fn registry_stored_steps_survive_serde() {
    let steps = vec![
        Step::PlatformSwitch {
            variants: BTreeMap::from([(
                "linux".to_string(),
                vec![Step::InstallUnixPackage {
                    name: "libzip".to_string(),
                }],
            )]),
        },
        Step::Download(DownloadStep {
            url: "https://example.test/a.tar.gz".to_string(),
            target: "a.tar.gz".to_string(),
            hash: BTreeMap::from([("sha256".to_string(), "00ff".to_string())]),
        }),
        Step::Keep {
            file: "a".to_string(),
            as_name: String::new(),
        },
    ];

    let encoded = serde_json::to_string(&steps).expect("steps must serialize");
    let decoded: Vec<Step> = serde_json::from_str(&encoded).expect("steps must deserialize");
    assert_eq!(decoded, steps);
}

#[test]
fn inverse_steps_swap_toggle_and_native_package_actions() {
    let enable = Step::EnablePhpExtension {
        name: "curl".to_string(),
    };
    assert_eq!(
        enable.inverse(),
        Some(Step::DisablePhpExtension {
            name: "curl".to_string()
        })
    );
    let install = Step::InstallUnixPackage {
        name: "git".to_string(),
    };
    assert_eq!(
        install.inverse(),
        Some(Step::RemoveUnixPackage {
            name: "git".to_string()
        })
    );
    assert_eq!(
        Step::Echo {
            value: "hi".to_string()
        }
        .inverse(),
        None
    );
}

#[test]
fn download_and_extract_uses_zip_for_windows_variants() {
    let source = DownloadSource {
        url: "https://example.test/php.zip".to_string(),
        hash: BTreeMap::new(),
    };

    let [download, extract, delete] = Step::download_and_extract_steps("php", "windows_x64", &source);
    assert_eq!(
        download,
        Step::Download(DownloadStep {
            url: source.url.clone(),
            target: "php.zip".to_string(),
            hash: BTreeMap::new(),
        })
    );
    assert_eq!(
        extract,
        Step::Extract {
            file: "php.zip".to_string(),
            target: "php".to_string()
        }
    );
    assert_eq!(
        delete,
        Step::Delete {
            file: "php.zip".to_string()
        }
    );

    let [download, ..] = Step::download_and_extract_steps("php", "linux_x64", &source);
    let Step::Download(download) = download else {
        panic!("first expanded step must be a download");
    };
    assert_eq!(download.target, "php.tar.gz");
}

#[test]
fn windows_x64_selects_windows_and_arch_specific_keys_only() {
    let present = variants(&["windows", "windows_x64", "unix", "linux", "macos", "other"]);
    let selected = windows_x64()
        .select(&present)
        .into_iter()
        .map(|(key, _)| key)
        .collect::<Vec<_>>();
    assert_eq!(selected, vec!["windows", "windows_x64"]);
}

#[test]
fn linux_selects_generic_unix_before_linux_keys() {
    let present = variants(&["linux_x64", "unix", "macos", "windows", "unix_x86"]);
    let selected = linux_x64().select_keys(|key| present.contains_key(key));
    assert_eq!(selected, vec!["unix", "linux_x64"]);
}

#[test]
fn macos_does_not_fire_linux_keys() {
    let macos = HostPlatform::new(HostOs::MacOs, HostArch::X64);
    let present = variants(&["linux", "macos_x64"]);
    let selected = macos.select_keys(|key| present.contains_key(key));
    assert_eq!(selected, vec!["macos_x64"]);
}

#[test]
fn other_key_fires_only_when_nothing_else_matches() {
    let present = variants(&["windows", "other"]);
    assert_eq!(
        linux_x64().select_keys(|key| present.contains_key(key)),
        vec!["other"]
    );
    assert_eq!(
        windows_x64().select_keys(|key| present.contains_key(key)),
        vec!["windows"]
    );

    let bsd = HostPlatform::new(HostOs::OtherUnix, HostArch::X86);
    let present = variants(&["unix_x86", "other"]);
    assert_eq!(
        bsd.select_keys(|key| present.contains_key(key)),
        vec!["unix_x86"]
    );
}

#[test]
fn os_prerequisite_uses_platform_resolution() {
    let prerequisite = Prerequisite::from_value(json!({"type": "os", "windows": true}))
        .expect("os prerequisite must parse");
    assert!(prerequisite.os_allows(&windows_x64()));
    assert!(!prerequisite.os_allows(&linux_x64()));

    let other = Prerequisite::from_value(json!({"type": "os", "other": true}))
        .expect("os prerequisite must parse");
    assert!(other.os_allows(&linux_x64()));
}

#[test]
fn display_name_defaults_to_capitalized_name() {
    let manifest = PackageManifest::from_value(json!({"name": "nodejs"})).expect("must parse");
    assert_eq!(manifest.default_display_name(), "Nodejs");

    let named = PackageManifest::from_value(json!({"name": "nodejs", "display_name": "Node.js"}))
        .expect("must parse");
    assert_eq!(named.default_display_name(), "Node.js");
}

#[test]
fn labelled_omits_v_prefix_for_dev_builds() {
    let release = PackageManifest::from_value(json!({"name": "php", "version": "8.3.1"}))
        .expect("must parse");
    assert_eq!(release.labelled("PHP"), "PHP v8.3.1");

    let dev = PackageManifest::from_value(json!({"name": "php", "version": "8.4-dev"}))
        .expect("must parse");
    assert!(dev.is_dev_build());
    assert_eq!(dev.labelled("PHP"), "PHP 8.4-dev");

    let unversioned = PackageManifest::from_value(json!({"name": "php"})).expect("must parse");
    assert_eq!(unversioned.labelled("PHP"), "PHP");
}

#[test]
fn compare_versions_orders_dotted_numbers_numerically() {
    assert_eq!(compare_versions("2.0", "1.0"), Ordering::Greater);
    assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
    assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
    assert_eq!(compare_versions("1.0.1", "1.0.1"), Ordering::Equal);
}

#[test]
fn compare_versions_ranks_prerelease_words() {
    assert_eq!(compare_versions("1.0rc1", "1.0"), Ordering::Less);
    assert_eq!(compare_versions("1.0-alpha", "1.0-beta"), Ordering::Less);
    assert_eq!(compare_versions("1.0-beta2", "1.0-rc1"), Ordering::Less);
    assert_eq!(compare_versions("1.0pl1", "1.0"), Ordering::Greater);
}

#[test]
fn newer_version_checks() {
    assert!(is_newer_version("2.0", Some("1.0")));
    assert!(!is_newer_version("1.0", Some("1.0")));
    assert!(!is_newer_version("0.9", Some("1.0")));
    assert!(is_newer_version("1.0-dev", Some("1.0")));
    assert!(is_newer_version("1.0-dev", Some("99.0")));
    assert!(is_newer_version("1.0", None));
}
