use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use cone_core::ManifestError;

use super::*;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

const CATALOG: &str = r#"[
    {"name": "php", "aliases": ["php8"], "version": "8.3.1", "install": []},
    {"name": "composer", "aliases": ["composer-php"], "risky_aliases": ["comp"],
     "dependencies": ["php"], "install": []},
    {"name": "nodejs", "aliases": ["node"], "install": []},
    {"name": "php", "version": "0.0.1", "install": []}
]"#;

fn test_catalog_path() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "cone-catalog-tests-{}-{}-{}.json",
        std::process::id(),
        nanos,
        sequence
    ))
}

#[test]
fn load_reads_catalog_document() {
    let path = test_catalog_path();
    fs::write(&path, CATALOG).expect("must write catalog");

    let catalog = Catalog::load(&path).expect("catalog must load");
    assert_eq!(catalog.len(), 3);
    assert_eq!(
        catalog
            .packages()
            .iter()
            .map(|manifest| manifest.name.as_str())
            .collect::<Vec<_>>(),
        vec!["php", "composer", "nodejs"]
    );

    let _ = fs::remove_file(&path);
}

#[test]
fn load_reports_missing_catalog() {
    let path = test_catalog_path();
    let err = Catalog::load(&path).expect_err("missing catalog must fail");
    assert!(
        err.to_string().contains("catalog not found"),
        "unexpected error: {err}"
    );
}

#[test]
fn first_duplicate_entry_wins() {
    let catalog = Catalog::from_json_str(CATALOG).expect("catalog must parse");
    let php = catalog.get("php").expect("php must exist");
    assert_eq!(php.version.as_deref(), Some("8.3.1"));
}

#[test]
fn find_tries_name_then_aliases() {
    let catalog = Catalog::from_json_str(CATALOG).expect("catalog must parse");

    assert_eq!(
        catalog.find("node", true).map(|manifest| manifest.name.as_str()),
        Some("nodejs")
    );
    assert!(catalog.find("node", false).is_none());
    assert!(catalog.find("comp", true).is_none());
    assert_eq!(
        catalog.find_risky("comp").map(|manifest| manifest.name.as_str()),
        Some("composer")
    );
}

#[test]
fn search_matches_names_and_aliases_sorted() {
    let catalog = Catalog::from_json_str(CATALOG).expect("catalog must parse");
    let names = catalog
        .search("PHP")
        .into_iter()
        .map(|manifest| manifest.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["composer", "php"]);
}

#[test]
fn dependents_of_uses_current_manifests() {
    let catalog = Catalog::from_json_str(CATALOG).expect("catalog must parse");
    let installed = ["php", "composer", "nodejs"];
    let dependents = catalog.dependents_of("php", installed.iter().copied());
    assert_eq!(dependents, vec!["composer"]);
}

#[test]
fn unknown_step_type_fails_catalog_load_with_package_name() {
    let err = Catalog::from_json_str(
        r#"[{"name": "broken", "install": [{"type": "teleport"}]}]"#,
    )
    .expect_err("unknown step type must fail");

    let manifest_error = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ManifestError>())
        .expect("manifest error must be in the chain");
    assert!(matches!(
        manifest_error.kind(),
        ManifestError::UnknownStepType(step_type) if step_type == "teleport"
    ));
    assert!(format!("{err:#}").contains("broken"));
}

#[test]
fn catalog_must_be_an_array() {
    let err = Catalog::from_json_str(r#"{"name": "php"}"#).expect_err("object must fail");
    assert!(err.to_string().contains("JSON array"));
}
