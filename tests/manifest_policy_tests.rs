#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the Parlor client.
//!
//! These tests parse `Cargo.toml` and check that the panic-free lint policy
//! and the feature layout have not drifted. All checks are synchronous
//! filesystem reads.

use std::path::PathBuf;

/// Lints that must stay at deny level in library code.
const REQUIRED_DENY_LINTS: &[&str] = &[
    "unwrap_used",
    "expect_used",
    "panic",
    "todo",
    "unimplemented",
    "indexing_slicing",
];

fn manifest() -> toml::Table {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str::<toml::Table>(&text)
        .unwrap_or_else(|e| panic!("Cargo.toml does not parse: {e}"))
}

fn table<'a>(parent: &'a toml::Table, key: &str) -> &'a toml::Table {
    parent
        .get(key)
        .and_then(toml::Value::as_table)
        .unwrap_or_else(|| panic!("Cargo.toml is missing [{key}]"))
}

fn feature_members(features: &toml::Table, name: &str) -> Vec<String> {
    features
        .get(name)
        .and_then(toml::Value::as_array)
        .unwrap_or_else(|| panic!("feature `{name}` is not declared"))
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect()
}

#[test]
fn panic_free_lints_are_denied() {
    let manifest = manifest();
    let clippy = table(table(&manifest, "lints"), "clippy");
    for lint in REQUIRED_DENY_LINTS {
        assert_eq!(
            clippy.get(*lint).and_then(toml::Value::as_str),
            Some("deny"),
            "`{lint}` must be set to deny in [lints.clippy] to keep library code panic-free"
        );
    }
}

#[test]
fn websocket_is_the_default_transport() {
    let manifest = manifest();
    let features = table(&manifest, "features");
    assert_eq!(feature_members(features, "default"), ["transport-websocket"]);

    let websocket = feature_members(features, "transport-websocket");
    for required in ["dep:tokio-tungstenite", "dep:futures-util", "tokio-runtime"] {
        assert!(
            websocket.iter().any(|m| m == required),
            "transport-websocket must enable {required}"
        );
    }
}

#[test]
fn runtime_features_stay_optional() {
    let manifest = manifest();
    let deps = table(&manifest, "dependencies");

    let tokio_features: Vec<&str> = table(deps, "tokio")
        .get("features")
        .and_then(toml::Value::as_array)
        .expect("tokio features")
        .iter()
        .filter_map(toml::Value::as_str)
        .collect();
    assert!(
        !tokio_features.contains(&"rt") && !tokio_features.contains(&"time"),
        "tokio rt/time belong behind the tokio-runtime feature, got {tokio_features:?}"
    );

    for optional in ["tokio-tungstenite", "futures-util"] {
        assert_eq!(
            table(deps, optional)
                .get("optional")
                .and_then(toml::Value::as_bool),
            Some(true),
            "{optional} must be optional"
        );
    }
}

#[test]
fn demos_declare_required_features() {
    let manifest = manifest();
    let examples = manifest
        .get("example")
        .and_then(toml::Value::as_array)
        .expect("[[example]] entries");
    assert!(!examples.is_empty());
    for example in examples {
        let name = example.get("name").and_then(toml::Value::as_str).unwrap();
        let path = example.get("path").and_then(toml::Value::as_str).unwrap();
        assert!(
            path.starts_with("demos/"),
            "example `{name}` must live under demos/"
        );
        assert!(
            example.get("required-features").is_some(),
            "example `{name}` must declare required-features"
        );
        assert!(
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(path).is_file(),
            "example `{name}` points at missing file {path}"
        );
    }
}
