use std::fs;
use std::path::Path;

use gridgrain::error_codes::{find_coded_error, E_MANIFEST_INVALID, E_OVERRIDE_INVALID};
use gridgrain::manifest::{
    load_and_validate_manifest, load_and_validate_manifest_with_options, ManifestLoadOptions,
    ParamOverride,
};
use gridgrain::schema::{BlendMode, Duration, GrainBackground, ShapeKind};
use gridgrain::snapshot::ConfigSnapshot;
use tempfile::tempdir;

fn write_manifest(path: &Path, yaml: &str) {
    fs::write(path, yaml).expect("manifest should write");
}

fn with_overrides(raw: &[&str]) -> ManifestLoadOptions {
    ManifestLoadOptions {
        overrides: raw
            .iter()
            .map(|value| ParamOverride::parse(value).expect("override should parse"))
            .collect(),
    }
}

#[test]
fn demo_manifests_load() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let default = load_and_validate_manifest(&root.join("default.yaml")).expect("default demo");
    assert_eq!(default.environment.total_frames(), 90);
    assert_eq!(default.environment.seed, Some(42));

    let blob = load_and_validate_manifest(&root.join("blob_light.yaml")).expect("blob demo");
    assert!(matches!(blob.environment.duration, Duration::Seconds(_)));
    assert_eq!(blob.environment.total_frames(), 96);
    assert_eq!(blob.environment.backing_size(), (720, 720));
    assert_eq!(blob.effect.shape, ShapeKind::Blob);
    assert_eq!(blob.effect.grain_background, GrainBackground::Light);
    assert_eq!(blob.effect.grain_blend_mode, BlendMode::Multiply);
    assert!(blob.environment.background.is_some());
}

#[test]
fn missing_effect_section_uses_defaults() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("bare.yaml");
    write_manifest(
        &path,
        "environment:\n  surface: { width: 32, height: 32 }\n  fps: 24\n  duration: { frames: 2 }\n",
    );

    let manifest = load_and_validate_manifest(&path).expect("manifest should load");
    assert_eq!(manifest.version, 1);
    assert_eq!(manifest.effect.grid_spacing, 24.0);
    assert_eq!(manifest.effect.influence_radius, 180.0);
    assert!(manifest.effect.grain_enabled);
    assert!(manifest.environment.seed.is_none());
}

#[test]
fn overrides_apply_to_file_manifests() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("scene.yaml");
    write_manifest(
        &path,
        "environment:\n  surface: { width: 32, height: 32 }\n  fps: 24\n  duration: { frames: 2 }\neffect:\n  shape: ellipse\n",
    );

    let manifest = load_and_validate_manifest_with_options(
        &path,
        &with_overrides(&[
            "shape=rounded_square",
            "grain_enabled=false",
            "dot_color=#f80",
            "environment.reduced_motion=true",
        ]),
    )
    .expect("manifest should load");
    assert_eq!(manifest.effect.shape, ShapeKind::RoundedSquare);
    assert!(!manifest.effect.grain_enabled);
    assert_eq!(manifest.effect.dot_color.r, 1.0);
    assert!(manifest.environment.reduced_motion);
}

#[test]
fn override_with_wrong_type_is_a_manifest_error() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("scene.yaml");
    write_manifest(
        &path,
        "environment:\n  surface: { width: 32, height: 32 }\n  fps: 24\n  duration: { frames: 2 }\n",
    );

    let error = load_and_validate_manifest_with_options(&path, &with_overrides(&["shape=triangle"]))
        .expect_err("unknown shape should fail");
    assert_eq!(
        find_coded_error(&error).map(|coded| coded.code),
        Some(E_MANIFEST_INVALID)
    );
}

#[test]
fn unknown_override_key_is_an_override_error() {
    let error = ParamOverride::parse("grain_sparkle=2").expect_err("unknown field should fail");
    assert_eq!(
        find_coded_error(&error).map(|coded| coded.code),
        Some(E_OVERRIDE_INVALID)
    );
    let error = ParamOverride::parse("environment.background.start=#fff")
        .expect_err("background is not overridable");
    assert_eq!(
        find_coded_error(&error).map(|coded| coded.code),
        Some(E_OVERRIDE_INVALID)
    );
}

#[test]
fn missing_file_is_a_manifest_error() {
    let dir = tempdir().expect("tempdir should create");
    let error = load_and_validate_manifest(&dir.path().join("absent.yaml"))
        .expect_err("missing file should fail");
    assert_eq!(
        find_coded_error(&error).map(|coded| coded.code),
        Some(E_MANIFEST_INVALID)
    );
}

#[test]
fn snapshot_clamps_loaded_values() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("wild.yaml");
    write_manifest(
        &path,
        "environment:\n  surface: { width: 32, height: 32 }\n  fps: 24\n  duration: { frames: 2 }\neffect:\n  grid_spacing: 3\n  influence_radius: 9000\n  blob_lobes: 40\n  grain_bias: -7\n",
    );

    let manifest = load_and_validate_manifest(&path).expect("out-of-range values should load");
    let snapshot = ConfigSnapshot::from_config(&manifest.effect);
    assert_eq!(snapshot.grid_spacing, 10.0);
    assert_eq!(snapshot.influence_radius, 420.0);
    assert_eq!(snapshot.blob_lobes, 12.0);
    assert_eq!(snapshot.grain_bias, -1.0);
}
